//! Recovery of the caller's scenario from a request.
//!
//! The scenario key is found either in the `publicSubjectId` path parameter
//! or through the nonce embedded in the bearer token.
//!
//! **Bearer tokens are decoded, not verified.** The stub trusts whatever nonce
//! a token carries, so this module is not a security boundary.

use lambda_http::{Request, RequestExt as _, http::header::AUTHORIZATION};
use serde::Deserialize;
use tracing::{info, warn};

use crate::correlation::CorrelationStore;
use crate::error_response::ErrorResponse;
use crate::jwt::decode_claims;

#[derive(Deserialize)]
struct NonceClaims {
    nonce: String,
}

/// Extracts the token from the `Authorization` header of a request.
///
/// The header must be of the form `Bearer <token>`.
pub fn bearer_token(req: &Request) -> Result<&str, ErrorResponse> {
    let value = req.headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ErrorResponse::forbidden("missing bearer token"))?
        .to_str()
        .or(Err(ErrorResponse::forbidden("malformed authorization header")))?;
    value.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ErrorResponse::forbidden("malformed authorization header"))
}

/// Extracts the `nonce` claim from a bearer token without verifying it.
pub fn nonce_from_token(token: &str) -> Result<String, ErrorResponse> {
    decode_claims::<NonceClaims>(token)
        .map(|claims| claims.nonce)
        .map_err(|e| {
            warn!("{e}");
            ErrorResponse::forbidden("invalid bearer token")
        })
}

/// Resolves the scenario key bound to the nonce in the bearer token.
pub async fn resolve_caller_scenario_key<S>(
    store: &S,
    req: &Request,
) -> Result<String, ErrorResponse>
where
    S: CorrelationStore,
{
    let nonce = nonce_from_token(bearer_token(req)?)?;
    let key = store.resolve_scenario_by_nonce(&nonce)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("nonce not found in DB"))?;
    info!("resolved scenario by nonce: {key}");
    Ok(key)
}

/// Resolves the scenario key from the `publicSubjectId` path parameter, or
/// from the bearer token if the parameter is absent.
pub async fn resolve_scenario_key<S>(
    store: &S,
    req: &Request,
) -> Result<String, ErrorResponse>
where
    S: CorrelationStore,
{
    let path_parameters = req.path_parameters();
    match path_parameters.first("publicSubjectId").filter(|id| !id.is_empty()) {
        Some(id) => {
            info!("resolved scenario by path: {id}");
            Ok(id.to_string())
        }
        None => resolve_caller_scenario_key(store, req).await,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use aws_smithy_mocks::{MockResponseInterceptor, RuleMode};
    use base64::{
        Engine as _,
        engine::general_purpose::{URL_SAFE_NO_PAD as base64url},
    };
    use lambda_http::Body;
    use std::collections::HashMap;

    use crate::correlation::{DynamoDbCorrelationStore, tests::mocks::dynamodb};

    /// Unsigned token that carries a given nonce.
    pub(crate) fn token_with_nonce(nonce: &str) -> String {
        format!(
            "eyJhbGciOiJFUzI1NiJ9.{}.c2ln",
            base64url.encode(serde_json::json!({ "nonce": nonce }).to_string()),
        )
    }

    pub(crate) fn request_with_bearer(nonce: &str) -> Request {
        lambda_http::http::Request::builder()
            .header("authorization", format!("Bearer {}", token_with_nonce(nonce)))
            .body(Body::Empty)
            .unwrap()
    }

    fn new_store(rule: &aws_smithy_mocks::Rule) -> DynamoDbCorrelationStore {
        DynamoDbCorrelationStore::new(
            dynamodb::new_client(MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(rule)),
            "correlation",
            "OidcNonceIndex",
        )
    }

    #[test]
    fn bearer_token_should_accept_any_header_case() {
        let req = lambda_http::http::Request::builder()
            .header("Authorization", "Bearer abc")
            .body(Body::Empty)
            .unwrap();
        assert_eq!(bearer_token(&req).unwrap(), "abc");
    }

    #[test]
    fn bearer_token_should_reject_missing_or_malformed_header() {
        let req = Request::default();
        assert!(matches!(bearer_token(&req), Err(ErrorResponse::Forbidden(_))));

        for value in ["abc", "Bearer ", "Basic abc", "bearer"] {
            let req = lambda_http::http::Request::builder()
                .header("authorization", value)
                .body(Body::Empty)
                .unwrap();
            assert!(matches!(bearer_token(&req), Err(ErrorResponse::Forbidden(_))), "{value}");
        }
    }

    #[test]
    fn nonce_from_token_should_reject_token_without_nonce() {
        assert!(nonce_from_token("abc").is_err());
        let token = format!("eyJhbGciOiJFUzI1NiJ9.{}.c2ln", base64url.encode(r#"{"sub":"x"}"#));
        assert!(matches!(nonce_from_token(&token), Err(ErrorResponse::Forbidden(_))));
    }

    #[tokio::test]
    async fn resolve_caller_scenario_key_should_look_up_nonce() {
        let store = new_store(&dynamodb::query_record("N1", Some("userDEFAULTAuthApp")));
        let key = resolve_caller_scenario_key(&store, &request_with_bearer("N1")).await.unwrap();
        assert_eq!(key, "userDEFAULTAuthApp");
    }

    #[tokio::test]
    async fn resolve_caller_scenario_key_with_unknown_nonce() {
        let store = new_store(&dynamodb::query_empty());
        let res = resolve_caller_scenario_key(&store, &request_with_bearer("N2")).await;
        match res {
            Err(ErrorResponse::NotFound(msg)) => assert_eq!(msg, "nonce not found in DB"),
            res => panic!("unexpected result: {res:?}"),
        }
    }

    #[tokio::test]
    async fn resolve_scenario_key_should_prefer_path_parameter() {
        let query = dynamodb::query_empty();
        let store = new_store(&query);
        let req = Request::default()
            .with_path_parameters(HashMap::from([
                ("publicSubjectId".to_string(), "userTwoAuthApps".to_string()),
            ]));
        let key = resolve_scenario_key(&store, &req).await.unwrap();
        assert_eq!(key, "userTwoAuthApps");
        assert_eq!(query.num_calls(), 0);
    }

    #[tokio::test]
    async fn resolve_scenario_key_should_fall_back_to_bearer_token() {
        let store = new_store(&dynamodb::query_record("N1", None));
        let key = resolve_scenario_key(&store, &request_with_bearer("N1")).await.unwrap();
        assert_eq!(key, "F5CE808F-75AB-4ECD-BBFC-FF9DBF5330FA");
    }
}
