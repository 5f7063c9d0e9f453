//! Scenario resolution shared by the resource endpoints.

use lambda_http::{Request, http::StatusCode};

use crate::bearer::{resolve_caller_scenario_key, resolve_scenario_key};
use crate::correlation::CorrelationStore;
use crate::error_response::ErrorResponse;
use crate::scenario::{HttpResponse, ResolvedScenario, ScenarioCatalog};

/// Where the scenario key of a request comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// Nonce in the bearer token.
    Bearer,
    /// `publicSubjectId` path parameter, or the bearer token without it.
    PathOrBearer,
}

/// Resolves the scenario of a request and applies its status override.
///
/// An `httpResponse` whose code is not 200 short-circuits with that status
/// before any endpoint-specific validation.
pub async fn resolve_resource_scenario<S>(
    store: &S,
    catalog: &ScenarioCatalog,
    req: &Request,
    source: KeySource,
) -> Result<ResolvedScenario, ErrorResponse>
where
    S: CorrelationStore,
{
    let key = match source {
        KeySource::Bearer => resolve_caller_scenario_key(store, req).await?,
        KeySource::PathOrBearer => resolve_scenario_key(store, req).await?,
    };
    let scenario = catalog.resolve(&key);
    if let Some(http_response) = scenario.http_response_override() {
        return Err(status_override(http_response));
    }
    Ok(scenario)
}

/// Turns an `httpResponse` fragment into an error response.
pub fn status_override(http_response: &HttpResponse) -> ErrorResponse {
    match StatusCode::from_u16(http_response.code) {
        Ok(status) => ErrorResponse::Status(status, http_response.message.clone()),
        Err(_) => ErrorResponse::bad_configuration(
            format!("invalid httpResponse code: {}", http_response.code),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_smithy_mocks::MockResponseInterceptor;
    use lambda_http::RequestExt as _;
    use std::collections::HashMap;

    use crate::correlation::{DynamoDbCorrelationStore, tests::mocks::dynamodb};

    fn path_request(key: &str) -> Request {
        Request::default().with_path_parameters(HashMap::from([
            ("publicSubjectId".to_string(), key.to_string()),
        ]))
    }

    fn no_store() -> DynamoDbCorrelationStore {
        DynamoDbCorrelationStore::new(
            dynamodb::new_client(MockResponseInterceptor::new()),
            "correlation",
            "OidcNonceIndex",
        )
    }

    #[tokio::test]
    async fn resolve_resource_scenario_should_short_circuit_on_override() {
        let catalog = ScenarioCatalog::embedded().unwrap();
        let res = resolve_resource_scenario(
            &no_store(),
            &catalog,
            &path_request("userAccountApiDown"),
            KeySource::PathOrBearer,
        ).await;
        match res {
            Err(ErrorResponse::Status(status, msg)) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(msg, "Internal Server Error");
            }
            res => panic!("unexpected result: {res:?}"),
        }
    }

    #[tokio::test]
    async fn resolve_resource_scenario_should_require_bearer_token() {
        let catalog = ScenarioCatalog::embedded().unwrap();
        let res = resolve_resource_scenario(
            &no_store(),
            &catalog,
            &path_request("userAccountApiDown"),
            KeySource::Bearer,
        ).await;
        assert!(matches!(res, Err(ErrorResponse::Forbidden(_))));
    }

    #[test]
    fn status_override_should_reject_invalid_code() {
        let res = status_override(&HttpResponse { code: 1000, message: "".into() });
        assert!(matches!(res, ErrorResponse::BadConfiguration(_)));
    }
}
