//! Discovery endpoints.
//!
//! ## Endpoints
//!
//! ### `GET /.well-known/openid-configuration`
//!
//! OpenID provider metadata of the environment.
//!
//! ### `GET /.well-known/jwks.json`
//!
//! JWKS that verifies the tokens and the userinfo issued by the stub.

use lambda_http::{Body, Error, Request, RequestExt as _, Response, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{environment_from_env, issuer_url};
use crate::error_response::ErrorResponse;
use crate::jwt::ALGORITHM;
use crate::response::{json, respond};
use crate::signer::{SignerProvider, SigningKeySource};

const UNSUPPORTED_URL: &str = "https://unsuported-by-stub.gov.uk/";

/// State shared among invocations.
#[cfg_attr(test, derive(derive_builder::Builder))]
#[cfg_attr(test, builder(setter(into), pattern = "owned"))]
pub struct SharedState {
    signer: SignerProvider,
    #[cfg_attr(test, builder(default = "\"dev\".to_string()"))]
    environment: String,
}

impl SharedState {
    /// Creates a state.
    pub fn new(signer: SignerProvider, environment: impl Into<String>) -> Self {
        Self {
            signer,
            environment: environment.into(),
        }
    }

    /// Creates a state from the environment.
    pub async fn from_env() -> Result<Self, Error> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(
            SignerProvider::new(SigningKeySource::from_env(&config)?),
            environment_from_env()?,
        ))
    }
}

/// OpenID provider metadata.
#[derive(Clone, Debug, Serialize)]
pub struct OpenIdConfiguration {
    /// Authorization endpoint.
    pub authorization_endpoint: String,
    /// Token endpoint.
    pub token_endpoint: String,
    /// Dynamic client registration endpoint. Not implemented.
    pub registration_endpoint: String,
    /// Issuer.
    pub issuer: String,
    /// JWKS.
    pub jwks_uri: String,
    /// Scopes.
    pub scopes_supported: Vec<&'static str>,
    /// Response types.
    pub response_types_supported: Vec<&'static str>,
    /// Grant types.
    pub grant_types_supported: Vec<&'static str>,
    /// Client authentication methods at the token endpoint.
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    /// Algorithms of client assertions.
    pub token_endpoint_auth_signing_alg_values_supported: Vec<&'static str>,
    /// UI locales.
    pub ui_locales_supported: Vec<&'static str>,
    /// Service documentation. Not available.
    pub service_documentation: &'static str,
    /// Policy. Not available.
    pub op_policy_uri: &'static str,
    /// Terms of service. Not available.
    pub op_tos_uri: &'static str,
    /// Whether `request_uri` is supported.
    pub request_uri_parameter_supported: bool,
    /// Trust marks. Not available.
    pub trustmarks: &'static str,
    /// Subject types.
    pub subject_types_supported: Vec<&'static str>,
    /// Userinfo endpoint.
    pub userinfo_endpoint: String,
    /// Logout endpoint.
    pub end_session_endpoint: String,
    /// Algorithms of ID tokens.
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    /// Claim types.
    pub claim_types_supported: Vec<&'static str>,
    /// Claims.
    pub claims_supported: Vec<&'static str>,
    /// Whether back-channel logout is supported.
    pub backchannel_logout_supported: bool,
    /// Whether back-channel logout carries `sid`.
    pub backchannel_logout_session_supported: bool,
}

impl OpenIdConfiguration {
    /// Metadata of a given environment.
    pub fn for_environment(environment: &str) -> Self {
        let issuer = issuer_url(environment);
        Self {
            authorization_endpoint: format!("{issuer}authorize"),
            token_endpoint: format!("{issuer}token"),
            registration_endpoint: format!("{issuer}connect/register"),
            jwks_uri: format!("{issuer}.well-known/jwks.json"),
            scopes_supported: vec!["openid", "email", "phone", "offline_access"],
            response_types_supported: vec!["code"],
            grant_types_supported: vec!["authorization_code"],
            token_endpoint_auth_methods_supported: vec!["private_key_jwt"],
            token_endpoint_auth_signing_alg_values_supported: vec![
                "RS256",
                "RS384",
                "RS512",
                "PS256",
                "PS384",
                "PS512",
            ],
            ui_locales_supported: vec!["en", "cy"],
            service_documentation: UNSUPPORTED_URL,
            op_policy_uri: UNSUPPORTED_URL,
            op_tos_uri: UNSUPPORTED_URL,
            request_uri_parameter_supported: true,
            trustmarks: UNSUPPORTED_URL,
            subject_types_supported: vec!["public", "pairwise"],
            userinfo_endpoint: format!("{issuer}userinfo"),
            end_session_endpoint: format!("{issuer}logout"),
            id_token_signing_alg_values_supported: vec![ALGORITHM, "RS256"],
            claim_types_supported: vec!["normal"],
            claims_supported: vec![
                "sub",
                "email",
                "email_verified",
                "phone_number",
                "phone_number_verified",
                "https://vocab.account.gov.uk/v1/passport",
                "https://vocab.account.gov.uk/v1/drivingPermit",
                "https://vocab.account.gov.uk/v1/coreIdentityJWT",
                "https://vocab.account.gov.uk/v1/address",
            ],
            backchannel_logout_supported: true,
            backchannel_logout_session_supported: false,
            issuer,
        }
    }
}

/// Handles a request to the discovery endpoints.
pub async fn function_handler(
    shared_state: Arc<SharedState>,
    event: Request,
) -> Result<Response<Body>, Error> {
    respond(discover(&shared_state, &event).await)
}

async fn discover(
    shared_state: &SharedState,
    event: &Request,
) -> Result<Response<Body>, ErrorResponse> {
    let path = event.raw_http_path();
    if path.ends_with("/jwks.json") {
        json(StatusCode::OK, &shared_state.signer.jwks().await?)
    } else if path.ends_with("/openid-configuration") {
        json(
            StatusCode::OK,
            &OpenIdConfiguration::for_environment(&shared_state.environment),
        )
    } else {
        Err(ErrorResponse::not_found(format!("unsupported path: {path}")))
    }
}
