//! Token endpoint.
//!
//! ## Endpoint
//!
//! ### `POST /token`
//!
//! Takes `grant_type`, `code`, `redirect_uri`, `client_assertion_type` and
//! `client_assertion` as `application/x-www-form-urlencoded`. Each of them
//! must appear exactly once.
//!
//! Responds with [`TokenResponse`] whose access token and ID token are the
//! same signed JWT carrying the nonce bound to the code.

use lambda_http::{Body, Error, Request, Response, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use url::form_urlencoded;
use uuid::Uuid;

use crate::config::OidcSettings;
use crate::correlation::{CorrelationStore, DynamoDbCorrelationStore};
use crate::error_response::ErrorResponse;
use crate::jwt::{Claims, decode_claims};
use crate::response::{json, respond};
use crate::signer::{SignerProvider, SigningKeySource};

/// Redirect URIs a code may be redeemed for.
pub const SUPPORTED_REDIRECT_URIS: [&str; 3] = [
    "https://home.dev.account.gov.uk/auth/callback",
    "http://localhost:6001/auth/callback",
    "https://home.build.account.gov.uk/auth/callback",
];

/// Lifetime of issued tokens in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Vector of trust of issued tokens.
pub const VECTOR_OF_TRUST: &str = "Cl.Cm";

const REFRESH_TOKEN: &str = "456DEF";

/// State shared among invocations.
#[cfg_attr(test, derive(derive_builder::Builder))]
#[cfg_attr(test, builder(setter(into), pattern = "owned"))]
pub struct SharedState<S> {
    store: S,
    signer: SignerProvider,
    #[cfg_attr(test, builder(default = "OidcSettings::new(\"client-id\", \"dev\")"))]
    settings: OidcSettings,
}

impl<S> SharedState<S> {
    /// Creates a state.
    pub fn new(store: S, signer: SignerProvider, settings: OidcSettings) -> Self {
        Self { store, signer, settings }
    }
}

impl SharedState<DynamoDbCorrelationStore> {
    /// Creates a state from the environment.
    pub async fn from_env() -> Result<Self, Error> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(
            DynamoDbCorrelationStore::from_env(&config)?,
            SignerProvider::new(SigningKeySource::from_env(&config)?),
            OidcSettings::from_env()?,
        ))
    }
}

/// Successful token response.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Refresh token. Always `456DEF`.
    pub refresh_token: String,
    /// Token type. Always `Bearer`.
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// ID token. Same as the access token.
    pub id_token: String,
}

/// Token request with every parameter present exactly once.
#[derive(Clone, Debug, PartialEq)]
struct TokenRequest {
    client_assertion: String,
    grant_type: String,
    code: String,
    redirect_uri: String,
}

impl TokenRequest {
    fn parse(body: &[u8]) -> Result<Self, ErrorResponse> {
        let pairs: Vec<(String, String)> = form_urlencoded::parse(body)
            .into_owned()
            .collect();
        let single = |name: &str| {
            let mut values = pairs.iter().filter(|(k, _)| k == name).map(|(_, v)| v);
            match (values.next(), values.next()) {
                (Some(value), None) => Ok(value.clone()),
                _ => Err(ErrorResponse::bad_request("Missing parameters or duplicate parameter")),
            }
        };
        single("client_assertion_type")?;
        Ok(Self {
            client_assertion: single("client_assertion")?,
            grant_type: single("grant_type")?,
            code: single("code")?,
            redirect_uri: single("redirect_uri")?,
        })
    }
}

#[derive(Deserialize)]
struct ClientAssertionClaims {
    iss: Option<String>,
}

/// Handles a token request.
pub async fn function_handler<S>(
    shared_state: Arc<SharedState<S>>,
    event: Request,
) -> Result<Response<Body>, Error>
where
    S: CorrelationStore,
{
    respond(issue_token(&shared_state, event.body().as_ref()).await)
}

async fn issue_token<S>(
    shared_state: &SharedState<S>,
    body: &[u8],
) -> Result<Response<Body>, ErrorResponse>
where
    S: CorrelationStore,
{
    let request = TokenRequest::parse(body)?;
    if !SUPPORTED_REDIRECT_URIS.contains(&request.redirect_uri.as_str()) {
        return Err(ErrorResponse::bad_request("Invalid grant - Invalid redirect URL"));
    }
    if request.grant_type != "authorization_code" {
        return Err(ErrorResponse::unauthorized("unsupported_grant_type"));
    }
    let issuer = decode_claims::<ClientAssertionClaims>(&request.client_assertion)
        .ok()
        .and_then(|claims| claims.iss);
    if issuer.as_deref() != Some(shared_state.settings.client_id.as_str()) {
        info!("client assertion issuer mismatch: {issuer:?}");
        return Err(ErrorResponse::unauthorized("Invalid client"));
    }

    info!("redeeming code: {}", request.code);
    let nonce = shared_state.store
        .resolve_nonce_by_code(&request.code)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("code not found in DB"))?;

    let iat = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
    let claims = Claims {
        sub: format!(
            "urn:fdc:gov.uk:{}:{}",
            shared_state.settings.environment,
            Uuid::new_v4(),
        ),
        iss: shared_state.settings.issuer(),
        aud: shared_state.settings.client_id.clone(),
        exp: iat + TOKEN_LIFETIME_SECS,
        iat,
        sid: Uuid::new_v4().to_string(),
        nonce,
        vot: VECTOR_OF_TRUST.to_string(),
    };
    let jwt = shared_state.signer.sign(&claims).await?;
    json(StatusCode::OK, &TokenResponse {
        access_token: jwt.clone(),
        refresh_token: REFRESH_TOKEN.to_string(),
        token_type: "Bearer".to_string(),
        expires_in: TOKEN_LIFETIME_SECS,
        id_token: jwt,
    })
}
