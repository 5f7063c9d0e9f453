//! Userinfo endpoint.
//!
//! ## Endpoint
//!
//! ### `GET /userinfo`
//!
//! Requires `Authorization: Bearer <token>` where the token is the one issued
//! by the token endpoint. Responds with the `userinfo` of the caller's
//! scenario, as a signed JWT (`application/jwt`) unless the scenario turns
//! signing off, in which case it is plain JSON.

use lambda_http::{Body, Error, Request, Response, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::config::OidcSettings;
use crate::correlation::{CorrelationStore, DynamoDbCorrelationStore};
use crate::error_response::ErrorResponse;
use crate::resource::{KeySource, resolve_resource_scenario};
use crate::response::{json, respond, with_content_type};
use crate::scenario::{ScenarioCatalog, UserInfo};
use crate::signer::{SignerProvider, SigningKeySource};
use crate::token::TOKEN_LIFETIME_SECS;

/// State shared among invocations.
#[cfg_attr(test, derive(derive_builder::Builder))]
#[cfg_attr(test, builder(setter(into), pattern = "owned"))]
pub struct SharedState<S> {
    store: S,
    signer: SignerProvider,
    #[cfg_attr(test, builder(default = "OidcSettings::new(\"client-id\", \"dev\")"))]
    settings: OidcSettings,
    #[cfg_attr(test, builder(default = "ScenarioCatalog::embedded().unwrap()"))]
    catalog: ScenarioCatalog,
}

impl<S> SharedState<S> {
    /// Creates a state.
    pub fn new(
        store: S,
        signer: SignerProvider,
        settings: OidcSettings,
        catalog: ScenarioCatalog,
    ) -> Self {
        Self { store, signer, settings, catalog }
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
            ScenarioCatalog::from_env()?,
        ))
    }
}

/// Claims of a signed userinfo response.
#[derive(Serialize)]
struct SignedUserInfo<'a> {
    #[serde(flatten)]
    userinfo: &'a UserInfo,
    iss: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Handles a userinfo request.
pub async fn function_handler<S>(
    shared_state: Arc<SharedState<S>>,
    event: Request,
) -> Result<Response<Body>, Error>
where
    S: CorrelationStore,
{
    respond(userinfo(&shared_state, &event).await)
}

async fn userinfo<S>(
    shared_state: &SharedState<S>,
    event: &Request,
) -> Result<Response<Body>, ErrorResponse>
where
    S: CorrelationStore,
{
    let scenario = resolve_resource_scenario(
        &shared_state.store,
        &shared_state.catalog,
        event,
        KeySource::Bearer,
    ).await?;
    let userinfo = scenario.fragment.userinfo.as_ref()
        .ok_or_else(|| ErrorResponse::bad_configuration(
            format!("no userinfo in scenario: {}", scenario.key),
        ))?;
    if !scenario.is_userinfo_signed() {
        info!("unsigned userinfo: {}", scenario.key);
        return json(StatusCode::OK, userinfo);
    }
    let iat = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
    let jwt = shared_state.signer.sign(&SignedUserInfo {
        userinfo,
        iss: shared_state.settings.issuer(),
        aud: &shared_state.settings.client_id,
        iat,
        exp: iat + TOKEN_LIFETIME_SECS,
    }).await?;
    with_content_type("application/jwt", jwt)
}
