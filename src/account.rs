//! Account management API.
//!
//! Every route requires `Authorization: Bearer <token>` and responds with
//! 204 No Content on success, or `{"code", "message"}` on a validation
//! failure.
//!
//! ## Routes
//!
//! Routes are told apart by the raw path.
//!
//! - `.../send-otp-notification`: `{"email", "notificationType"}`
//! - `.../update-email`: `{"replacementEmailAddress", "otp"}`
//! - `.../authenticate`: checks account interventions
//! - `.../verify-otp...`: `{"otp"}`
//! - `.../send-otp-challenge...`: no body
//!
//! Any other path succeeds without checking anything but the bearer token.

use lambda_http::{Body, Error, Request, RequestExt as _, Response};
use std::sync::Arc;
use tracing::info;

use crate::correlation::{CorrelationStore, DynamoDbCorrelationStore};
use crate::error_response::{ErrorCode, ErrorResponse};
use crate::resource::{KeySource, resolve_resource_scenario};
use crate::response::{no_content, respond};
use crate::scenario::{ResolvedScenario, ScenarioCatalog};
use crate::validation::{
    EMAIL_PATTERN,
    Field,
    NOTIFICATION_TYPE_PATTERN,
    check_otp,
    json_body,
    require_fields,
    text,
};

/// Replacement email addresses whose local part starts with this are denied.
pub const DENIED_EMAIL_PREFIX: &str = "fail.email.check";

/// State shared among invocations.
#[cfg_attr(test, derive(derive_builder::Builder))]
#[cfg_attr(test, builder(setter(into), pattern = "owned"))]
pub struct SharedState<S> {
    store: S,
    #[cfg_attr(test, builder(default = "ScenarioCatalog::embedded().unwrap()"))]
    catalog: ScenarioCatalog,
}

impl<S> SharedState<S> {
    /// Creates a state.
    pub fn new(store: S, catalog: ScenarioCatalog) -> Self {
        Self { store, catalog }
    }
}

impl SharedState<DynamoDbCorrelationStore> {
    /// Creates a state from the environment.
    pub async fn from_env() -> Result<Self, Error> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(
            DynamoDbCorrelationStore::from_env(&config)?,
            ScenarioCatalog::from_env()?,
        ))
    }
}

/// Route of the account management API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Sends an OTP to an email address or a phone number.
    SendOtpNotification,
    /// Replaces the email address.
    UpdateEmail,
    /// Checks if the account may sign in.
    Authenticate,
    /// Verifies an OTP.
    VerifyOtp,
    /// Sends an OTP challenge.
    SendOtpChallenge,
    /// Anything else.
    Other,
}

impl Route {
    /// Determines the route of a raw path.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with("/send-otp-notification") {
            Route::SendOtpNotification
        } else if path.ends_with("/update-email") {
            Route::UpdateEmail
        } else if path.ends_with("/authenticate") {
            Route::Authenticate
        } else if path.contains("/verify-otp") {
            Route::VerifyOtp
        } else if path.contains("/send-otp-challenge") {
            Route::SendOtpChallenge
        } else {
            Route::Other
        }
    }
}

/// Handles a request to the account management API.
pub async fn function_handler<S>(
    shared_state: Arc<SharedState<S>>,
    event: Request,
) -> Result<Response<Body>, Error>
where
    S: CorrelationStore,
{
    respond(manage_account(&shared_state, &event).await)
}

async fn manage_account<S>(
    shared_state: &SharedState<S>,
    event: &Request,
) -> Result<Response<Body>, ErrorResponse>
where
    S: CorrelationStore,
{
    let route = Route::from_path(&event.raw_http_path());
    let scenario = resolve_resource_scenario(
        &shared_state.store,
        &shared_state.catalog,
        event,
        KeySource::Bearer,
    ).await?;
    info!("account management: route={route:?}, scenario={}", scenario.key);
    match route {
        Route::SendOtpNotification => {
            let body = json_body(event.body())?;
            require_fields(&[
                Field::from_json("email", &body).matching(&EMAIL_PATTERN),
                Field::from_json("notificationType", &body).matching(&NOTIFICATION_TYPE_PATTERN),
            ])?;
            otp_notification_outcome(&scenario)?;
        }
        Route::UpdateEmail => {
            let body = json_body(event.body())?;
            require_fields(&[
                Field::from_json("replacementEmailAddress", &body).matching(&EMAIL_PATTERN),
            ])?;
            check_otp(text(body.get("otp")))?;
            let replacement = text(body.get("replacementEmailAddress")).unwrap_or_default();
            if replacement.starts_with(DENIED_EMAIL_PREFIX) {
                return Err(ErrorResponse::api(ErrorCode::EmailAddressDenied));
            }
        }
        Route::Authenticate => {
            let interventions = scenario.fragment.interventions.unwrap_or_default();
            if interventions.blocked {
                return Err(ErrorResponse::api(ErrorCode::AccountBlocked));
            }
            if interventions.suspended {
                return Err(ErrorResponse::api(ErrorCode::AccountSuspended));
            }
        }
        Route::VerifyOtp => {
            check_otp(text(json_body(event.body())?.get("otp")))?;
        }
        Route::SendOtpChallenge => otp_notification_outcome(&scenario)?,
        Route::Other => {}
    }
    no_content()
}

fn otp_notification_outcome(scenario: &ResolvedScenario) -> Result<(), ErrorResponse> {
    let outcome = scenario.fragment.otp_notification.as_ref()
        .ok_or_else(|| ErrorResponse::bad_configuration(
            format!("no otpNotification in scenario: {}", scenario.key),
        ))?;
    if outcome.success {
        return Ok(());
    }
    let code = outcome.code
        .and_then(ErrorCode::from_code)
        .unwrap_or(ErrorCode::OtpNotificationFailed);
    Err(ErrorResponse::api(code))
}
