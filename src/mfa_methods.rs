//! MFA method management endpoints.
//!
//! The user is identified by the `publicSubjectId` path parameter, or by the
//! bearer token if the path does not have one. Write operations never change
//! the scenario; they respond as if the change were applied to it.
//!
//! ## Endpoints
//!
//! ### `GET /mfa-methods[/{publicSubjectId}]`
//!
//! Lists the MFA methods of the user.
//!
//! ### `POST /mfa-methods[/{publicSubjectId}]`
//!
//! Adds an MFA method:
//!
//! ```json
//! {
//!   "mfaMethod": {
//!     "priorityIdentifier": "DEFAULT" | "BACKUP",
//!     "method": {
//!       "mfaMethodType": "SMS" | "AUTH_APP",
//!       "phoneNumber": "...",
//!       "otp": "...",
//!       "credential": "..."
//!     }
//!   }
//! }
//! ```
//!
//! `phoneNumber` and `otp` are required for `SMS`, and `credential` for
//! `AUTH_APP`.
//!
//! ### `PUT /mfa-methods/{publicSubjectId}/{mfaIdentifier}`
//!
//! Replaces an MFA method. The body is the same as `POST`.
//!
//! ### `DELETE /mfa-methods/{publicSubjectId}/{mfaIdentifier}`
//!
//! Removes an MFA method other than the default one.

use lambda_http::{
    Body,
    Error,
    Request,
    RequestExt as _,
    Response,
    http::{Method, StatusCode},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::correlation::{CorrelationStore, DynamoDbCorrelationStore};
use crate::error_response::{ErrorCode, ErrorResponse};
use crate::resource::{KeySource, resolve_resource_scenario};
use crate::response::{json, no_content, respond};
use crate::scenario::{MethodDetail, MfaMethod, PriorityIdentifier, ScenarioCatalog};
use crate::validation::{
    Field,
    MFA_METHOD_TYPE_PATTERN,
    PHONE_NUMBER_PATTERN,
    PRIORITY_IDENTIFIER_PATTERN,
    check_otp,
    json_body,
    require_fields,
    text,
};

/// Maximum number of MFA methods a user may have.
pub const MAX_MFA_METHODS: usize = 2;

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

/// Handles a request to the MFA method endpoints.
pub async fn function_handler<S>(
    shared_state: Arc<SharedState<S>>,
    event: Request,
) -> Result<Response<Body>, Error>
where
    S: CorrelationStore,
{
    respond(manage_mfa_methods(&shared_state, &event).await)
}

async fn manage_mfa_methods<S>(
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
        KeySource::PathOrBearer,
    ).await?;
    info!("{} mfa-methods: scenario={}", event.method(), scenario.key);
    let methods = scenario.fragment.mfa_methods.as_deref().unwrap_or_default();
    match *event.method() {
        Method::GET => json(StatusCode::OK, check_methods(methods)?),
        Method::POST => {
            let added = create_method(methods, MethodRequest::parse(event.body())?)?;
            json(StatusCode::OK, &added)
        }
        Method::PUT => {
            let mfa_identifier = mfa_identifier(event)?;
            let request = MethodRequest::parse(event.body())?;
            json(StatusCode::OK, &update_method(methods, &mfa_identifier, request)?)
        }
        Method::DELETE => {
            delete_method(methods, &mfa_identifier(event)?)?;
            no_content()
        }
        _ => Err(ErrorResponse::Status(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("unsupported method: {}", event.method()),
        )),
    }
}

fn mfa_identifier(event: &Request) -> Result<String, ErrorResponse> {
    let value = event.path_parameters().first("mfaIdentifier").map(String::from);
    require_fields(&[Field::new("mfaIdentifier", value.clone())])?;
    Ok(value.unwrap_or_default())
}

/// Checks the shape of a list of MFA methods.
///
/// Checks are made in this order:
/// 1. no methods: 404
/// 2. more than [`MAX_MFA_METHODS`]: 422
/// 3. no default method: 422
/// 4. more than one default method: 409
/// 5. more than one auth app: 409
pub fn check_methods(methods: &[MfaMethod]) -> Result<&[MfaMethod], ErrorResponse> {
    if methods.is_empty() {
        return Err(ErrorResponse::not_found("no MFA methods"));
    }
    if methods.len() > MAX_MFA_METHODS {
        return Err(ErrorResponse::unprocessable("too many MFA methods"));
    }
    let default_count = methods.iter().filter(|m| m.is_default()).count();
    if default_count == 0 {
        return Err(ErrorResponse::unprocessable("no default MFA method"));
    }
    if default_count > 1 {
        return Err(ErrorResponse::conflict("more than one default MFA method"));
    }
    if methods.iter().filter(|m| m.method.is_auth_app()).count() > 1 {
        return Err(ErrorResponse::conflict("more than one auth app"));
    }
    Ok(methods)
}

/// Validated body of a create or update request.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodRequest {
    /// Priority.
    pub priority_identifier: PriorityIdentifier,
    /// Method.
    pub method: MethodDetail,
}

impl MethodRequest {
    /// Parses and validates a request body.
    pub fn parse(body: &[u8]) -> Result<Self, ErrorResponse> {
        let body = json_body(body)?;
        let mfa_method = &body["mfaMethod"];
        let method = &mfa_method["method"];
        require_fields(&[
            Field::from_json("priorityIdentifier", mfa_method)
                .matching(&PRIORITY_IDENTIFIER_PATTERN),
            Field::from_json("mfaMethodType", method).matching(&MFA_METHOD_TYPE_PATTERN),
        ])?;
        let priority_identifier = match text(mfa_method.get("priorityIdentifier")).as_deref() {
            Some("DEFAULT") => PriorityIdentifier::Default,
            _ => PriorityIdentifier::Backup,
        };
        let method = match text(method.get("mfaMethodType")).as_deref() {
            Some("SMS") => {
                let phone_number = Field::from_json("phoneNumber", method)
                    .matching(&PHONE_NUMBER_PATTERN);
                require_fields(&[phone_number])?;
                check_otp(text(method.get("otp")))?;
                MethodDetail::Sms {
                    phone_number: text(method.get("phoneNumber")).unwrap_or_default(),
                }
            }
            _ => {
                require_fields(&[Field::from_json("credential", method)])?;
                MethodDetail::AuthApp {
                    credential: text(method.get("credential")).unwrap_or_default(),
                }
            }
        };
        Ok(Self { priority_identifier, method })
    }
}

/// Adds a method to a list.
///
/// Fails with `1068` if the list is full, `1069` if adding a second auth app,
/// or `1070` if adding a second default method.
pub fn create_method(
    methods: &[MfaMethod],
    request: MethodRequest,
) -> Result<MfaMethod, ErrorResponse> {
    if methods.len() >= MAX_MFA_METHODS {
        return Err(ErrorResponse::api(ErrorCode::MfaMethodCountLimitReached));
    }
    if request.method.is_auth_app() && methods.iter().any(|m| m.method.is_auth_app()) {
        return Err(ErrorResponse::api(ErrorCode::AuthAppAlreadyRegistered));
    }
    if request.priority_identifier == PriorityIdentifier::Default &&
        methods.iter().any(MfaMethod::is_default)
    {
        return Err(ErrorResponse::api(ErrorCode::DefaultMfaMethodAlreadyExists));
    }
    Ok(MfaMethod {
        mfa_identifier: Uuid::new_v4().to_string(),
        priority_identifier: request.priority_identifier,
        method: request.method,
        method_verified: true,
    })
}

/// Replaces a method in a list and returns the resulting list.
///
/// Promoting a method to the default one demotes the current default one.
/// Fails with `1065` for an unknown method, `1064` if demoting the default
/// one, or `1069` if the result would have a second auth app.
pub fn update_method(
    methods: &[MfaMethod],
    mfa_identifier: &str,
    request: MethodRequest,
) -> Result<Vec<MfaMethod>, ErrorResponse> {
    let target = methods.iter()
        .find(|m| m.mfa_identifier == mfa_identifier)
        .ok_or_else(|| ErrorResponse::api(ErrorCode::MfaMethodNotFound))?;
    if target.is_default() && request.priority_identifier == PriorityIdentifier::Backup {
        return Err(ErrorResponse::api_with_message(
            ErrorCode::CannotDeleteDefaultMfaMethod,
            "Cannot demote default MFA method",
        ));
    }
    if request.method.is_auth_app() &&
        methods.iter().any(|m| m.mfa_identifier != mfa_identifier && m.method.is_auth_app())
    {
        return Err(ErrorResponse::api(ErrorCode::AuthAppAlreadyRegistered));
    }
    let promoting = request.priority_identifier == PriorityIdentifier::Default;
    Ok(methods.iter()
        .map(|m| {
            if m.mfa_identifier == mfa_identifier {
                MfaMethod {
                    mfa_identifier: m.mfa_identifier.clone(),
                    priority_identifier: request.priority_identifier,
                    method: request.method.clone(),
                    method_verified: true,
                }
            } else if promoting && m.is_default() {
                MfaMethod {
                    priority_identifier: PriorityIdentifier::Backup,
                    ..m.clone()
                }
            } else {
                m.clone()
            }
        })
        .collect())
}

/// Checks if a method can be removed from a list.
///
/// Fails with `1065` for an unknown method, or `1064` for the default one.
pub fn delete_method(methods: &[MfaMethod], mfa_identifier: &str) -> Result<(), ErrorResponse> {
    let method = methods.iter()
        .find(|m| m.mfa_identifier == mfa_identifier)
        .ok_or_else(|| ErrorResponse::api(ErrorCode::MfaMethodNotFound))?;
    if method.is_default() {
        return Err(ErrorResponse::api(ErrorCode::CannotDeleteDefaultMfaMethod));
    }
    Ok(())
}
