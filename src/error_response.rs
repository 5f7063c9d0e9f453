//! Error response.

use lambda_http::{Body, Error, Response, http::StatusCode};
use serde_json::json;

/// Error response.
///
/// A Rust runtime buit with [`lambda_http`](https://docs.rs/lambda_http/latest/lambda_http/)
/// responds with a 500 error if the service function returns an error result.
/// If we want to return a different status code, we have to let the service
/// function return an OK result with a response that has the disired status
/// code.
///
/// This enum helps us to differentiate errors that we want to respond with a
/// specific status code from those we let go with a 500 status code.
///
/// #### Generating a response
///
/// `TryInto<Response<Body>>` is implemented for `ErrorResponse`.
///
/// ```
/// # use oidc_stub::error_response::ErrorResponse;
/// use lambda_http::{Body, Response};
/// let res: Response<Body> = ErrorResponse::bad_request("no nonce").try_into().unwrap();
/// assert_eq!(res.status(), 400);
/// ```
///
/// #### Letting an error go
///
/// Errors can be converted into [`ErrorResponse::Unhandled`] with the `into`
/// method.
///
/// ```
/// # use oidc_stub::error_response::ErrorResponse;
/// let err: lambda_http::Error = "error".into();
/// let res: ErrorResponse = err.into();
/// ```
#[derive(Debug)]
pub enum ErrorResponse {
    /// 400 Bad Request.
    BadRequest(String),
    /// 401 Unauthorized.
    Unauthorized(String),
    /// 403 Forbidden.
    Forbidden(String),
    /// 404 Not Found.
    NotFound(String),
    /// 409 Conflict.
    Conflict(String),
    /// 422 Unprocessable Content.
    Unprocessable(String),
    /// 503 Service Unavailable.
    Unavailable(String),
    /// Configuration error which will end up with 500 Internal Server Error.
    BadConfiguration(String),
    /// Arbitrary status dictated by a scenario.
    Status(StatusCode, String),
    /// Account management API error with a numeric error code.
    ///
    /// The body is `{"code": <code>, "message": <message>}`.
    /// The detail, if any, replaces the standard message of the code.
    Api(ErrorCode, Option<String>),
    /// Others which will end up with 500 Internal Server Error.
    Unhandled(Error),
}

impl ErrorResponse {
    /// Creates [`ErrorResponse::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Creates [`ErrorResponse::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates [`ErrorResponse::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates [`ErrorResponse::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates [`ErrorResponse::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates [`ErrorResponse::Unprocessable`].
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable(message.into())
    }

    /// Creates [`ErrorResponse::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates [`ErrorResponse::BadConfiguration`].
    pub fn bad_configuration(message: impl Into<String>) -> Self {
        Self::BadConfiguration(message.into())
    }

    /// Creates [`ErrorResponse::Api`] with the standard message of `code`.
    pub fn api(code: ErrorCode) -> Self {
        Self::Api(code, None)
    }

    /// Creates [`ErrorResponse::Api`] with a specific message.
    pub fn api_with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Api(code, Some(message.into()))
    }

    /// Status code of the response this error renders to.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorResponse::BadRequest(_) => StatusCode::BAD_REQUEST,
            ErrorResponse::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ErrorResponse::Forbidden(_) => StatusCode::FORBIDDEN,
            ErrorResponse::NotFound(_) => StatusCode::NOT_FOUND,
            ErrorResponse::Conflict(_) => StatusCode::CONFLICT,
            ErrorResponse::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::BadConfiguration(_) |
            ErrorResponse::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::Status(status, _) => *status,
            ErrorResponse::Api(code, _) => code.status(),
        }
    }
}

impl<E> From<E> for ErrorResponse
where
    E: Into<Error>,
{
    fn from(e: E) -> Self {
        ErrorResponse::Unhandled(e.into())
    }
}

impl TryInto<Response<Body>> for ErrorResponse {
    type Error = Error;

    fn try_into(self) -> Result<Response<Body>, Self::Error> {
        let status = self.status();
        let body = match self {
            ErrorResponse::BadRequest(msg) |
            ErrorResponse::Unauthorized(msg) |
            ErrorResponse::Forbidden(msg) |
            ErrorResponse::NotFound(msg) |
            ErrorResponse::Conflict(msg) |
            ErrorResponse::Unprocessable(msg) |
            ErrorResponse::Unavailable(msg) |
            ErrorResponse::BadConfiguration(msg) |
            ErrorResponse::Status(_, msg) => json!({ "error": msg }),
            ErrorResponse::Api(code, msg) => json!({
                "code": code.code(),
                "message": msg.unwrap_or_else(|| code.message().to_string()),
            }),
            ErrorResponse::Unhandled(e) => return Err(e),
        };
        Ok(Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(body.to_string().into())?)
    }
}

/// Error code of the account management API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// 1001: the request misses a parameter or has an invalid one.
    RequestMissingParameters,
    /// 1020: the OTP is well-formed but wrong.
    InvalidOtp,
    /// 1064: the default MFA method cannot be deleted.
    CannotDeleteDefaultMfaMethod,
    /// 1065: no MFA method with the identifier.
    MfaMethodNotFound,
    /// 1068: the user already has as many MFA methods as allowed.
    MfaMethodCountLimitReached,
    /// 1069: the user already has an auth app.
    AuthAppAlreadyRegistered,
    /// 1070: the user already has a default MFA method.
    DefaultMfaMethodAlreadyExists,
    /// 1083: the account is temporarily suspended.
    AccountSuspended,
    /// 1084: the account is permanently blocked.
    AccountBlocked,
    /// 1089: the email address is on the deny list.
    EmailAddressDenied,
    /// 1090: sending the OTP notification failed.
    OtpNotificationFailed,
}

impl ErrorCode {
    /// Numeric code.
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::RequestMissingParameters => 1001,
            ErrorCode::InvalidOtp => 1020,
            ErrorCode::CannotDeleteDefaultMfaMethod => 1064,
            ErrorCode::MfaMethodNotFound => 1065,
            ErrorCode::MfaMethodCountLimitReached => 1068,
            ErrorCode::AuthAppAlreadyRegistered => 1069,
            ErrorCode::DefaultMfaMethodAlreadyExists => 1070,
            ErrorCode::AccountSuspended => 1083,
            ErrorCode::AccountBlocked => 1084,
            ErrorCode::EmailAddressDenied => 1089,
            ErrorCode::OtpNotificationFailed => 1090,
        }
    }

    /// Standard message.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::RequestMissingParameters => "Request is missing parameters",
            ErrorCode::InvalidOtp => "Invalid OTP code",
            ErrorCode::CannotDeleteDefaultMfaMethod => "Cannot delete default MFA method",
            ErrorCode::MfaMethodNotFound => "MFA method not found",
            ErrorCode::MfaMethodCountLimitReached => "MFA method count limit reached",
            ErrorCode::AuthAppAlreadyRegistered => "Auth app already registered",
            ErrorCode::DefaultMfaMethodAlreadyExists => "Default MFA method already exists",
            ErrorCode::AccountSuspended => "User's account is suspended",
            ErrorCode::AccountBlocked => "User's account is blocked",
            ErrorCode::EmailAddressDenied => "Email address is denied",
            ErrorCode::OtpNotificationFailed => "Failed to send OTP notification",
        }
    }

    /// Status code the error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::RequestMissingParameters |
            ErrorCode::InvalidOtp |
            ErrorCode::OtpNotificationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::AccountSuspended |
            ErrorCode::AccountBlocked |
            ErrorCode::EmailAddressDenied => StatusCode::FORBIDDEN,
            ErrorCode::MfaMethodNotFound => StatusCode::NOT_FOUND,
            ErrorCode::CannotDeleteDefaultMfaMethod |
            ErrorCode::MfaMethodCountLimitReached |
            ErrorCode::AuthAppAlreadyRegistered |
            ErrorCode::DefaultMfaMethodAlreadyExists => StatusCode::CONFLICT,
        }
    }

    /// Finds the error code with a given numeric code.
    pub fn from_code(code: u16) -> Option<Self> {
        [
            ErrorCode::RequestMissingParameters,
            ErrorCode::InvalidOtp,
            ErrorCode::CannotDeleteDefaultMfaMethod,
            ErrorCode::MfaMethodNotFound,
            ErrorCode::MfaMethodCountLimitReached,
            ErrorCode::AuthAppAlreadyRegistered,
            ErrorCode::DefaultMfaMethodAlreadyExists,
            ErrorCode::AccountSuspended,
            ErrorCode::AccountBlocked,
            ErrorCode::EmailAddressDenied,
            ErrorCode::OtpNotificationFailed,
        ].into_iter().find(|c| c.code() == code)
    }
}

/// Reads the body of a response as a string.
///
/// Handy for tests and for logging.
pub fn body_text(res: &Response<Body>) -> &str {
    match res.body() {
        Body::Empty => "",
        Body::Text(s) => s.as_str(),
        Body::Binary(b) => std::str::from_utf8(b).unwrap_or_default(),
    }
}
