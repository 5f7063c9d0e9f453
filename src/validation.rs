//! Validation of request fields.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::info;

use crate::error_response::{ErrorCode, ErrorResponse};

/// One-time password: six digits.
pub static OTP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("valid OTP pattern"));

/// Email address.
pub static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

/// Phone number.
pub static PHONE_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("valid phone number pattern"));

/// `priorityIdentifier` of an MFA method.
pub static PRIORITY_IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(DEFAULT|BACKUP)$").expect("valid priority pattern"));

/// `mfaMethodType` of an MFA method.
pub static MFA_METHOD_TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(AUTH_APP|SMS)$").expect("valid method type pattern"));

/// `notificationType` of an OTP notification.
pub static NOTIFICATION_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(VERIFY_EMAIL|VERIFY_PHONE_NUMBER)$").expect("valid notification type pattern")
});

/// Field of a request.
#[derive(Clone, Debug)]
pub struct Field<'a> {
    name: &'a str,
    value: Option<String>,
    pattern: Option<&'a Regex>,
}

impl<'a> Field<'a> {
    /// Required field.
    pub fn new(name: &'a str, value: Option<String>) -> Self {
        Self { name, value, pattern: None }
    }

    /// Required field in a JSON object.
    ///
    /// Numbers are taken in their string form.
    pub fn from_json(name: &'a str, object: &Value) -> Self {
        Self::new(name, text(object.get(name)))
    }

    /// Requires the field to match a pattern.
    pub fn matching(mut self, pattern: &'a Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

/// Validates fields in order.
///
/// Fails with `"no {name} provided"` for the first absent or empty field, or
/// `"invalid {name}"` for the first field that does not match its pattern.
pub fn validate_fields(fields: &[Field<'_>]) -> Result<(), String> {
    for field in fields {
        let value = field.value.as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("no {} provided", field.name))?;
        if let Some(pattern) = field.pattern {
            if !pattern.is_match(value) {
                return Err(format!("invalid {}", field.name));
            }
        }
    }
    Ok(())
}

/// Validates fields and reports a failure as an account management API error
/// `1001`.
pub fn require_fields(fields: &[Field<'_>]) -> Result<(), ErrorResponse> {
    validate_fields(fields)
        .map_err(|msg| ErrorResponse::api_with_message(ErrorCode::RequestMissingParameters, msg))
}

/// Checks a one-time password.
///
/// A well-formed password of identical digits, like `"000000"`, is rejected
/// as wrong (`1020`); anything else malformed is a bad request (`1001`).
pub fn check_otp(otp: Option<String>) -> Result<(), ErrorResponse> {
    require_fields(&[Field::new("otp", otp.clone()).matching(&OTP_PATTERN)])?;
    let otp = otp.unwrap_or_default();
    if is_all_same_digits(&otp) {
        return Err(ErrorResponse::api(ErrorCode::InvalidOtp));
    }
    Ok(())
}

/// Parses a JSON request body.
///
/// An empty body is taken as `null` so that field validation reports the
/// missing fields.
pub fn json_body(body: &[u8]) -> Result<Value, ErrorResponse> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        info!("{e}");
        ErrorResponse::api_with_message(ErrorCode::RequestMissingParameters, "invalid request body")
    })
}

/// Returns the string form of a JSON string or number.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_all_same_digits(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => false,
    }
}
