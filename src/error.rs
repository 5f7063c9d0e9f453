//! Common error.

use thiserror::{Error as ThisError};

/// Common error.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Required parameter is not configured.
    #[error("parameter not found: `{0}`")]
    ParameterNotFound(&'static str),
    /// Mutually exclusive parameters are both configured.
    #[error("only one of `{0}` and `{1}` may be set")]
    ConflictingParameters(&'static str, &'static str),
    /// Signing key is absent or malformed.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),
    /// Token is not a decodable JWT.
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),
    /// Item in the database does not have the expected shape.
    #[error("malformed record: {0}")]
    MalformedRecord(&'static str),
    /// Scenario catalog cannot be loaded.
    #[error("invalid scenario catalog: {0}")]
    Catalog(String),
    /// Token cannot be signed.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
