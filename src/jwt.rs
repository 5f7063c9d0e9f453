//! Claims of issued tokens and unverified decoding.
//!
//! Decoding here does **not** verify signatures. Bearer tokens and client
//! assertions presented to the stub are only ever inspected for correlation
//! data, so nothing decoded by this module may be treated as authenticated.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::Error;

/// Algorithm of every token issued by the stub.
pub const ALGORITHM: &str = "ES256";

/// Claims of the ID and access tokens issued by the token endpoint.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Claims {
    /// Subject.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Audience: the client ID.
    pub aud: String,
    /// Expiration time in epoch seconds.
    pub exp: i64,
    /// Issued at in epoch seconds.
    pub iat: i64,
    /// Session ID.
    pub sid: String,
    /// Nonce supplied at the authorization endpoint.
    pub nonce: String,
    /// Vector of trust.
    pub vot: String,
}

/// Decodes the claims of a compact JWT without verifying it.
///
/// Neither the signature nor any registered claim is checked; expired tokens
/// and tokens for any audience decode as well. The header must name a known
/// algorithm.
pub fn decode_claims<T: DeserializeOwned>(token: &str) -> Result<T, Error> {
    let mut validation = Validation::new(Algorithm::ES256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.insecure_disable_signature_validation();
    decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .or(Err(Error::MalformedToken("not a decodable JWT")))
}
