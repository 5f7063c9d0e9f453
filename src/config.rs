//! Deployment settings shared by the OpenID Connect endpoints.

use lambda_http::Error;
use std::env;

/// Settings of the stub provider.
#[derive(Clone, Debug)]
pub struct OidcSettings {
    /// Client ID of the only relying party.
    pub client_id: String,
    /// Name of the deployment environment; e.g., `dev`, `build`.
    pub environment: String,
}

impl OidcSettings {
    /// Creates settings.
    pub fn new(client_id: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            environment: environment.into(),
        }
    }

    /// Loads settings from `OIDC_CLIENT_ID` and `ENVIRONMENT`.
    pub fn from_env() -> Result<Self, Error> {
        let client_id = env::var("OIDC_CLIENT_ID")
            .or(Err("OIDC_CLIENT_ID env must be set"))?;
        let environment = environment_from_env()?;
        Ok(Self { client_id, environment })
    }

    /// Issuer identifier. Ends with a slash.
    pub fn issuer(&self) -> String {
        issuer_url(&self.environment)
    }
}

/// Issuer identifier of an environment. Ends with a slash.
pub fn issuer_url(environment: &str) -> String {
    format!("https://oidc-stub.home.{environment}.account.gov.uk/")
}

/// Reads `ENVIRONMENT`.
pub fn environment_from_env() -> Result<String, Error> {
    Ok(env::var("ENVIRONMENT").or(Err("ENVIRONMENT env must be set"))?)
}
