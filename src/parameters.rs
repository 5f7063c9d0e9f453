//! Provides access to parameters in Parameter Store on AWS Systems Manager.

use tracing::error;

use crate::error::Error;
use crate::sdk_error_ext::SdkErrorExt as _;

/// Loads the private JWK of the signing key from the Parameter Store.
///
/// The parameter is supposed to be a `SecureString` and is decrypted.
pub async fn load_signing_jwk(
    ssm: &aws_sdk_ssm::Client,
    parameter_name: &str,
) -> Result<String, Error> {
    ssm.get_parameter()
        .name(parameter_name)
        .with_decryption(true)
        .send()
        .await
        .map_err(|e| {
            error!(?e, retryable = e.is_retryable(), "getting SSM parameter");
            Error::KeyUnavailable(format!("failed to get parameter: {parameter_name}"))
        })?
        .parameter
        .and_then(|p| p.value)
        .ok_or_else(|| {
            error!("missing SSM parameter value");
            Error::KeyUnavailable(format!("parameter has no value: {parameter_name}"))
        })
}
