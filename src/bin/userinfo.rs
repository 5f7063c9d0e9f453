//! Userinfo endpoint of the OpenID Connect stub.
//!
//! This application is intended to run as an AWS Lambda function.
//!
//! You have to configure the following environment variables:
//! - `TABLE_NAME`: name of the DynamoDB table that binds codes and nonces to
//!   scenarios
//! - `NONCE_INDEX_NAME` (optional): name of the index on `nonce` of the table.
//!   `OidcNonceIndex` by default.
//! - `OIDC_CLIENT_ID`: client ID of the relying party
//! - `ENVIRONMENT`: name of the deployment environment
//! - `SIGNING_KEY_PARAMETER_PATH`: path to the private JWK in Parameter Store
//!   on AWS Systems Manager, or
//! - `JWK_KEY_SECRET`: private JWK itself
//! - `SCENARIO_CATALOG_PATH` (optional): path to a JSON file that replaces the
//!   built-in scenario catalog

use lambda_http::{Error, run, service_fn};
use std::sync::Arc;

use oidc_stub::userinfo::{SharedState, function_handler};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        // disable printing the name of the module in every log line.
        .with_target(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        .init();

    let shared_state = Arc::new(SharedState::from_env().await?);
    run(service_fn(|req| async {
        function_handler(shared_state.clone(), req).await
    })).await
}
