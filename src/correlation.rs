//! Correlation of authorization codes, nonces and scenarios.
//!
//! The authorization endpoint binds a fresh code and the caller's nonce to a
//! scenario key. The token endpoint recovers the nonce from the code, and the
//! resource endpoints recover the scenario key from the nonce embedded in a
//! bearer token.

use aws_sdk_dynamodb::{primitives::DateTime, types::AttributeValue};
use std::env;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tracing::{error, info};

use crate::error::Error;
use crate::error_response::ErrorResponse;
use crate::sdk_error_ext::SdkErrorExt as _;

/// User ID of a record that does not have one.
pub const DEFAULT_USER_ID: &str = "F5CE808F-75AB-4ECD-BBFC-FF9DBF5330FA";

/// Default name of the secondary index on `nonce`.
pub const DEFAULT_NONCE_INDEX_NAME: &str = "OidcNonceIndex";

/// How long a record lives.
pub const RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Record written by the authorization endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationRecord {
    /// Authorization code.
    pub code: String,
    /// Nonce supplied by the caller.
    pub nonce: String,
    /// Scenario key.
    pub scenario_key: String,
}

/// Store of [`CorrelationRecord`]s.
///
/// Lookups are exact-match. If more than one record shares a nonce, the
/// first match wins.
pub trait CorrelationStore {
    /// Persists a record that expires after `ttl`.
    fn put(
        &self,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), ErrorResponse>> + Send;

    /// Resolves the nonce bound to a code.
    fn resolve_nonce_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<String>, ErrorResponse>> + Send;

    /// Resolves the scenario key bound to a nonce.
    fn resolve_scenario_by_nonce(
        &self,
        nonce: &str,
    ) -> impl Future<Output = Result<Option<String>, ErrorResponse>> + Send;
}

/// [`CorrelationStore`] backed by a DynamoDB table.
///
/// Items have the following attributes:
/// - `code`: partition key
/// - `nonce`: partition key of the secondary index
/// - `userId`: scenario key
/// - `remove_at`: expiration time in epoch seconds (TTL attribute)
#[derive(Clone, Debug)]
pub struct DynamoDbCorrelationStore {
    dynamodb: aws_sdk_dynamodb::Client,
    table_name: String,
    nonce_index_name: String,
}

impl DynamoDbCorrelationStore {
    /// Creates a store.
    pub fn new(
        dynamodb: aws_sdk_dynamodb::Client,
        table_name: impl Into<String>,
        nonce_index_name: impl Into<String>,
    ) -> Self {
        Self {
            dynamodb,
            table_name: table_name.into(),
            nonce_index_name: nonce_index_name.into(),
        }
    }

    /// Creates a store on the table given by `TABLE_NAME`.
    ///
    /// `NONCE_INDEX_NAME` overrides the name of the secondary index.
    pub fn from_env(config: &aws_config::SdkConfig) -> Result<Self, lambda_http::Error> {
        Ok(Self::new(
            aws_sdk_dynamodb::Client::new(config),
            env::var("TABLE_NAME").or(Err("TABLE_NAME env must be set"))?,
            env::var("NONCE_INDEX_NAME")
                .unwrap_or_else(|_| DEFAULT_NONCE_INDEX_NAME.to_string()),
        ))
    }
}

impl CorrelationStore for DynamoDbCorrelationStore {
    async fn put(
        &self,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> Result<(), ErrorResponse> {
        let remove_at = DateTime::from(SystemTime::now() + ttl).secs();
        info!(code = %record.code, scenario = %record.scenario_key, "putting correlation record");
        self.dynamodb
            .put_item()
            .table_name(self.table_name.clone())
            .item("code", AttributeValue::S(record.code.clone()))
            .item("nonce", AttributeValue::S(record.nonce.clone()))
            .item("userId", AttributeValue::S(record.scenario_key.clone()))
            .item("remove_at", AttributeValue::N(remove_at.to_string()))
            .send()
            .await
            .map_err(|e| if e.is_retryable() {
                ErrorResponse::unavailable("service temporarily unavailable")
            } else {
                e.into()
            })?;
        Ok(())
    }

    async fn resolve_nonce_by_code(
        &self,
        code: &str,
    ) -> Result<Option<String>, ErrorResponse> {
        info!(code, "getting correlation record");
        let item = self.dynamodb
            .get_item()
            .table_name(self.table_name.clone())
            .key("code", AttributeValue::S(code.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| if e.is_retryable() {
                ErrorResponse::unavailable("service temporarily unavailable")
            } else {
                e.into()
            })?
            .item;
        let Some(item) = item else {
            return Ok(None);
        };
        match item.get("nonce") {
            Some(AttributeValue::S(nonce)) => Ok(Some(nonce.clone())),
            _ => {
                error!("correlation record without nonce: {code}");
                Err(Error::MalformedRecord("nonce must be a string").into())
            }
        }
    }

    async fn resolve_scenario_by_nonce(
        &self,
        nonce: &str,
    ) -> Result<Option<String>, ErrorResponse> {
        info!(nonce, "querying correlation record");
        let items = self.dynamodb
            .query()
            .table_name(self.table_name.clone())
            .index_name(self.nonce_index_name.clone())
            .key_condition_expression("nonce = :nonce")
            .expression_attribute_values(":nonce", AttributeValue::S(nonce.to_string()))
            .limit(1)
            .send()
            .await
            .map_err(|e| if e.is_retryable() {
                ErrorResponse::unavailable("service temporarily unavailable")
            } else {
                e.into()
            })?
            .items
            .unwrap_or_default();
        Ok(items.into_iter().next().map(|item| match item.get("userId") {
            Some(AttributeValue::S(user_id)) if !user_id.is_empty() => user_id.clone(),
            _ => DEFAULT_USER_ID.to_string(),
        }))
    }
}
