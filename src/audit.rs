//! Audit events sent to the TxMA (transaction monitoring) queue.

use serde::{Deserialize, Serialize};
use std::env;
use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use uuid::Uuid;

use crate::error_response::ErrorResponse;
use crate::sdk_error_ext::SdkErrorExt as _;

/// Name of the event emitted when an authorization code is issued.
pub const AUTH_CODE_ISSUED: &str = "AUTH_AUTH_CODE_ISSUED";

/// Client ID reported in audit events.
pub const AUDIT_CLIENT_ID: &str = "vehicleOperatorLicense";

/// TxMA event.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TxmaEvent {
    /// Unique ID of the event.
    pub event_id: String,
    /// Epoch milliseconds.
    pub timestamp: u64,
    /// Event name.
    pub event_name: String,
    /// Client ID.
    pub client_id: String,
    /// User.
    pub user: TxmaUser,
}

/// User part of a [`TxmaEvent`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TxmaUser {
    /// User ID.
    pub user_id: String,
    /// Session ID.
    pub session_id: String,
}

impl TxmaEvent {
    /// Creates an event that records the issuance of an authorization code
    /// to a given user.
    pub fn auth_code_issued(user_id: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp,
            event_name: AUTH_CODE_ISSUED.to_string(),
            client_id: AUDIT_CLIENT_ID.to_string(),
            user: TxmaUser {
                user_id: user_id.into(),
                session_id: Uuid::new_v4().to_string(),
            },
        }
    }
}

/// Destination of audit events.
pub trait AuditSink {
    /// Sends an event.
    fn send(
        &self,
        event: &TxmaEvent,
    ) -> impl Future<Output = Result<(), ErrorResponse>> + Send;
}

/// [`AuditSink`] that sends events to an SQS queue.
#[derive(Clone, Debug)]
pub struct SqsAuditSink {
    sqs: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsAuditSink {
    /// Creates a sink.
    pub fn new(sqs: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            sqs,
            queue_url: queue_url.into(),
        }
    }

    /// Creates a sink that sends events to the queue given by
    /// `DUMMY_TXMA_QUEUE_URL`.
    pub fn from_env(config: &aws_config::SdkConfig) -> Result<Self, lambda_http::Error> {
        Ok(Self::new(
            aws_sdk_sqs::Client::new(config),
            env::var("DUMMY_TXMA_QUEUE_URL")
                .or(Err("DUMMY_TXMA_QUEUE_URL env must be set"))?,
        ))
    }
}

impl AuditSink for SqsAuditSink {
    async fn send(&self, event: &TxmaEvent) -> Result<(), ErrorResponse> {
        let body = serde_json::to_string(event)?;
        let output = self.sqs
            .send_message()
            .queue_url(self.queue_url.clone())
            .message_body(body)
            .send()
            .await
            .map_err(|e| if e.is_retryable() {
                ErrorResponse::unavailable("service temporarily unavailable")
            } else {
                e.into()
            })?;
        info!(
            event_id = %event.event_id,
            message_id = ?output.message_id,
            "sent audit event",
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use aws_smithy_mocks::{MockResponseInterceptor, RuleMode};

    use self::mocks::sqs;

    #[test]
    fn auth_code_issued_should_identify_user_and_client() {
        let event = TxmaEvent::auth_code_issued("userDEFAULTAuthApp");
        assert_eq!(event.event_name, "AUTH_AUTH_CODE_ISSUED");
        assert_eq!(event.client_id, "vehicleOperatorLicense");
        assert_eq!(event.user.user_id, "userDEFAULTAuthApp");
        assert_ne!(event.event_id, event.user.session_id);
        assert!(event.timestamp > 0);
    }

    #[tokio::test]
    async fn send_should_post_event_json_to_queue() {
        let send_message = sqs::send_message_ok();
        let sink = SqsAuditSink::new(
            sqs::new_client(MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&send_message)),
            "https://sqs.eu-west-2.amazonaws.com/123456789012/txma",
        );
        sink.send(&TxmaEvent::auth_code_issued("default")).await.unwrap();
        assert_eq!(send_message.num_calls(), 1);
    }

    #[tokio::test]
    async fn send_with_request_throttled() {
        let sink = SqsAuditSink::new(
            sqs::new_client(MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&sqs::send_message_request_throttled())),
            "https://sqs.eu-west-2.amazonaws.com/123456789012/txma",
        );
        let res = sink.send(&TxmaEvent::auth_code_issued("default")).await;
        assert!(matches!(res, Err(ErrorResponse::Unavailable(_))));
    }

    #[tokio::test]
    async fn send_with_queue_does_not_exist() {
        let sink = SqsAuditSink::new(
            sqs::new_client(MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&sqs::send_message_queue_does_not_exist())),
            "https://sqs.eu-west-2.amazonaws.com/123456789012/txma",
        );
        let res = sink.send(&TxmaEvent::auth_code_issued("default")).await;
        assert!(matches!(res, Err(ErrorResponse::Unhandled(_))));
    }

    pub(crate) mod mocks {
        pub(crate) mod sqs {
            use aws_sdk_sqs::{
                Client,
                Config,
                config::Region,
                operation::send_message::{SendMessageError, SendMessageOutput},
                types::error::{QueueDoesNotExist, RequestThrottled},
            };
            use aws_smithy_mocks::{MockResponseInterceptor, Rule, mock};

            use crate::audit::TxmaEvent;

            pub(crate) fn new_client(mocks: MockResponseInterceptor) -> Client {
                let mock_http_client = aws_smithy_mocks::create_mock_http_client();
                Client::from_conf(
                    Config::builder()
                        .with_test_defaults()
                        .region(Region::new("eu-west-2"))
                        .http_client(mock_http_client)
                        .interceptor(mocks)
                        .build(),
                )
            }

            pub(crate) fn send_message_ok() -> Rule {
                mock!(Client::send_message)
                    .match_requests(|r| {
                        r.message_body()
                            .and_then(|body| serde_json::from_str::<TxmaEvent>(body).ok())
                            .is_some_and(|event| event.event_name == "AUTH_AUTH_CODE_ISSUED")
                    })
                    .then_output(|| SendMessageOutput::builder()
                        .message_id("0b1c4e6a-7f27-4c4c-9f3e-1d0c2b0c9a11")
                        .build())
            }

            pub(crate) fn send_message_request_throttled() -> Rule {
                mock!(Client::send_message)
                    .then_error(|| SendMessageError::RequestThrottled(
                        RequestThrottled::builder().build(),
                    ))
            }

            pub(crate) fn send_message_queue_does_not_exist() -> Rule {
                mock!(Client::send_message)
                    .then_error(|| SendMessageError::QueueDoesNotExist(
                        QueueDoesNotExist::builder().build(),
                    ))
            }
        }
    }
}
