//! Authorization endpoint.
//!
//! ## Endpoints
//!
//! ### `GET /authorize?state&nonce&redirect_uri`
//!
//! Renders an HTML page that lets the tester pick a scenario instead of
//! logging in. With a `request` query parameter (JWT-secured authorization
//! request), `state`, `nonce` and `redirect_uri` are taken from the claims of
//! the request object, which is not verified.
//!
//! ### `POST /authorize`
//!
//! Takes `state`, `nonce`, `redirectUri` and `scenario` as
//! `application/x-www-form-urlencoded`, binds a fresh authorization code and
//! the nonce to the scenario, emits an audit event, and redirects to
//! `{redirectUri}?state={state}&code={code}`.

use askama::Template;
use lambda_http::{
    Body,
    Error,
    Request,
    RequestExt as _,
    Response,
    http::{Method, StatusCode},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use url::form_urlencoded;
use uuid::Uuid;

use crate::audit::{AuditSink, SqsAuditSink, TxmaEvent};
use crate::correlation::{
    CorrelationRecord,
    CorrelationStore,
    DynamoDbCorrelationStore,
    RECORD_TTL,
};
use crate::error_response::ErrorResponse;
use crate::jwt::decode_claims;
use crate::response::{redirect, respond, with_content_type};
use crate::scenario::{DEFAULT_SCENARIO, ScenarioCatalog};

/// State shared among invocations.
#[cfg_attr(test, derive(derive_builder::Builder))]
#[cfg_attr(test, builder(setter(into), pattern = "owned"))]
pub struct SharedState<S, A> {
    store: S,
    audit: A,
    #[cfg_attr(test, builder(default = "ScenarioCatalog::embedded().unwrap()"))]
    catalog: ScenarioCatalog,
}

impl<S, A> SharedState<S, A> {
    /// Creates a state.
    pub fn new(store: S, audit: A, catalog: ScenarioCatalog) -> Self {
        Self { store, audit, catalog }
    }
}

impl SharedState<DynamoDbCorrelationStore, SqsAuditSink> {
    /// Creates a state from the environment.
    pub async fn from_env() -> Result<Self, Error> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(
            DynamoDbCorrelationStore::from_env(&config)?,
            SqsAuditSink::from_env(&config)?,
            ScenarioCatalog::from_env()?,
        ))
    }
}

/// Parameters of an authorization request.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthorizeParameters {
    /// State.
    pub state: Option<String>,
    /// Nonce.
    pub nonce: Option<String>,
    /// Redirect URI.
    pub redirect_uri: Option<String>,
}

impl AuthorizeParameters {
    /// Returns `(state, nonce, redirect_uri)` if all of them are given.
    fn require(&self) -> Result<(&str, &str, &str), ErrorResponse> {
        let nonce = non_empty(&self.nonce).ok_or_else(|| ErrorResponse::bad_request("no nonce"))?;
        let state = non_empty(&self.state).ok_or_else(|| ErrorResponse::bad_request("no state"))?;
        let redirect_uri = non_empty(&self.redirect_uri)
            .ok_or_else(|| ErrorResponse::bad_request("no redirect url"))?;
        Ok((state, nonce, redirect_uri))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Handles a request to the authorization endpoint.
pub async fn function_handler<S, A>(
    shared_state: Arc<SharedState<S, A>>,
    event: Request,
) -> Result<Response<Body>, Error>
where
    S: CorrelationStore,
    A: AuditSink,
{
    let res = match *event.method() {
        Method::GET => select_scenario(&shared_state.catalog, &event),
        Method::POST => authorize(&shared_state, &event).await,
        _ => Err(ErrorResponse::Status(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("unsupported method: {}", event.method()),
        )),
    };
    respond(res)
}

fn select_scenario(
    catalog: &ScenarioCatalog,
    event: &Request,
) -> Result<Response<Body>, ErrorResponse> {
    let query = event.query_string_parameters();
    let params = match query.first("request") {
        Some(request) => {
            info!("JWT-secured authorization request");
            decode_claims::<AuthorizeParameters>(request).map_err(|e| {
                info!("{e}");
                ErrorResponse::bad_request("invalid request object")
            })?
        }
        None => AuthorizeParameters {
            state: query.first("state").map(String::from),
            nonce: query.first("nonce").map(String::from),
            redirect_uri: query.first("redirect_uri").map(String::from),
        },
    };
    let (state, nonce, redirect_uri) = params.require()?;
    let page = ScenarioPicker {
        state,
        nonce,
        redirect_uri,
        keys: catalog.keys().collect(),
    };
    with_content_type("text/html", page.render()?)
}

/// Page that lets the tester pick a scenario.
#[derive(Template)]
#[template(path = "scenario_picker.html")]
struct ScenarioPicker<'a> {
    state: &'a str,
    nonce: &'a str,
    redirect_uri: &'a str,
    keys: Vec<&'a str>,
}

async fn authorize<S, A>(
    shared_state: &SharedState<S, A>,
    event: &Request,
) -> Result<Response<Body>, ErrorResponse>
where
    S: CorrelationStore,
    A: AuditSink,
{
    let form: HashMap<String, String> = form_urlencoded::parse(event.body().as_ref())
        .into_owned()
        .collect();
    let params = AuthorizeParameters {
        state: form.get("state").cloned(),
        nonce: form.get("nonce").cloned(),
        redirect_uri: form.get("redirectUri").cloned(),
    };
    let (state, nonce, redirect_uri) = params.require()?;
    let scenario = form.get("scenario")
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SCENARIO);
    info!("authorize: scenario={scenario}");

    let record = CorrelationRecord {
        code: Uuid::new_v4().to_string(),
        nonce: nonce.to_string(),
        scenario_key: scenario.to_string(),
    };
    let audit_event = TxmaEvent::auth_code_issued(scenario);
    // both or nothing
    let res = tokio::try_join!(
        shared_state.store.put(&record, RECORD_TTL),
        shared_state.audit.send(&audit_event),
    );
    match res {
        Ok(_) => {
            let state: String = form_urlencoded::byte_serialize(state.as_bytes()).collect();
            redirect(&format!("{redirect_uri}?state={state}&code={}", record.code))
        }
        Err(e) => {
            error!("failed to issue authorization code: {e:?}");
            Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Location", "Internal Server Error")
                .body(Body::Empty)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_smithy_mocks::{MockResponseInterceptor, RuleMode};
    use base64::{
        Engine as _,
        engine::general_purpose::{URL_SAFE_NO_PAD as base64url},
    };
    use std::collections::HashMap;

    use crate::audit::tests::mocks::sqs;
    use crate::correlation::tests::mocks::dynamodb;
    use crate::error_response::body_text;

    const QUEUE_URL: &str = "https://sqs.eu-west-2.amazonaws.com/123456789012/txma";

    fn new_state(
        dynamodb: MockResponseInterceptor,
        sqs: MockResponseInterceptor,
    ) -> Arc<SharedState<DynamoDbCorrelationStore, SqsAuditSink>> {
        Arc::new(SharedStateBuilder::default()
            .store(DynamoDbCorrelationStore::new(
                dynamodb::new_client(dynamodb),
                "correlation",
                "OidcNonceIndex",
            ))
            .audit(SqsAuditSink::new(sqs::new_client(sqs), QUEUE_URL))
            .build()
            .unwrap())
    }

    fn post_form(body: &str) -> Request {
        lambda_http::http::Request::builder()
            .method("POST")
            .uri("/authorize")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    fn get_query(params: &[(&str, &str)]) -> Request {
        lambda_http::http::Request::builder()
            .method("GET")
            .uri("/authorize")
            .body(Body::Empty)
            .unwrap()
            .with_query_string_parameters(params.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>())
    }

    #[tokio::test]
    async fn function_handler_authorize() {
        let put_item = dynamodb::put_item_ok();
        let send_message = sqs::send_message_ok();
        let shared_state = new_state(
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&put_item),
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&send_message),
        );
        let res = function_handler(
            shared_state,
            post_form("state=S1&nonce=N1&redirectUri=https%3A%2F%2Fhome.dev.account.gov.uk%2Fauth%2Fcallback&scenario=userDEFAULTAuthApp"),
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        let location = res.headers()["Location"].to_str().unwrap();
        let code = location
            .strip_prefix("https://home.dev.account.gov.uk/auth/callback?state=S1&code=")
            .unwrap();
        assert!(Uuid::parse_str(code).is_ok());
        assert_eq!(put_item.num_calls(), 1);
        assert_eq!(send_message.num_calls(), 1);
    }

    #[tokio::test]
    async fn function_handler_authorize_should_issue_fresh_codes() {
        let shared_state = new_state(
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&dynamodb::put_item_ok()),
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&sqs::send_message_ok()),
        );
        let form = "state=S1&nonce=N1&redirectUri=R";
        let first = function_handler(shared_state.clone(), post_form(form)).await.unwrap();
        let second = function_handler(shared_state, post_form(form)).await.unwrap();
        assert_ne!(first.headers()["Location"], second.headers()["Location"]);
    }

    #[tokio::test]
    async fn function_handler_authorize_without_parameters() {
        let shared_state = new_state(MockResponseInterceptor::new(), MockResponseInterceptor::new());
        for (form, message) in [
            ("state=S1&redirectUri=R", "no nonce"),
            ("nonce=N1&redirectUri=R", "no state"),
            ("state=S1&nonce=N1", "no redirect url"),
            ("state=S1&nonce=&redirectUri=R", "no nonce"),
        ] {
            let res = function_handler(shared_state.clone(), post_form(form)).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_text(&res), format!(r#"{{"error":"{message}"}}"#));
        }
    }

    #[tokio::test]
    async fn function_handler_authorize_with_put_item_failure() {
        let send_message = sqs::send_message_ok();
        let shared_state = new_state(
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&dynamodb::put_item_resource_not_found_exception()),
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&send_message),
        );
        let res = function_handler(shared_state, post_form("state=S1&nonce=N1&redirectUri=R"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers()["Location"], "Internal Server Error");
    }

    #[tokio::test]
    async fn function_handler_authorize_with_send_message_failure() {
        let shared_state = new_state(
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&dynamodb::put_item_ok()),
            MockResponseInterceptor::new()
                .rule_mode(RuleMode::MatchAny)
                .with_rule(&sqs::send_message_queue_does_not_exist()),
        );
        let res = function_handler(shared_state, post_form("state=S1&nonce=N1&redirectUri=R"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers()["Location"], "Internal Server Error");
    }

    #[tokio::test]
    async fn function_handler_select_scenario() {
        let shared_state = new_state(MockResponseInterceptor::new(), MockResponseInterceptor::new());
        let res = function_handler(
            shared_state,
            get_query(&[("state", "S1"), ("nonce", "N1"), ("redirect_uri", "R")]),
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["Content-Type"], "text/html");
        let html = body_text(&res);
        assert!(html.contains(r#"<input type="hidden" name="nonce" value="N1" />"#));
        assert!(html.contains(r#"<input type="hidden" name="redirectUri" value="R" />"#));
        assert!(html.contains(r#"<button name="scenario" value="default">default</button>"#));
        assert!(html.contains(r#"value="userDEFAULTAuthApp""#));
    }

    #[tokio::test]
    async fn function_handler_select_scenario_with_request_object() {
        let shared_state = new_state(MockResponseInterceptor::new(), MockResponseInterceptor::new());
        let request_object = format!(
            "eyJhbGciOiJFUzI1NiJ9.{}.c2ln",
            base64url.encode(r#"{"state":"S2","nonce":"N2","redirect_uri":"R2","client_id":"c"}"#),
        );
        let res = function_handler(
            shared_state,
            get_query(&[("request", &request_object)]),
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(&res).contains(r#"name="nonce" value="N2""#));
    }

    #[tokio::test]
    async fn function_handler_select_scenario_should_escape_parameters() {
        let shared_state = new_state(MockResponseInterceptor::new(), MockResponseInterceptor::new());
        let res = function_handler(
            shared_state,
            get_query(&[("state", "\"><script>"), ("nonce", "N1"), ("redirect_uri", "R")]),
        ).await.unwrap();
        let html = body_text(&res);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&quot;&gt;&lt;script&gt;"));
    }

    #[tokio::test]
    async fn function_handler_select_scenario_without_nonce() {
        let shared_state = new_state(MockResponseInterceptor::new(), MockResponseInterceptor::new());
        let res = function_handler(
            shared_state,
            get_query(&[("state", "S1"), ("redirect_uri", "R")]),
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
