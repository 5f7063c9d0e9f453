//! Logout endpoint.
//!
//! ## Endpoint
//!
//! ### `GET /logout?id_token_hint&post_logout_redirect_uri&state`
//!
//! Redirects to `post_logout_redirect_uri`, with `state` appended if given,
//! provided that `id_token_hint` is given and the URI is one of those in
//! `POST_LOGOUT_REDIRECT_URIS`. Redirects to the signed-out page of the
//! environment otherwise.

use lambda_http::{Body, Error, Request, RequestExt as _, Response};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::config::environment_from_env;
use crate::error_response::ErrorResponse;
use crate::response::{redirect, respond};

/// State shared among invocations.
#[cfg_attr(test, derive(derive_builder::Builder))]
#[cfg_attr(test, builder(setter(into), pattern = "owned"))]
pub struct SharedState {
    #[cfg_attr(test, builder(default = "\"dev\".to_string()"))]
    environment: String,
    /// `None` if the configuration is missing or malformed.
    #[cfg_attr(test, builder(default))]
    post_logout_redirect_uris: Option<Vec<String>>,
}

impl SharedState {
    /// Creates a state.
    pub fn new(
        environment: impl Into<String>,
        post_logout_redirect_uris: Option<Vec<String>>,
    ) -> Self {
        Self {
            environment: environment.into(),
            post_logout_redirect_uris,
        }
    }

    /// Creates a state from the environment.
    pub fn from_env() -> Result<Self, Error> {
        let environment = environment_from_env()?;
        let uris = env::var("POST_LOGOUT_REDIRECT_URIS").unwrap_or_else(|_| "[]".into());
        Ok(Self::new(environment, parse_redirect_uris(&uris)))
    }

    fn signed_out_url(&self) -> String {
        format!("https://signin.{}.account.gov.uk/signed-out", self.environment)
    }
}

/// Parses a JSON array of URIs.
///
/// Returns `None` unless the array is not empty and every element is a URL.
pub fn parse_redirect_uris(json: &str) -> Option<Vec<String>> {
    let uris: Vec<String> = serde_json::from_str(json)
        .map_err(|e| warn!("malformed POST_LOGOUT_REDIRECT_URIS: {e}"))
        .ok()?;
    if uris.is_empty() || uris.iter().any(|uri| Url::parse(uri).is_err()) {
        warn!("invalid POST_LOGOUT_REDIRECT_URIS: {json}");
        return None;
    }
    Some(uris)
}

/// Handles a logout request.
pub async fn function_handler(
    shared_state: Arc<SharedState>,
    event: Request,
) -> Result<Response<Body>, Error> {
    respond(logout(&shared_state, &event))
}

fn logout(shared_state: &SharedState, event: &Request) -> Result<Response<Body>, ErrorResponse> {
    let query = event.query_string_parameters();
    let location = match (query.first("id_token_hint"), query.first("post_logout_redirect_uri")) {
        (Some(_), Some(redirect_uri)) => {
            match allowed_redirect(shared_state, redirect_uri, query.first("state")) {
                Some(location) => location,
                None => {
                    info!("redirect URI not allowed: {redirect_uri}");
                    shared_state.signed_out_url()
                }
            }
        }
        _ => shared_state.signed_out_url(),
    };
    redirect(&location)
}

fn allowed_redirect(
    shared_state: &SharedState,
    redirect_uri: &str,
    state: Option<&str>,
) -> Option<String> {
    let mut url = Url::parse(redirect_uri).ok()?;
    let allowed = shared_state.post_logout_redirect_uris.as_ref()?;
    if !allowed.iter().any(|uri| uri == redirect_uri) {
        return None;
    }
    if let Some(state) = state {
        url.query_pairs_mut().append_pair("state", state);
    }
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    use lambda_http::http::StatusCode;
    use std::collections::HashMap;

    const SIGNED_OUT: &str = "https://signin.dev.account.gov.uk/signed-out";

    fn new_state(uris: &[&str]) -> Arc<SharedState> {
        Arc::new(SharedStateBuilder::default()
            .post_logout_redirect_uris(Some(uris.iter().map(|u| u.to_string()).collect::<Vec<_>>()))
            .build()
            .unwrap())
    }

    fn get_query(params: &[(&str, &str)]) -> Request {
        Request::default().with_query_string_parameters(params.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>())
    }

    async fn location(shared_state: Arc<SharedState>, params: &[(&str, &str)]) -> String {
        let res = function_handler(shared_state, get_query(params)).await.unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        res.headers()["Location"].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn function_handler_should_redirect_to_allowed_uri_with_state() {
        let shared_state = new_state(&["https://rp.example.com/signed-out"]);
        let location = location(shared_state, &[
            ("id_token_hint", "token"),
            ("post_logout_redirect_uri", "https://rp.example.com/signed-out"),
            ("state", "S 1"),
        ]).await;
        assert_eq!(location, "https://rp.example.com/signed-out?state=S+1");
    }

    #[tokio::test]
    async fn function_handler_should_keep_existing_query() {
        let shared_state = new_state(&["https://rp.example.com/out?lang=cy"]);
        let location = location(shared_state, &[
            ("id_token_hint", "token"),
            ("post_logout_redirect_uri", "https://rp.example.com/out?lang=cy"),
            ("state", "S1"),
        ]).await;
        assert_eq!(location, "https://rp.example.com/out?lang=cy&state=S1");
    }

    #[tokio::test]
    async fn function_handler_without_state() {
        let shared_state = new_state(&["https://rp.example.com/signed-out"]);
        let location = location(shared_state, &[
            ("id_token_hint", "token"),
            ("post_logout_redirect_uri", "https://rp.example.com/signed-out"),
        ]).await;
        assert_eq!(location, "https://rp.example.com/signed-out");
    }

    #[tokio::test]
    async fn function_handler_should_fall_back_to_signed_out_page() {
        let shared_state = new_state(&["https://rp.example.com/signed-out"]);
        for params in [
            vec![("post_logout_redirect_uri", "https://rp.example.com/signed-out")],
            vec![("id_token_hint", "token")],
            vec![
                ("id_token_hint", "token"),
                ("post_logout_redirect_uri", "https://evil.example.com/signed-out"),
            ],
            vec![("id_token_hint", "token"), ("post_logout_redirect_uri", "not a url")],
            vec![],
        ] {
            assert_eq!(location(shared_state.clone(), &params).await, SIGNED_OUT, "{params:?}");
        }
    }

    #[tokio::test]
    async fn function_handler_without_configured_uris() {
        let shared_state = Arc::new(SharedStateBuilder::default().build().unwrap());
        let location = location(shared_state, &[
            ("id_token_hint", "token"),
            ("post_logout_redirect_uri", "https://rp.example.com/signed-out"),
        ]).await;
        assert_eq!(location, SIGNED_OUT);
    }

    #[test]
    fn parse_redirect_uris_should_reject_malformed_configuration() {
        assert_eq!(
            parse_redirect_uris(r#"["https://rp.example.com/a","https://rp.example.com/b"]"#),
            Some(vec!["https://rp.example.com/a".to_string(), "https://rp.example.com/b".to_string()]),
        );
        assert_eq!(parse_redirect_uris("[]"), None);
        assert_eq!(parse_redirect_uris(r#"["not a url"]"#), None);
        assert_eq!(parse_redirect_uris("{"), None);
        assert_eq!(parse_redirect_uris(r#""https://rp.example.com/a""#), None);
    }
}
