//! Builders of successful responses and rendering of handler results.

use lambda_http::{Body, Error, Response, http::StatusCode};
use serde::Serialize;
use tracing::{error, info};

use crate::error_response::ErrorResponse;

/// JSON response.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Result<Response<Body>, ErrorResponse> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_string(body)?.into())?)
}

/// Response with a given content type.
pub fn with_content_type(
    content_type: &str,
    body: impl Into<Body>,
) -> Result<Response<Body>, ErrorResponse> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .body(body.into())?)
}

/// 204 No Content.
pub fn no_content() -> Result<Response<Body>, ErrorResponse> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::Empty)?)
}

/// 302 Found.
pub fn redirect(location: &str) -> Result<Response<Body>, ErrorResponse> {
    Ok(Response::builder()
        .status(StatusCode::FOUND)
        .header("Location", location)
        .body(Body::Empty)?)
}

/// Renders the result of a handler.
///
/// [`ErrorResponse::Unhandled`] is logged and turned into an opaque error so
/// that its details never reach the client.
pub fn respond(res: Result<Response<Body>, ErrorResponse>) -> Result<Response<Body>, Error> {
    match res {
        Ok(res) => Ok(res),
        Err(ErrorResponse::Unhandled(e)) => {
            error!("{e:?}");
            Err("internal server error".into())
        }
        Err(e) => {
            info!("responding with error: {e:?}");
            e.try_into()
        }
    }
}
