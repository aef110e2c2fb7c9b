//! Responses produced by the dispatcher itself.
//!
//! # Responsibilities
//! - Build rejection and error responses
//! - Stamp the request ID on every response
//!
//! # Design Decisions
//! - Rejections close the connection (`Connection: close`)
//! - Bodies are short plain text; no internal details leak

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use crate::http::request::{RequestId, X_REQUEST_ID};

/// Plain-text response with the given status.
pub fn plain(status: StatusCode, body: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Rejection that also asks the client to close the connection.
pub fn reject(status: StatusCode, body: &'static str) -> Response {
    let mut response = plain(status, body);
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

pub fn payload_too_large() -> Response {
    reject(StatusCode::PAYLOAD_TOO_LARGE, "Request too large")
}

pub fn client_blocked() -> Response {
    reject(StatusCode::TOO_MANY_REQUESTS, "Client blocked")
}

/// Admitted request that arrived after the limiter closed.
pub fn shutting_down() -> Response {
    reject(StatusCode::SERVICE_UNAVAILABLE, "Server shutting down")
}

pub fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "Not found")
}

/// Response for a failed or panicked handler.
pub fn handler_failed(status: StatusCode) -> Response {
    let body = match status {
        StatusCode::PAYLOAD_TOO_LARGE => "Request too large",
        StatusCode::BAD_REQUEST => "Bad request",
        _ => "Internal server error",
    };
    plain(status, body)
}

/// Attach the request ID header.
pub fn with_request_id(mut response: Response, request_id: RequestId) -> Response {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}
