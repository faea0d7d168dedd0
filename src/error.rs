//! Error kinds surfaced by the routing core and the HTTP edge.

use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::config::MessagesConfig;
use crate::dispatch::WorkerId;
use crate::protocol::ResponseMessage;

/// Every failure a request (or a route build) can end with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A catch-all segment is followed by more segments, or a name repeats.
    #[error("Invalid route path: {0}")]
    InvalidRoutePattern(String),

    #[error("No route matches {0}")]
    NotFoundRoute(String),

    #[error("Method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    /// Equally specific routes export the requested method.
    #[error("Multiple routes matched: {}", .0.join(", "))]
    MultipleRoutesMatched(Vec<String>),

    #[error("Middleware {0} neither responded nor continued in time")]
    MiddlewareTimeout(String),

    #[error("{worker} exited with code {code}")]
    WorkerFailure { worker: WorkerId, code: i32 },

    #[error("{0}")]
    Internal(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Request body exceeds {0} bytes")]
    RequestTooLong(usize),

    #[error("Invalid body: {0}")]
    InvalidBody(String),
}

impl Error {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFoundRoute(_) => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::RequestTooLong(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Error::InvalidRoutePattern(_)
            | Error::MultipleRoutesMatched(_)
            | Error::MiddlewareTimeout(_)
            | Error::WorkerFailure { .. }
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Configured user-visible message for this kind.
    pub fn message<'a>(&self, messages: &'a MessagesConfig) -> &'a str {
        match self {
            Error::NotFoundRoute(_) => &messages.not_found,
            Error::MethodNotAllowed { .. } => &messages.method_not_allowed,
            Error::MultipleRoutesMatched(_) => &messages.multiple_routes,
            Error::MiddlewareTimeout(_) => &messages.middleware_timeout,
            Error::WorkerFailure { .. } => &messages.worker_failure,
            Error::UnsupportedMediaType(_) => &messages.unsupported_media_type,
            Error::RequestTooLong(_) => &messages.request_too_long,
            Error::InvalidBody(_) => &messages.invalid_body,
            Error::InvalidRoutePattern(_) | Error::Internal(_) => &messages.internal_server_error,
        }
    }

    /// JSON response `{message, details?}` for this error.
    pub fn to_response(&self, messages: &MessagesConfig) -> ResponseMessage {
        let message = self.message(messages);
        let body = match self {
            Error::MultipleRoutesMatched(paths) => json!({ "message": message, "details": paths }),
            Error::MiddlewareTimeout(path) => json!({ "message": message, "details": path }),
            Error::Internal(detail) | Error::InvalidBody(detail) => {
                json!({ "message": message, "error": detail })
            }
            _ => json!({ "message": message }),
        };
        ResponseMessage::json(body)
            .with_status(self.status())
            .with_header("Content-Type", "application/json")
    }
}
