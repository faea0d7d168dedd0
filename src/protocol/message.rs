//! Declarative response produced by handlers and middlewares.
//!
//! # Responsibilities
//! - Describe status, headers, cookies and body of one response
//! - Carry bodies as text, raw bytes, JSON values or a live byte stream
//!
//! # Design Decisions
//! - Headers keep insertion order (they become ordered `Set` events)
//! - Header lookups are case-insensitive
//! - Cookie `max_age` may be a duration string; it is normalized on emission

use std::fmt;

use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Byte stream body. Chunks are forwarded in arrival order.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Response body variants.
pub enum ResponseBody {
    /// UTF-8 text, `text/plain` unless declared otherwise.
    Text(String),
    /// Raw bytes, `text/plain` unless declared otherwise.
    Bytes(Bytes),
    /// Structured value serialized as JSON.
    Json(serde_json::Value),
    /// Live stream, `application/octet-stream` unless declared otherwise.
    Stream(BodyStream),
}

impl ResponseBody {
    /// Content type inferred from the body shape.
    pub fn inferred_content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text(_) | ResponseBody::Bytes(_) => "text/plain",
            ResponseBody::Json(_) => "application/json",
            ResponseBody::Stream(_) => "application/octet-stream",
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ResponseBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ResponseBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Cookie `max_age`: a second count or a duration string such as `"7d"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxAge {
    Seconds(i64),
    Duration(String),
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Attributes of a cookie to set or clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CookieOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<MaxAge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

/// A cookie value and its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieValue {
    pub value: String,
    pub options: CookieOptions,
}

/// Declarative response.
#[derive(Debug, Default)]
pub struct ResponseMessage {
    pub status: Option<StatusCode>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, CookieValue)>,
    pub clear_cookies: Vec<(String, CookieOptions)>,
    pub body: Option<ResponseBody>,
}

impl ResponseMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty `204 No Content` response.
    pub fn no_content() -> Self {
        Self::new().with_status(StatusCode::NO_CONTENT)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new().with_body(ResponseBody::Text(text.into()))
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new().with_body(ResponseBody::Bytes(bytes.into()))
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::new().with_body(ResponseBody::Json(value))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self::new().with_body(ResponseBody::Stream(stream.boxed()))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        options: CookieOptions,
    ) -> Self {
        self.cookies.push((
            name.into(),
            CookieValue {
                value: value.into(),
                options,
            },
        ));
        self
    }

    pub fn with_cleared_cookie(mut self, name: impl Into<String>, options: CookieOptions) -> Self {
        self.clear_cookies.push((name.into(), options));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Status the handler declared, `200 OK` when none.
    pub fn status_or_default(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}
