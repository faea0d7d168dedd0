//! Request parsing into a `RequestEnvelope`.
//!
//! # Responsibilities
//! - Enforce content-type and size limits before reading the body
//! - Decode query string, cookies and body
//! - Record where the request came from
//!
//! # Design Decisions
//! - A missing Content-Type is treated as JSON
//! - `GET` bodies are never read
//! - Form values are auto-detected (`true`, `off`, `42`) like the JSON ones

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap, Method};
use cookie::Cookie;
use serde_json::{Map, Number, Value};

use crate::config::LimitsConfig;
use crate::error::Error;
use crate::middleware::{Origin, RequestEnvelope};

/// Body encodings the edge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    Text,
}

impl BodyKind {
    /// Classify a Content-Type header value.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, Error> {
        let Some(raw) = content_type else {
            return Ok(BodyKind::Json);
        };
        let essence = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "" | "application/json" => Ok(BodyKind::Json),
            "application/x-www-form-urlencoded" => Ok(BodyKind::Form),
            "text/plain" => Ok(BodyKind::Text),
            _ if essence.ends_with("+json") => Ok(BodyKind::Json),
            _ => Err(Error::UnsupportedMediaType(raw.to_string())),
        }
    }
}

/// Turn an axum request into an envelope for the dispatch pool.
pub async fn build_envelope(
    parts: Parts,
    body: Body,
    peer: Option<SocketAddr>,
    limits: &LimitsConfig,
) -> Result<RequestEnvelope, Error> {
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let kind = BodyKind::from_content_type(content_type)?;

    let declared_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if declared_length > limits.body_max_size {
        return Err(Error::RequestTooLong(limits.body_max_size));
    }

    let body = if parts.method == Method::GET {
        Value::Object(Map::new())
    } else {
        let bytes = axum::body::to_bytes(body, limits.body_max_size)
            .await
            .map_err(|_| Error::RequestTooLong(limits.body_max_size))?;
        parse_body(kind, &bytes)?
    };

    Ok(RequestEnvelope {
        path: parts.uri.path().to_string(),
        query: parse_query(parts.uri.query()),
        cookies: parse_cookies(&parts.headers),
        origin: origin(&parts.headers, peer),
        method: parts.method,
        headers: parts.headers,
        body,
    })
}

/// Decode a body of the given kind. An empty body is `{}`.
pub fn parse_body(kind: BodyKind, bytes: &Bytes) -> Result<Value, Error> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match kind {
        BodyKind::Json => {
            serde_json::from_slice(bytes).map_err(|e| Error::InvalidBody(e.to_string()))
        }
        BodyKind::Form => Ok(parse_form(bytes)),
        BodyKind::Text => std::str::from_utf8(bytes)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| Error::InvalidBody(e.to_string())),
    }
}

/// Decode urlencoded pairs into an object. Repeated keys collect into an array.
fn parse_form(bytes: &[u8]) -> Value {
    let mut object = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = auto_detect(&value);
        match object.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(object)
}

/// Booleans and numbers written as text become typed values.
pub fn auto_detect(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "no" | "n" | "false" | "f" | "off" => return Value::Bool(false),
        "yes" | "y" | "true" | "t" | "on" => return Value::Bool(true),
        _ => {}
    }
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        if let Ok(int) = trimmed.parse::<i64>() {
            return Value::Number(int.into());
        }
        if let Some(float) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(float);
        }
    }
    Value::String(raw.to_string())
}

/// Ordered, decoded query pairs.
pub fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// Every cookie of every `Cookie` header. Malformed pairs are skipped.
pub fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| Cookie::split_parse_encoded(v.to_string()))
        .filter_map(Result::ok)
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

/// Origin (or Host) with a scheme, plus the peer address.
pub fn origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> Origin {
    let url = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(with_scheme);

    Origin {
        url,
        ip: peer.map(|p| p.ip()),
    }
}

fn with_scheme(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else if raw.starts_with("localhost") || raw.starts_with("127.0.0.1") {
        format!("http://{}", raw)
    } else {
        format!("https://{}", raw)
    }
}
