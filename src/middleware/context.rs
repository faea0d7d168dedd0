//! Request envelope and per-request context.

use std::collections::BTreeMap;
use std::net::IpAddr;

use axum::http::{HeaderMap, Method};
use serde_json::{Map, Value};

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// Origin (or Host) with scheme, when the client sent one.
    pub url: Option<String>,
    /// Peer address.
    pub ip: Option<IpAddr>,
}

/// Transport-agnostic request handed from the edge to the dispatch pool.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    /// Raw (still percent-encoded) request path.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
    pub body: Value,
    pub origin: Origin,
}

impl RequestEnvelope {
    /// Bodyless request, mostly useful in tests and tools.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            body: Value::Null,
            origin: Origin::default(),
        }
    }

    /// Raw `Range` header, if present.
    pub fn range_header(&self) -> Option<String> {
        self.headers
            .get(axum::http::header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Per-request state seen by middlewares and handlers.
///
/// `custom` starts empty and accumulates what middlewares pass on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Value,
    pub custom: Map<String, Value>,
    pub origin: Origin,
}

impl RequestContext {
    pub fn new(envelope: RequestEnvelope, params: BTreeMap<String, String>) -> Self {
        Self {
            method: envelope.method,
            path: envelope.path,
            query: envelope.query,
            headers: envelope.headers,
            cookies: envelope.cookies,
            params,
            body: envelope.body,
            custom: Map::new(),
            origin: envelope.origin,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First query value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Deep-merge a middleware's partial data into `custom`.
    pub fn merge_custom(&mut self, partial: Value) {
        if let Value::Object(partial) = partial {
            deep_merge(&mut self.custom, partial);
        }
    }
}

/// Recursively merge `source` into `target`; nested objects merge, other values replace.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Object(incoming) => {
                if let Some(Value::Object(existing)) = target.get_mut(&key) {
                    deep_merge(existing, incoming);
                } else {
                    target.insert(key, Value::Object(incoming));
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}
