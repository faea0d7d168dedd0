//! Transfer event vocabulary.
//!
//! # Invariants (per request id)
//! - `Set`, `Cookie` and `ClearCookie` precede every `Write`
//! - exactly one `Status`, followed by exactly one terminal `End`

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::message::CookieOptions;

/// Correlation token for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh, unique request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One step of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "kebab-case")]
pub enum TransferEvent {
    Set {
        name: String,
        value: String,
    },
    Cookie {
        name: String,
        value: String,
        options: CookieOptions,
    },
    ClearCookie {
        name: String,
        options: CookieOptions,
    },
    Write(Bytes),
    Status(u16),
    End,
}

impl TransferEvent {
    pub fn is_end(&self) -> bool {
        matches!(self, TransferEvent::End)
    }
}

/// A transfer event tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEnvelope {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub event: TransferEvent,
}
