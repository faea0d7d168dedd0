//! Conversion of a `ResponseMessage` into ordered transfer events.
//!
//! # Event Order
//! ```text
//! Set* → Cookie* → ClearCookie* → Write* → Status → End
//! ```
//!
//! # Design Decisions
//! - In-memory payloads are written in bounded chunks (zero-copy slices)
//! - Streams are forwarded chunk by chunk as they arrive
//! - A satisfiable single `Range` yields `206` and `Content-Range`; only a
//!   buffered payload also gets a `Content-Length`, a ranged stream may end
//!   short of its declared size
//! - A ranged stream is dropped as soon as the range end has been passed
//! - A stream that fails or panics while polled is truncated, `Status` and
//!   `End` still follow

use std::panic::AssertUnwindSafe;

use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::{FutureExt, StreamExt};

use crate::protocol::cookie::normalize_options;
use crate::protocol::event::TransferEvent;
use crate::protocol::message::{BodyStream, ResponseBody, ResponseMessage};
use crate::protocol::range::{parse_range, ByteRange};

/// Upper bound of a single `Write` event for in-memory payloads.
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

enum Payload {
    Buffered(Bytes),
    Streamed(BodyStream),
}

/// Emit the events of `message` through `send`.
///
/// `range` is the raw `Range` request header, if any.
pub async fn emit_response<F>(message: ResponseMessage, range: Option<String>, mut send: F)
where
    F: FnMut(TransferEvent),
{
    let declared_type = message.header("content-type").is_some();
    let declared_length = message
        .header("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok());
    let declared_status = message.status;

    let ResponseMessage {
        headers,
        cookies,
        clear_cookies,
        body,
        ..
    } = message;

    let inferred_type = body.as_ref().map(ResponseBody::inferred_content_type);
    let payload = body.map(|body| match body {
        ResponseBody::Text(text) => Payload::Buffered(Bytes::from(text)),
        ResponseBody::Bytes(bytes) => Payload::Buffered(bytes),
        ResponseBody::Json(value) => Payload::Buffered(Bytes::from(value.to_string())),
        ResponseBody::Stream(stream) => Payload::Streamed(stream),
    });

    let total = match &payload {
        Some(Payload::Buffered(bytes)) => Some(bytes.len() as u64),
        Some(Payload::Streamed(_)) => declared_length,
        None => None,
    };
    let range = match (range.as_deref(), total) {
        (Some(header), Some(total)) => parse_range(header, total),
        _ => None,
    };

    // 1. headers
    for (name, value) in headers {
        if range.is_some() && name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        send(TransferEvent::Set { name, value });
    }
    if let (false, Some(content_type)) = (declared_type, inferred_type) {
        send(set("Content-Type", content_type));
    }
    if matches!(payload, Some(Payload::Streamed(_))) {
        send(set("Accept-Ranges", "bytes"));
    }
    if let Some(range) = &range {
        send(set("Content-Range", range.content_range()));
        if matches!(payload, Some(Payload::Buffered(_))) {
            send(set("Content-Length", range.len().to_string()));
        }
    }

    // 2. cookies
    for (name, cookie) in cookies {
        send(TransferEvent::Cookie {
            name,
            value: cookie.value,
            options: normalize_options(cookie.options),
        });
    }

    // 3. cleared cookies
    for (name, options) in clear_cookies {
        send(TransferEvent::ClearCookie {
            name,
            options: normalize_options(options),
        });
    }

    // 4. body
    match payload {
        Some(Payload::Buffered(bytes)) => {
            let bytes = match &range {
                Some(range) => bytes.slice(range.start as usize..=range.end as usize),
                None => bytes,
            };
            write_buffered(bytes, &mut send);
        }
        Some(Payload::Streamed(stream)) => match range {
            Some(range) => write_stream_range(stream, range, &mut send).await,
            None => write_stream(stream, &mut send).await,
        },
        None => {}
    }

    // 5. status
    let status = declared_status.unwrap_or(StatusCode::OK);
    let status = if range.is_some() && status == StatusCode::OK {
        StatusCode::PARTIAL_CONTENT
    } else {
        status
    };
    send(TransferEvent::Status(status.as_u16()));

    // 6. end
    send(TransferEvent::End);
}

fn set(name: &str, value: impl Into<String>) -> TransferEvent {
    TransferEvent::Set {
        name: name.to_string(),
        value: value.into(),
    }
}

fn write_buffered<F: FnMut(TransferEvent)>(bytes: Bytes, send: &mut F) {
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + WRITE_CHUNK_SIZE).min(bytes.len());
        send(TransferEvent::Write(bytes.slice(offset..end)));
        offset = end;
    }
}

/// Next chunk of a body stream. A panic while polling counts as a failure.
async fn next_chunk(stream: &mut BodyStream) -> Option<Result<Bytes, String>> {
    match AssertUnwindSafe(stream.next()).catch_unwind().await {
        Ok(Some(Ok(chunk))) => Some(Ok(chunk)),
        Ok(Some(Err(e))) => Some(Err(e.to_string())),
        Ok(None) => None,
        Err(_) => Some(Err("body stream panicked".to_string())),
    }
}

async fn write_stream<F: FnMut(TransferEvent)>(mut stream: BodyStream, send: &mut F) {
    while let Some(chunk) = next_chunk(&mut stream).await {
        match chunk {
            Ok(chunk) if chunk.is_empty() => {}
            Ok(chunk) => send(TransferEvent::Write(chunk)),
            Err(e) => {
                tracing::warn!(error = %e, "Body stream failed, truncating response");
                break;
            }
        }
    }
}

async fn write_stream_range<F: FnMut(TransferEvent)>(
    mut stream: BodyStream,
    range: ByteRange,
    send: &mut F,
) {
    let mut offset: u64 = 0;
    while let Some(chunk) = next_chunk(&mut stream).await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Body stream failed, truncating response");
                break;
            }
        };
        let chunk_start = offset;
        let chunk_end = offset + chunk.len() as u64;
        offset = chunk_end;

        if chunk_end <= range.start {
            continue;
        }
        let from = range.start.saturating_sub(chunk_start);
        let to = (range.end + 1).min(chunk_end) - chunk_start;
        if from < to {
            send(TransferEvent::Write(chunk.slice(from as usize..to as usize)));
        }
        if chunk_end > range.end {
            break;
        }
    }
    drop(stream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{CookieOptions, MaxAge};
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn collect(message: ResponseMessage, range: Option<&str>) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        emit_response(message, range.map(str::to_string), |e| events.push(e)).await;
        events
    }

    fn body_of(events: &[TransferEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Write(b) => Some(b.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn header_of<'a>(events: &'a [TransferEvent], name: &str) -> Option<&'a str> {
        events.iter().find_map(|e| match e {
            TransferEvent::Set { name: n, value } if n.eq_ignore_ascii_case(name) => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    fn assert_ordering(events: &[TransferEvent]) {
        let first_write = events.iter().position(|e| matches!(e, TransferEvent::Write(_)));
        let last_meta = events.iter().rposition(|e| {
            matches!(
                e,
                TransferEvent::Set { .. } | TransferEvent::Cookie { .. } | TransferEvent::ClearCookie { .. }
            )
        });
        if let (Some(w), Some(m)) = (first_write, last_meta) {
            assert!(m < w, "metadata after body: {:?}", events);
        }
        let statuses = events.iter().filter(|e| matches!(e, TransferEvent::Status(_))).count();
        assert_eq!(statuses, 1);
        assert_eq!(events.last(), Some(&TransferEvent::End));
        assert!(matches!(events[events.len() - 2], TransferEvent::Status(_)));
    }

    #[tokio::test]
    async fn test_text_body_event_order() {
        let msg = ResponseMessage::text("hello")
            .with_header("X-Trace", "1")
            .with_cookie("sid", "abc", CookieOptions::default())
            .with_cleared_cookie("old", CookieOptions::default());
        let events = collect(msg, None).await;

        assert_ordering(&events);
        assert_eq!(
            events[0],
            TransferEvent::Set {
                name: "X-Trace".into(),
                value: "1".into()
            }
        );
        assert_eq!(header_of(&events, "content-type"), Some("text/plain"));
        assert!(matches!(events[2], TransferEvent::Cookie { .. }));
        assert!(matches!(events[3], TransferEvent::ClearCookie { .. }));
        assert_eq!(body_of(&events), b"hello");
        assert_eq!(events[events.len() - 2], TransferEvent::Status(200));
    }

    #[tokio::test]
    async fn test_json_body_and_declared_content_type() {
        let events = collect(ResponseMessage::json(serde_json::json!({ "a": 1 })), None).await;
        assert_eq!(header_of(&events, "content-type"), Some("application/json"));
        assert_eq!(body_of(&events), br#"{"a":1}"#);

        let declared = ResponseMessage::text("<b>x</b>").with_header("content-type", "text/html");
        let events = collect(declared, None).await;
        let types: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::Set { name, .. } if name.eq_ignore_ascii_case("content-type")))
            .collect();
        assert_eq!(types.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_still_ends() {
        let events = collect(ResponseMessage::no_content(), None).await;
        assert_eq!(events, vec![TransferEvent::Status(204), TransferEvent::End]);
    }

    #[tokio::test]
    async fn test_buffer_range_slicing() {
        let msg = ResponseMessage::bytes(&b"0123456789"[..]).with_header("Content-Length", "10");
        let events = collect(msg, Some("bytes=2-5")).await;

        assert_ordering(&events);
        assert_eq!(body_of(&events), b"2345");
        assert_eq!(header_of(&events, "content-range"), Some("bytes 2-5/10"));
        assert_eq!(header_of(&events, "content-length"), Some("4"));
        let lengths = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::Set { name, .. } if name.eq_ignore_ascii_case("content-length")))
            .count();
        assert_eq!(lengths, 1);
        assert_eq!(events[events.len() - 2], TransferEvent::Status(206));
    }

    #[tokio::test]
    async fn test_range_keeps_explicit_non_ok_status() {
        let msg = ResponseMessage::text("0123456789").with_status(StatusCode::CREATED);
        let events = collect(msg, Some("bytes=0-1")).await;
        assert_eq!(events[events.len() - 2], TransferEvent::Status(201));
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_is_ignored() {
        let events = collect(ResponseMessage::text("0123"), Some("bytes=10-20")).await;
        assert_eq!(body_of(&events), b"0123");
        assert!(header_of(&events, "content-range").is_none());
        assert_eq!(events[events.len() - 2], TransferEvent::Status(200));
    }

    #[tokio::test]
    async fn test_stream_forwarded_in_order() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"")),
            Ok(Bytes::from_static(b"cd")),
        ];
        let events = collect(ResponseMessage::stream(stream::iter(chunks)), None).await;
        let writes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::Write(_)))
            .collect();
        assert_eq!(writes.len(), 2);
        assert_eq!(body_of(&events), b"abcd");
        assert_eq!(header_of(&events, "content-type"), Some("application/octet-stream"));
        assert_eq!(header_of(&events, "accept-ranges"), Some("bytes"));
    }

    #[tokio::test]
    async fn test_stream_range_stops_reading() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let chunks = (0u8..10).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(vec![b'0' + i; 3]))
        });
        let msg = ResponseMessage::stream(stream::iter(chunks)).with_header("Content-Length", "30");
        let events = collect(msg, Some("bytes=4-7")).await;

        assert_ordering(&events);
        assert_eq!(body_of(&events), b"1122");
        assert_eq!(header_of(&events, "content-range"), Some("bytes 4-7/30"));
        assert!(header_of(&events, "content-length").is_none());
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
        assert_eq!(events[events.len() - 2], TransferEvent::Status(206));
    }

    #[tokio::test]
    async fn test_stream_without_length_ignores_range() {
        let chunks = vec![Ok(Bytes::from_static(b"abcdef"))];
        let events = collect(ResponseMessage::stream(stream::iter(chunks)), Some("bytes=0-1")).await;
        assert_eq!(body_of(&events), b"abcdef");
        assert_eq!(events[events.len() - 2], TransferEvent::Status(200));
    }

    #[tokio::test]
    async fn test_stream_error_truncates_but_terminates() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ok")),
            Err(std::io::Error::other("disk gone")),
            Ok(Bytes::from_static(b"never")),
        ];
        let events = collect(ResponseMessage::stream(stream::iter(chunks)), None).await;
        assert_ordering(&events);
        assert_eq!(body_of(&events), b"ok");
    }

    #[tokio::test]
    async fn test_short_stream_range_has_no_stale_length() {
        let chunks = vec![Ok(Bytes::from_static(b"abcdef"))];
        let msg = ResponseMessage::stream(stream::iter(chunks)).with_header("Content-Length", "30");
        let events = collect(msg, Some("bytes=4-9")).await;

        assert_ordering(&events);
        assert_eq!(body_of(&events), b"ef");
        assert!(header_of(&events, "content-length").is_none());
        assert_eq!(header_of(&events, "content-range"), Some("bytes 4-9/30"));
    }

    #[tokio::test]
    async fn test_stream_panic_truncates_but_terminates() {
        let chunks = stream::iter(0..3).map(|i| {
            if i == 1 {
                panic!("chunk source failed");
            }
            Ok::<_, std::io::Error>(Bytes::from_static(b"ab"))
        });
        let events = collect(ResponseMessage::stream(chunks), None).await;

        assert_ordering(&events);
        assert_eq!(body_of(&events), b"ab");
        assert_eq!(events[events.len() - 2], TransferEvent::Status(200));

        let chunks = stream::iter(0..3).map(|i| {
            if i == 1 {
                panic!("chunk source failed");
            }
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc"))
        });
        let msg = ResponseMessage::stream(chunks).with_header("Content-Length", "9");
        let events = collect(msg, Some("bytes=1-7")).await;
        assert_ordering(&events);
        assert_eq!(body_of(&events), b"bc");
        assert_eq!(events[events.len() - 2], TransferEvent::Status(206));
    }

    #[tokio::test]
    async fn test_large_buffer_is_chunked() {
        let data = vec![7u8; WRITE_CHUNK_SIZE * 2 + 10];
        let events = collect(ResponseMessage::bytes(data.clone()), None).await;
        let writes = events.iter().filter(|e| matches!(e, TransferEvent::Write(_))).count();
        assert_eq!(writes, 3);
        assert_eq!(body_of(&events), data);
    }

    #[tokio::test]
    async fn test_cookie_max_age_normalized() {
        let msg = ResponseMessage::new().with_cookie(
            "sid",
            "v",
            CookieOptions {
                max_age: Some(MaxAge::Duration("7d".into())),
                ..Default::default()
            },
        );
        let events = collect(msg, None).await;
        match &events[0] {
            TransferEvent::Cookie { options, .. } => {
                assert_eq!(options.max_age, Some(MaxAge::Seconds(604_800)))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
