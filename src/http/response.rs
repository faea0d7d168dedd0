//! Applying transfer events to an HTTP response.
//!
//! # Responsibilities
//! - Turn `Set`, `Cookie` and `ClearCookie` events into headers
//! - Gather `Write` chunks until `Status` is known
//! - Map pool failures to JSON error responses
//!
//! # Design Decisions
//! - Status arrives after the body, so the body is held until `Status`
//! - Invalid header names or values are dropped with a warning
//! - A stream that closes without `End` is finalized as if it had one

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use cookie::{time::Duration as CookieDuration, Cookie, SameSite as CookieSameSite};

use crate::config::MessagesConfig;
use crate::dispatch::ResponseStream;
use crate::error::Error;
use crate::protocol::cookie::parse_duration_secs;
use crate::protocol::{emit_response, CookieOptions, MaxAge, SameSite, TransferEvent};

/// Builds one axum response from a sequence of transfer events.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    ended: bool,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn apply(&mut self, event: TransferEvent) {
        match event {
            TransferEvent::Set { name, value } => {
                match (
                    HeaderName::try_from(name.as_str()),
                    HeaderValue::try_from(value.as_str()),
                ) {
                    (Ok(name), Ok(value)) => {
                        self.headers.insert(name, value);
                    }
                    _ => tracing::warn!(header = %name, "Dropping invalid response header"),
                }
            }
            TransferEvent::Cookie {
                name,
                value,
                options,
            } => {
                let cookie = build_cookie(name, value, &options);
                self.append_cookie(cookie);
            }
            TransferEvent::ClearCookie { name, options } => {
                let mut cookie = build_cookie(name, String::new(), &options);
                cookie.make_removal();
                self.append_cookie(cookie);
            }
            TransferEvent::Write(chunk) => self.body.extend_from_slice(&chunk),
            TransferEvent::Status(code) => {
                self.status = Some(StatusCode::from_u16(code).unwrap_or_else(|_| {
                    tracing::warn!(code, "Invalid status code, using 500");
                    StatusCode::INTERNAL_SERVER_ERROR
                }));
            }
            TransferEvent::End => self.ended = true,
        }
    }

    fn append_cookie(&mut self, cookie: Cookie<'static>) {
        match HeaderValue::try_from(cookie.encoded().to_string()) {
            Ok(value) => {
                self.headers.append(header::SET_COOKIE, value);
            }
            Err(_) => tracing::warn!(cookie = %cookie.name(), "Dropping invalid cookie"),
        }
    }

    pub fn into_response(self) -> Response {
        let body: Bytes = self.body.freeze();
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

fn build_cookie(name: String, value: String, options: &CookieOptions) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    match &options.max_age {
        Some(MaxAge::Seconds(secs)) => cookie.set_max_age(CookieDuration::seconds(*secs)),
        Some(MaxAge::Duration(raw)) => {
            if let Some(secs) = parse_duration_secs(raw) {
                cookie.set_max_age(CookieDuration::seconds(secs));
            }
        }
        None => {}
    }
    if let Some(path) = &options.path {
        cookie.set_path(path.clone());
    }
    if let Some(domain) = &options.domain {
        cookie.set_domain(domain.clone());
    }
    if options.http_only {
        cookie.set_http_only(true);
    }
    if options.secure {
        cookie.set_secure(true);
    }
    if let Some(same_site) = options.same_site {
        cookie.set_same_site(match same_site {
            SameSite::Strict => CookieSameSite::Strict,
            SameSite::Lax => CookieSameSite::Lax,
            SameSite::None => CookieSameSite::None,
        });
    }
    cookie
}

/// JSON error response for a failure that happened outside a handler.
pub async fn error_response(err: &Error, messages: &MessagesConfig) -> Response {
    let mut assembler = ResponseAssembler::new();
    emit_response(err.to_response(messages), None, |event| assembler.apply(event)).await;
    assembler.into_response()
}

/// Drain a dispatched request into a response.
///
/// The whole body is gathered before anything is sent, since `Status`
/// only arrives after the last `Write`. A handler stream that never ends
/// never reaches the client; such a request is cut off by the edge's
/// request timeout (`timeouts.request_secs`).
pub async fn collect_response(mut stream: ResponseStream, messages: &MessagesConfig) -> Response {
    let mut assembler = ResponseAssembler::new();
    while let Some(item) = stream.recv().await {
        match item {
            Ok(event) => {
                assembler.apply(event);
                if assembler.is_ended() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(request_id = %stream.request_id(), error = %e, "Request failed in pool");
                return error_response(&e, messages).await;
            }
        }
    }
    if !assembler.is_ended() {
        tracing::warn!(request_id = %stream.request_id(), "Event stream closed before end");
    }
    assembler.into_response()
}
