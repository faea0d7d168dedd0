//! Middleware chain execution.
//!
//! Middlewares run root first. Each one either continues (its partial data is
//! deep-merged into `custom`) or responds, which ends the chain. The route
//! handler only runs when every middleware continued.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;

use crate::error::Error;
use crate::middleware::context::{RequestContext, RequestEnvelope};
use crate::observability::metrics;
use crate::protocol::ResponseMessage;
use crate::routing::{HandlerError, MiddlewareOutcome, RouteTable};

/// Runs resolution, middlewares and the handler for one request.
#[derive(Debug, Clone, Copy)]
pub struct ChainExecutor {
    middleware_timeout: Duration,
}

impl ChainExecutor {
    pub fn new(middleware_timeout: Duration) -> Self {
        Self { middleware_timeout }
    }

    pub fn middleware_timeout(&self) -> Duration {
        self.middleware_timeout
    }

    /// Produce the one response for `envelope`.
    pub async fn run(
        &self,
        table: &RouteTable,
        envelope: RequestEnvelope,
    ) -> Result<ResponseMessage, Error> {
        let resolved = table.resolve(&envelope.method, &envelope.path)?;
        let mut ctx = RequestContext::new(envelope, resolved.params.clone());

        for middleware in table.middlewares_for(&resolved.descriptor) {
            let location = format!("/{}", middleware.dir_path);
            let call = AssertUnwindSafe(middleware.handler.call(ctx.clone())).catch_unwind();

            let outcome = match tokio::time::timeout(self.middleware_timeout, call).await {
                Err(_) => {
                    metrics::record_middleware_timeout();
                    tracing::warn!(
                        middleware = %location,
                        timeout_ms = self.middleware_timeout.as_millis() as u64,
                        "Middleware timed out"
                    );
                    return Err(Error::MiddlewareTimeout(location));
                }
                Ok(Err(panic)) => return Err(Error::Internal(panic_message(panic))),
                Ok(Ok(result)) => result,
            };

            match outcome {
                Ok(MiddlewareOutcome::Next(partial)) => ctx.merge_custom(partial),
                Ok(MiddlewareOutcome::Respond(message)) => {
                    tracing::debug!(middleware = %location, "Middleware short-circuited");
                    return Ok(message);
                }
                Err(e) => return handler_failure(e),
            }
        }

        let call = AssertUnwindSafe(resolved.handler.call(ctx)).catch_unwind();
        match call.await {
            Ok(Ok(Some(message))) => Ok(message),
            Ok(Ok(None)) => Ok(ResponseMessage::no_content()),
            Ok(Err(e)) => handler_failure(e),
            Err(panic) => Err(Error::Internal(panic_message(panic))),
        }
    }
}

/// A thrown response is the response; anything else is a 500.
fn handler_failure(err: HandlerError) -> Result<ResponseMessage, Error> {
    match err {
        HandlerError::Respond(message) => Ok(*message),
        other => {
            tracing::warn!(error = %other, "Handler failed");
            Err(Error::Internal(other.to_string()))
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
