//! Route and middleware modules supplied by the module provider.
//!
//! A `RouteManifest` is the in-memory equivalent of a compiled routes
//! directory: one `RouteModule` per route file, one middleware per directory.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;
use thiserror::Error;

use crate::middleware::RequestContext;
use crate::protocol::ResponseMessage;
use crate::routing::path::{module_dir, normalize_source};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure raised by a handler or middleware.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Abort with an explicit response instead of a 500.
    #[error("aborted with status {}", .0.status_or_default())]
    Respond(Box<ResponseMessage>),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Message(message.into())
    }

    pub fn respond(message: ResponseMessage) -> Self {
        HandlerError::Respond(Box::new(message))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::Message(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::Message(message.to_string())
    }
}

/// `Ok(None)` means the handler produced nothing (`204 No Content`).
pub type HandlerResult = Result<Option<ResponseMessage>, HandlerError>;

/// What a middleware decided for the request.
#[derive(Debug)]
pub enum MiddlewareOutcome {
    /// Continue the chain, deep-merging this object into `custom`.
    Next(Value),
    /// Short-circuit with this response.
    Respond(ResponseMessage),
}

impl MiddlewareOutcome {
    pub fn next() -> Self {
        MiddlewareOutcome::Next(Value::Null)
    }

    pub fn next_with(partial: Value) -> Self {
        MiddlewareOutcome::Next(partial)
    }
}

pub type MiddlewareResult = Result<MiddlewareOutcome, HandlerError>;

/// A per-method route handler.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx))
    }
}

/// A per-directory middleware.
pub trait Middleware: Send + Sync {
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, MiddlewareResult>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, MiddlewareResult> {
        Box::pin(self(ctx))
    }
}

/// Handlers exported by one route file.
#[derive(Clone, Default)]
pub struct RouteModule {
    handlers: HashMap<Method, Arc<dyn Handler>>,
}

macro_rules! method_builder {
    ($($name:ident => $method:expr),* $(,)?) => {
        $(
            pub fn $name<F, Fut>(self, handler: F) -> Self
            where
                F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                self.on($method, handler)
            }
        )*
    };
}

impl RouteModule {
    pub fn new() -> Self {
        Self::default()
    }

    method_builder! {
        get => Method::GET,
        post => Method::POST,
        put => Method::PUT,
        patch => Method::PATCH,
        delete => Method::DELETE,
    }

    fn on(mut self, method: Method, handler: impl Handler + 'static) -> Self {
        self.handlers.insert(method, Arc::new(handler));
        self
    }

    pub fn handler(&self, method: &Method) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(method)
    }

    pub fn exports(&self, method: &Method) -> bool {
        self.handlers.contains_key(method)
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.handlers.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("RouteModule").field("methods", &methods).finish()
    }
}

/// Every route and middleware module of one build.
#[derive(Clone, Default)]
pub struct RouteManifest {
    routes: BTreeMap<String, RouteModule>,
    middlewares: BTreeMap<String, Arc<dyn Middleware>>,
}

impl RouteManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the route module found at `source` (e.g. `users/[id]/route.ts`).
    pub fn route(mut self, source: &str, module: RouteModule) -> Self {
        self.routes.insert(normalize_source(source), module);
        self
    }

    /// Register the middleware of directory `source` (`admin` or `admin/middleware.ts`).
    pub fn middleware<F, Fut>(mut self, source: &str, middleware: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.middlewares
            .insert(module_dir(source, "middleware"), Arc::new(middleware));
        self
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, &RouteModule)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn middlewares(&self) -> impl Iterator<Item = (&str, &Arc<dyn Middleware>)> {
        self.middlewares.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for RouteManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteManifest")
            .field("routes", &self.routes)
            .field("middlewares", &self.middlewares.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let module = RouteModule::new()
            .get(|_ctx| async { Ok(None) })
            .post(|_ctx| async { Ok(Some(ResponseMessage::text("created"))) });
        assert!(module.exports(&Method::GET));
        assert!(module.exports(&Method::POST));
        assert!(!module.exports(&Method::DELETE));
        assert_eq!(format!("{:?}", module), r#"RouteModule { methods: ["GET", "POST"] }"#);
    }

    #[test]
    fn test_manifest_normalizes_sources() {
        let manifest = RouteManifest::new()
            .route("\\users\\[id]\\route.ts", RouteModule::new())
            .route("users/[id]/route.ts", RouteModule::new())
            .middleware("admin/middleware.ts", |_ctx| async { Ok(MiddlewareOutcome::next()) });

        let routes: Vec<_> = manifest.routes().map(|(k, _)| k).collect();
        assert_eq!(routes, vec!["users/[id]/route.ts"]);
        let middlewares: Vec<_> = manifest.middlewares().map(|(k, _)| k).collect();
        assert_eq!(middlewares, vec!["admin"]);
    }
}
