//! Route table: lookup, ranking and method resolution.
//!
//! # Responsibilities
//! - Compile every route module of a manifest into a `RouteDescriptor`
//! - Return the descriptors matching a path, most specific first
//! - Resolve a method to exactly one handler or an explicit error
//! - Collect the ancestor middlewares of a route, root first
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - One invalid route fails the whole build
//! - O(n) scan over descriptors (acceptable for typical route counts)
//! - Same-shape ties: lowercase route, then longer source path, then source path

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::error::Error;
use crate::routing::matcher::{compare_shapes, RoutePattern, SegmentRank};
use crate::routing::module::{Handler, Middleware, RouteManifest, RouteModule};
use crate::routing::path::{ancestor_dirs, clean_route, module_dir};

/// One compiled route module.
#[derive(Debug)]
pub struct RouteDescriptor {
    /// Normalized source path, as registered (`(group)/[slug]/route.ts`).
    pub raw_path: String,
    /// Cleaned route (`/[slug]`).
    pub route: String,
    /// Source directory, groups kept (`(group)/[slug]`).
    pub dir: String,
    pub pattern: RoutePattern,
    pub param_names: Vec<String>,
    pub module: RouteModule,
    shape: Vec<SegmentRank>,
}

impl RouteDescriptor {
    pub fn compile(raw_path: &str, module: RouteModule) -> Result<Self, Error> {
        let dir = module_dir(raw_path, "route");
        let route = clean_route(&dir);
        let pattern = RoutePattern::compile(&route, raw_path)?;

        Ok(Self {
            raw_path: raw_path.to_string(),
            param_names: pattern.param_names(),
            shape: pattern.shape(),
            route,
            dir,
            pattern,
            module,
        })
    }

    /// Named captures for `path`, if this route accepts it.
    pub fn captures(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let values = self.pattern.matches(path)?;
        Some(self.param_names.iter().cloned().zip(values).collect())
    }

    fn specificity(&self, other: &Self) -> Ordering {
        compare_shapes(&self.shape, &other.shape)
            .then_with(|| self.route.to_lowercase().cmp(&other.route.to_lowercase()))
            .then_with(|| other.raw_path.len().cmp(&self.raw_path.len()))
            .then_with(|| self.raw_path.cmp(&other.raw_path))
    }
}

/// Middleware owned by one source directory.
#[derive(Clone)]
pub struct MiddlewareDescriptor {
    pub dir_path: String,
    pub handler: Arc<dyn Middleware>,
}

impl fmt::Debug for MiddlewareDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareDescriptor")
            .field("dir_path", &self.dir_path)
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful resolution.
#[derive(Clone)]
pub struct ResolvedRoute {
    pub descriptor: Arc<RouteDescriptor>,
    pub handler: Arc<dyn Handler>,
    pub params: BTreeMap<String, String>,
}

impl fmt::Debug for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("route", &self.descriptor.raw_path)
            .field("params", &self.params)
            .finish()
    }
}

/// Immutable table of routes and middlewares for one build.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<RouteDescriptor>>,
    middlewares: HashMap<String, MiddlewareDescriptor>,
}

impl RouteTable {
    /// Compile a manifest. Fails on the first invalid route pattern.
    pub fn build(manifest: &RouteManifest) -> Result<Self, Error> {
        let mut routes = Vec::new();
        let mut seen: HashMap<String, String> = HashMap::new();

        for (raw_path, module) in manifest.routes() {
            let descriptor = RouteDescriptor::compile(raw_path, module.clone()).map_err(|e| {
                tracing::error!(route = %raw_path, error = %e, "Route registration failed");
                e
            })?;

            if let Some(previous) = seen.insert(descriptor.route.clone(), raw_path.to_string()) {
                tracing::warn!(
                    route = %descriptor.route,
                    first = %previous,
                    second = %raw_path,
                    "Two source paths compile to the same route"
                );
            }
            routes.push(Arc::new(descriptor));
        }

        routes.sort_by(|a, b| a.specificity(b));

        let middlewares = manifest
            .middlewares()
            .map(|(dir, handler)| {
                let descriptor = MiddlewareDescriptor {
                    dir_path: dir.to_string(),
                    handler: handler.clone(),
                };
                (dir.to_string(), descriptor)
            })
            .collect();

        tracing::debug!(routes = routes.len(), "Route table built");
        Ok(Self { routes, middlewares })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Arc<RouteDescriptor>] {
        &self.routes
    }

    /// Every descriptor accepting `path`, most specific first.
    pub fn matches(&self, path: &str) -> Vec<(Arc<RouteDescriptor>, BTreeMap<String, String>)> {
        self.routes
            .iter()
            .filter_map(|d| d.captures(path).map(|params| (d.clone(), params)))
            .collect()
    }

    /// Pick the single handler for `method` on `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<ResolvedRoute, Error> {
        let candidates = self.matches(path);
        if candidates.is_empty() {
            return Err(Error::NotFoundRoute(path.to_string()));
        }

        let exporting: Vec<_> = candidates
            .into_iter()
            .filter(|(d, _)| d.module.exports(method))
            .collect();

        let Some((top, _)) = exporting.first() else {
            return Err(Error::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            });
        };

        let tied: Vec<String> = exporting
            .iter()
            .filter(|(d, _)| d.shape == top.shape)
            .map(|(d, _)| d.raw_path.clone())
            .collect();
        if tied.len() > 1 {
            return Err(Error::MultipleRoutesMatched(tied));
        }

        let (descriptor, params) = exporting.into_iter().next().ok_or_else(|| {
            Error::Internal(format!("route candidates vanished for {}", path))
        })?;
        let handler = descriptor
            .module
            .handler(method)
            .cloned()
            .ok_or_else(|| Error::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            })?;

        Ok(ResolvedRoute {
            descriptor,
            handler,
            params,
        })
    }

    /// Middlewares from the routes root down to the route's own directory.
    pub fn middlewares_for(&self, route: &RouteDescriptor) -> Vec<MiddlewareDescriptor> {
        ancestor_dirs(&route.dir)
            .iter()
            .filter_map(|dir| self.middlewares.get(dir).cloned())
            .collect()
    }
}
