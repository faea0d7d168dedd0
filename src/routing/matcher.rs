//! Route pattern compilation and matching.
//!
//! # Responsibilities
//! - Classify route path segments (static, `[name]`, `[...name]`)
//! - Match request paths component by component and capture parameters
//! - Rank patterns by specificity
//!
//! # Design Decisions
//! - No regex: patterns are matched segment-wise in O(n)
//! - Static segments are case-sensitive and compared against decoded components
//! - A catch-all must be last and may capture zero components
//! - One optional trailing slash is accepted on request paths

use std::cmp::Ordering;

use percent_encoding::percent_decode_str;

use crate::error::Error;

/// One slash-delimited component of a route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Dynamic(String),
    CatchAll(String),
}

impl Segment {
    /// Classify a raw path segment.
    pub fn classify(raw: &str) -> Self {
        if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            match inner.strip_prefix("...") {
                Some(name) if is_param_name(name) => return Segment::CatchAll(name.to_string()),
                None if is_param_name(inner) => return Segment::Dynamic(inner.to_string()),
                _ => {}
            }
        }
        Segment::Static(raw.to_string())
    }

    /// Parameter name, for dynamic and catch-all segments.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Segment::Static(_) => None,
            Segment::Dynamic(name) | Segment::CatchAll(name) => Some(name),
        }
    }

    /// Specificity rank of this segment kind.
    pub fn rank(&self) -> SegmentRank {
        match self {
            Segment::Static(_) => SegmentRank::Static,
            Segment::Dynamic(_) => SegmentRank::Dynamic,
            Segment::CatchAll(_) => SegmentRank::CatchAll,
        }
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '$'))
}

/// Segment kind ordered from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentRank {
    Static,
    Dynamic,
    CatchAll,
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a cleaned route path (`/users/[id]`).
    ///
    /// `source` names the route in errors.
    pub fn compile(route: &str, source: &str) -> Result<Self, Error> {
        let segments: Vec<Segment> = route
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Segment::classify)
            .collect();

        if let Some(pos) = segments.iter().position(|s| matches!(s, Segment::CatchAll(_))) {
            if pos + 1 != segments.len() {
                return Err(Error::InvalidRoutePattern(source.to_string()));
            }
        }

        let mut names: Vec<&str> = segments.iter().filter_map(Segment::param_name).collect();
        let declared = names.len();
        names.sort_unstable();
        names.dedup();
        if names.len() != declared {
            return Err(Error::InvalidRoutePattern(source.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in positional order.
    pub fn param_names(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(Segment::param_name)
            .map(str::to_string)
            .collect()
    }

    /// Specificity key: one rank per segment.
    pub fn shape(&self) -> Vec<SegmentRank> {
        self.segments.iter().map(Segment::rank).collect()
    }

    /// Match a request path, returning decoded captures in positional order.
    pub fn matches(&self, path: &str) -> Option<Vec<String>> {
        let components = split_request_path(path);
        let mut captures = Vec::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Static(text) => {
                    let component = components.get(i)?;
                    if decode(component) != *text {
                        return None;
                    }
                }
                Segment::Dynamic(_) => {
                    let component = components.get(i)?;
                    if component.is_empty() {
                        return None;
                    }
                    captures.push(decode(component));
                }
                Segment::CatchAll(_) => {
                    let rest = components.get(i..)?;
                    let joined = rest.iter().map(|c| decode(c)).collect::<Vec<_>>().join("/");
                    captures.push(joined);
                    return Some(captures);
                }
            }
        }

        if components.len() == self.segments.len() {
            Some(captures)
        } else {
            None
        }
    }
}

/// Compare two shapes left to right; the first differing position decides.
///
/// When one shape is a prefix of the other the shorter one wins, so an
/// exact route outranks a catch-all that captures nothing.
pub fn compare_shapes(a: &[SegmentRank], b: &[SegmentRank]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn split_request_path(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}
