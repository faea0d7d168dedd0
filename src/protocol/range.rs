//! `Range` header parsing.
//!
//! Only single byte ranges are served. Overlapping or adjacent ranges are
//! combined first; a header that still names several ranges, names no
//! satisfiable range, or does not parse is ignored and the full body is sent.

/// Inclusive byte range inside a body of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Parse a `Range` header against a body of `total` bytes.
pub fn parse_range(header: &str, total: u64) -> Option<ByteRange> {
    let spec = header.trim().strip_prefix("bytes=")?;
    if total == 0 {
        return None;
    }

    let mut ranges = Vec::new();
    for part in spec.split(',') {
        let (start, end) = part.trim().split_once('-')?;
        let (start, end) = match (start.trim(), end.trim()) {
            ("", "") => return None,
            ("", suffix) => {
                let suffix: u64 = suffix.parse().ok()?;
                (total.saturating_sub(suffix), total - 1)
            }
            (start, "") => (start.parse().ok()?, total - 1),
            (start, end) => {
                let start: u64 = start.parse().ok()?;
                let end: u64 = end.parse().ok()?;
                (start, end.min(total - 1))
            }
        };
        if start > end || start >= total {
            // unsatisfiable piece
            continue;
        }
        ranges.push((start, end));
    }

    let combined = combine(ranges);
    match combined.as_slice() {
        [(start, end)] => Some(ByteRange {
            start: *start,
            end: *end,
            total,
        }),
        _ => None,
    }
}

fn combine(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    ranges.sort_unstable();
    let mut out: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match out.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => out.push((start, end)),
        }
    }
    out
}
