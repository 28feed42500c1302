//! HTTP byte-range parsing

/// A single `Range: bytes=...` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=START-END` or `bytes=START-`
    From { start: u64, end: Option<u64> },
    /// `bytes=-N`, the last N bytes
    Suffix(u64),
}

/// Parse a `Range` header value
///
/// Supports formats:
/// - bytes=0-499
/// - bytes=500-
/// - bytes=-500 (last 500 bytes)
///
/// Multi-range requests and malformed values return `None`, and the caller
/// serves the whole file.
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, false) => Some(RangeSpec::Suffix(end.parse().ok()?)),
        (false, true) => Some(RangeSpec::From {
            start: start.parse().ok()?,
            end: None,
        }),
        (false, false) => {
            let start = start.parse().ok()?;
            let end = end.parse().ok()?;
            if start > end {
                return None;
            }
            Some(RangeSpec::From {
                start,
                end: Some(end),
            })
        }
        (true, true) => None,
    }
}

impl RangeSpec {
    /// Inclusive `(start, end)` within a file of `size` bytes
    ///
    /// An open or oversized end is clamped to `size - 1`. Returns `None` when
    /// the range cannot be satisfied.
    pub fn resolve(self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        let last = size - 1;

        match self {
            RangeSpec::From { start, end } => {
                if start > last {
                    return None;
                }
                Some((start, end.unwrap_or(last).min(last)))
            }
            RangeSpec::Suffix(0) => None,
            RangeSpec::Suffix(len) => Some((size.saturating_sub(len), last)),
        }
    }
}
