//! Index and score ranges used by sorted-set and list operations.

/// An inclusive score interval. Use infinities for open ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Every score.
    pub fn all() -> Self {
        Self { min: f64::NEG_INFINITY, max: f64::INFINITY }
    }

    /// Scores greater than or equal to `min`.
    pub fn at_least(min: f64) -> Self {
        Self { min, max: f64::INFINITY }
    }

    /// Scores less than or equal to `max`.
    pub fn at_most(max: f64) -> Self {
        Self { min: f64::NEG_INFINITY, max }
    }

    pub fn contains(&self, score: f64) -> bool {
        self.min <= score && score <= self.max
    }
}

/// Resolves an inclusive `start..=stop` index range against a structure of `len`
/// elements and returns the `(offset, count)` to read.
///
/// Negative indices count from the end (`-1` is the last element). Out-of-range
/// bounds are clamped; an empty or inverted range yields `None`.
pub fn resolve_range(start: i64, stop: i64, len: u64) -> Option<(u64, u64)> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start >= len || stop < start {
        return None;
    }

    Some((start as u64, (stop - start + 1) as u64))
}

/// Returns `(offset, count)` when the range can be read without knowing the length
/// first: a non-negative start, and either a non-negative stop or `-1`
/// (`count` is `None`, meaning "to the end").
pub fn direct_range(start: i64, stop: i64) -> Option<(u64, Option<u64>)> {
    match (start, stop) {
        (start, _) if start < 0 => None,
        (start, -1) => Some((start as u64, None)),
        (_, stop) if stop < 0 => None,
        (start, stop) if stop < start => Some((start as u64, Some(0))),
        (start, stop) => Some((start as u64, Some((stop - start) as u64 + 1))),
    }
}
