use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open `[start, end)` interval of row ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "range start {start} past end {end}");
        Self {
            start,
            end: end.max(start),
        }
    }

    /// An empty range positioned at `at`.
    #[must_use]
    pub const fn empty_at(at: usize) -> Self {
        Self { start: at, end: at }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub const fn contains(&self, row: usize) -> bool {
        self.start <= row && row < self.end
    }

    #[must_use]
    pub const fn contains_range(&self, other: &Range) -> bool {
        other.is_empty() || (self.start <= other.start && other.end <= self.end)
    }

    /// Smallest range covering both `self` and `other`. Empty ranges are ignored.
    #[must_use]
    pub fn union(&self, other: &Range) -> Range {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Moves `start` forward to `to`, never past `end` and never backwards.
    #[must_use]
    pub fn trim_start(&self, to: usize) -> Range {
        let start = to.clamp(self.start, self.end);
        Range {
            start,
            end: self.end,
        }
    }

    #[must_use]
    pub const fn extend_end(&self, by: usize) -> Range {
        Range {
            start: self.start,
            end: self.end + by,
        }
    }

    pub fn rows(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
