//! Monotonic time spans.
//!
//! All harness timestamps come from [`Instant`] (CLOCK_MONOTONIC on Linux),
//! so spans recorded on different threads are directly comparable.

use std::fmt;
use std::time::{Duration, Instant};

/// A closed interval between two monotonic timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    start: Instant,
    end: Instant,
}

impl Span {
    /// Create a span. `end` earlier than `start` collapses to an empty span.
    #[must_use]
    pub fn new(start: Instant, end: Instant) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Time the closure and return its span alongside its result.
    pub fn measure<T>(f: impl FnOnce() -> T) -> (Self, T) {
        let start = Instant::now();
        let value = f();
        (Self::new(start, Instant::now()), value)
    }

    /// Start timestamp.
    #[must_use]
    pub fn start(&self) -> Instant {
        self.start
    }

    /// End timestamp.
    #[must_use]
    pub fn end(&self) -> Instant {
        self.end
    }

    /// Length of the span.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.end.duration_since(self.start)
    }

    /// Returns true if `inner` lies entirely within this span.
    #[must_use]
    pub fn contains(&self, inner: &Span) -> bool {
        self.start <= inner.start && inner.end <= self.end
    }
}

/// Displays a duration as seconds with millisecond precision (`1.234`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seconds(pub Duration);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0.as_secs_f64())
    }
}
