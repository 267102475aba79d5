//! Time and bound primitives.
//!
//! `Timestamp`/`Duration` are plain integer milliseconds: the clearing core
//! never reads a wall clock itself (§5 — time only advances when the oracle
//! intake or a command supplies it), so there is no need for a `chrono`
//! dependency here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type Timestamp = i64;
pub type Duration = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    pub fn contains(&self, instant: Timestamp) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Admission bounds for an orderbook operation (placement, update, cancel).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrdersBounds {
    pub price_plus_bound: Decimal,
    pub price_minus_bound: Decimal,
    pub time_buffer: Duration,
    /// `0` means unbounded.
    pub time_limit: Duration,
}

impl OrdersBounds {
    pub fn unbounded() -> Self {
        Self {
            price_plus_bound: Decimal::MAX,
            price_minus_bound: Decimal::MAX,
            time_buffer: 0,
            time_limit: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_window_excludes_end() {
        let window = TimeWindow::new(100, 200);
        assert!(window.contains(100));
        assert!(window.contains(199));
        assert!(!window.contains(200));
    }

    #[test]
    fn duration_is_end_minus_start() {
        let window = TimeWindow::new(1_000, 4_000);
        assert_eq!(window.duration(), 3_000);
        assert!(window.is_valid());
    }
}
