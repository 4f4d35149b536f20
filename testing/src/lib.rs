//! # Cinema Testing
//!
//! Testing utilities and helpers for the cinema ticketing backend.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`) for deadline tests
//! - Fixture helpers (`seat_labels`, `init_test_tracing`)
//! - Property-based testing strategies for domain inputs
//!
//! ## Example
//!
//! ```
//! use cinema_testing::{test_clock_start, ManualClock};
//! use cinema_core::Clock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(test_clock_start());
//! let start = clock.now();
//! clock.advance(Duration::hours(25));
//! assert_eq!(clock.now() - start, Duration::hours(25));
//! ```

use chrono::{DateTime, TimeZone, Utc};
use cinema_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test tells it to.
    ///
    /// Clones share the same underlying instant, so a test can keep one
    /// handle and hand another to the components under test.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = match self.time.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *time += by;
        }

        /// Jump to an absolute instant
        pub fn set(&self, to: DateTime<Utc>) {
            let mut time = match self.time.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *time = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            match self.time.read() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }
}

/// The instant every test clock starts at: 2025-01-01 00:00:00 UTC.
#[must_use]
pub fn test_clock_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> mocks::FixedClock {
    mocks::FixedClock::new(test_clock_start())
}

/// Test helpers and utilities
pub mod helpers {
    /// Seat labels for a rectangular layout: rows `A..`, seats `1..=per_row`.
    ///
    /// ```
    /// assert_eq!(
    ///     cinema_testing::helpers::seat_labels(2, 2),
    ///     vec!["A1", "A2", "B1", "B2"],
    /// );
    /// ```
    #[must_use]
    pub fn seat_labels(rows: u8, per_row: u16) -> Vec<String> {
        (0..rows.min(26))
            .flat_map(|row| {
                let letter = char::from(b'A' + row);
                (1..=per_row).map(move |n| format!("{letter}{n}"))
            })
            .collect()
    }

    /// Installs a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; output goes through the test harness capture.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// A seat label within a 4 × 6 grid, dense enough to force contention.
    pub fn seat_label() -> impl Strategy<Value = String> {
        (0u8..4, 1u16..=6).prop_map(|(row, n)| format!("{}{n}", char::from(b'A' + row)))
    }

    /// A non-empty request of up to `max` seat labels (duplicates possible).
    pub fn seat_request(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(seat_label(), 1..=max)
    }

    /// A ticket price in cents between $1 and $500.
    pub fn price_cents() -> impl Strategy<Value = u64> {
        100u64..=50_000
    }

    /// A coupon discount percentage in `(0, 100]`.
    pub fn discount_percent() -> impl Strategy<Value = u8> {
        1u8..=100
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), test_clock_start());
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(test_clock_start());
        let handle = clock.clone();
        handle.advance(Duration::minutes(90));
        assert_eq!(clock.now(), test_clock_start() + Duration::minutes(90));

        clock.set(test_clock_start());
        assert_eq!(handle.now(), test_clock_start());
    }

    #[test]
    fn seat_labels_cover_the_grid() {
        let labels = helpers::seat_labels(3, 10);
        assert_eq!(labels.len(), 30);
        assert_eq!(labels.first().map(String::as_str), Some("A1"));
        assert_eq!(labels.last().map(String::as_str), Some("C10"));
    }
}
