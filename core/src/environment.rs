//! Environment traits injected into every component.
//!
//! Components never read the wall clock directly. They hold an
//! `Arc<dyn Clock>` so tests can pin or advance time and exercise the
//! 2-hour cancellation window and the 24-hour expiry deadlines without
//! sleeping.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// # Example
///
/// ```
/// use cinema_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = clock.now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
