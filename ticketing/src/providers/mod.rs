//! Storage providers.
//!
//! Each component owns its records and reaches them only through its own
//! store trait. Components never read another component's store.
//!
//! ```text
//! SeatInventory ──► SeatStore       (showtimes, seat_statuses)
//! BookingManager ─► BookingStore    (bookings)
//! PaymentManager ─► PaymentStore    (payments)
//! LoyaltyEngine ──► LoyaltyStore    (user_payment_counts, loyalty_ledger,
//!                                    coupons, user_coupon_usages)
//! ```
//!
//! Two implementations exist for every trait: `stores::memory` (tests, local
//! runs) and `stores::postgres` (production). Both give each operation
//! all-or-nothing semantics: the memory stores hold one lock for the whole
//! operation, the Postgres stores run it in one transaction.

use async_trait::async_trait;
use cinema_core::Result;

pub mod bookings;
pub mod loyalty;
pub mod payments;
pub mod seats;

pub use bookings::BookingStore;
pub use loyalty::{
    LoyaltyStore, PaymentTally, REWARD_CODE_ATTEMPTS, RewardFn, reward_codes_exhausted,
};
pub use payments::PaymentStore;
pub use seats::SeatStore;

/// A dependency the readiness endpoint checks.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Name shown in the readiness report
    fn name(&self) -> &'static str;

    /// Succeeds when the dependency answers.
    ///
    /// # Errors
    ///
    /// Returns the failure that makes the service unready.
    async fn check(&self) -> Result<()>;
}
