//! Loyalty and coupon store trait.
//!
//! The loyalty counters, the ledger of counted payments, coupons and coupon
//! usages share one store: issuing a loyalty coupon must commit together with
//! the counter and milestone update.

use crate::types::{Coupon, CouponPatch, UserPaymentCount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{CouponId, Error, PaymentId, Result, UserId};

/// Decides, from the counter after an increment, whether a reward is due.
///
/// Returns the milestone being rewarded and the coupon to insert.
pub type RewardFn = dyn Fn(&UserPaymentCount) -> Option<(u32, Coupon)> + Send + Sync;

/// How many times a store calls the [`RewardFn`] again when the coupon code
/// it drew is already taken.
pub const REWARD_CODE_ATTEMPTS: usize = 5;

/// Error for a reward whose every drawn code was taken.
#[must_use]
pub fn reward_codes_exhausted(user_id: UserId) -> Error {
    Error::internal(format!(
        "no free loyalty coupon code for user {user_id} after {REWARD_CODE_ATTEMPTS} attempts"
    ))
}

/// Outcome of counting a paid payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentTally {
    /// `false` when the payment had been counted before
    pub counted: bool,
    /// Counter after the operation
    pub progress: UserPaymentCount,
    /// Coupon issued by this payment
    pub reward: Option<Coupon>,
}

/// Loyalty and coupon store.
#[async_trait]
pub trait LoyaltyStore: Send + Sync {
    /// Counts `payment_id` for `user_id` once.
    ///
    /// In the same atomic step: records the payment in the ledger, increments
    /// the counter, evaluates `reward` on the new counter and, when it yields
    /// a coupon, inserts it and advances `last_coupon_milestone`. A payment
    /// already in the ledger changes nothing.
    ///
    /// A reward whose code is taken is drawn again, up to
    /// [`REWARD_CODE_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails; nothing is committed then.
    async fn record_payment(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
        at: DateTime<Utc>,
        reward: &RewardFn,
    ) -> Result<PaymentTally>;

    /// Un-counts a refunded payment (floor zero). The milestone is kept.
    ///
    /// Returns `None` when the payment was never counted or was already
    /// refunded.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn record_refund(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
        at: DateTime<Utc>,
    ) -> Result<Option<UserPaymentCount>>;

    /// The user's counter (zero when absent).
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn progress(&self, user_id: UserId) -> Result<UserPaymentCount>;

    /// Inserts a coupon.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` when the code is taken.
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;

    /// Looks a coupon up by code.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Looks a coupon up by id.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn coupon(&self, id: CouponId) -> Result<Option<Coupon>>;

    /// Every coupon, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn coupons(&self) -> Result<Vec<Coupon>>;

    /// Loyalty coupons issued to a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn coupons_issued_to(&self, user_id: UserId) -> Result<Vec<Coupon>>;

    /// Whether the user already redeemed the coupon.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn has_used(&self, user_id: UserId, coupon_id: CouponId) -> Result<bool>;

    /// Applies admin changes. `None` when the coupon does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn update_coupon(&self, id: CouponId, patch: &CouponPatch) -> Result<Option<Coupon>>;

    /// Redeems a coupon for a user: checks it with
    /// [`Coupon::check_redeemable`], decrements stock (deactivating at zero)
    /// and records the usage, atomically. Returns the coupon as it was before
    /// the decrement.
    ///
    /// # Errors
    ///
    /// The `COUPON_*` error for the first failed check.
    async fn redeem(&self, user_id: UserId, code: &str, at: DateTime<Utc>) -> Result<Coupon>;

    /// Undoes a redemption: removes the usage, gives the stock back and
    /// reactivates the coupon if it was deactivated by running out and is
    /// still valid at `at`. Returns `false` when there was no usage.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn restore(&self, user_id: UserId, coupon_id: CouponId, at: DateTime<Utc>)
    -> Result<bool>;

    /// Deactivates active coupons whose validity ended before `now`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
