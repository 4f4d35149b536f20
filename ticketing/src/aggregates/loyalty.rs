//! Loyalty engine: payment counting, milestone rewards and coupons.
//!
//! # Milestones
//!
//! A user earns a coupon at the `first_milestone`-th counted payment and then
//! every `milestone_step` payments (3, 7, 11, … by default). The discount
//! grows by `increment_percent` per milestone, starting at `base_percent` and
//! capped at `max_percent`:
//!
//! | payments | discount | tier     |
//! |----------|----------|----------|
//! | 3        | 10%      | Silver   |
//! | 7        | 14%      | Gold     |
//! | 11       | 18%      | Gold     |
//! | 15       | 22%      | Platinum |
//! | 23+      | 30%      | Platinum |
//!
//! Counting is keyed by payment id, so replaying a `paid` transition is a
//! no-op, and a milestone is rewarded at most once even after refunds.

use crate::config::LoyaltyConfig;
use crate::metrics;
use crate::providers::{LoyaltyStore, PaymentTally};
use crate::types::{
    Coupon, CouponDeactivation, CouponPatch, NewCoupon, UserPaymentCount, end_of_year,
    validate_discount_percent,
};
use chrono::{DateTime, Utc};
use cinema_core::{Clock, CouponId, Error, ErrorCategory, Money, PaymentId, Result, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Reward tier, derived from the discount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoyaltyTier {
    /// Up to 10%
    Silver,
    /// Above 10%, below 20%
    Gold,
    /// 20% and above
    Platinum,
}

impl LoyaltyTier {
    /// Tier for a discount percentage
    #[must_use]
    pub const fn for_discount(percent: u8) -> Self {
        if percent <= 10 {
            Self::Silver
        } else if percent < 20 {
            Self::Gold
        } else {
            Self::Platinum
        }
    }

    /// Upper-case form used in coupon codes
    #[must_use]
    pub const fn code_label(&self) -> &'static str {
        match self {
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
        }
    }
}

impl fmt::Display for LoyaltyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
        })
    }
}

/// Milestone schedule and reward construction.
#[derive(Clone, Copy, Debug)]
pub struct LoyaltyPolicy {
    config: LoyaltyConfig,
}

impl LoyaltyPolicy {
    /// Policy for `config`
    #[must_use]
    pub const fn new(config: LoyaltyConfig) -> Self {
        Self { config }
    }

    /// Whether `count` payments hit a milestone.
    #[must_use]
    pub const fn is_milestone(&self, count: u32) -> bool {
        count >= self.config.first_milestone
            && (count - self.config.first_milestone) % self.config.milestone_step == 0
    }

    /// The first milestone strictly above `count`.
    #[must_use]
    pub const fn next_milestone(&self, count: u32) -> u32 {
        let first = self.config.first_milestone;
        let step = self.config.milestone_step;
        if count < first {
            first
        } else {
            first + ((count - first) / step + 1) * step
        }
    }

    /// Discount granted at milestone `count`.
    #[must_use]
    pub fn discount_for(&self, count: u32) -> u8 {
        let reached = count.saturating_sub(self.config.first_milestone) / self.config.milestone_step;
        let percent = u32::from(self.config.base_percent)
            .saturating_add(u32::from(self.config.increment_percent).saturating_mul(reached));
        u8::try_from(percent.min(u32::from(self.config.max_percent))).unwrap_or(u8::MAX)
    }

    /// The coupon earned by a freshly incremented counter, with the milestone
    /// it rewards.
    ///
    /// `None` unless the count sits on a milestone above the last rewarded
    /// one.
    #[must_use]
    pub fn reward(&self, progress: &UserPaymentCount, now: DateTime<Utc>) -> Option<(u32, Coupon)> {
        let count = progress.payment_count;
        if !self.is_milestone(count) || count <= progress.last_coupon_milestone {
            return None;
        }

        let percent = self.discount_for(count);
        let tier = LoyaltyTier::for_discount(percent);
        let coupon = Coupon {
            id: CouponId::new(),
            code: format!(
                "LOYALTY-{}-USER{}-{:08X}",
                tier.code_label(),
                progress.user_id,
                rand::random::<u32>()
            ),
            name: format!("{tier} Loyalty Reward — {percent}% OFF"),
            discount_percent: percent,
            valid_until: end_of_year(now),
            is_active: true,
            deactivated_by: None,
            stock: 1,
            issued_to: Some(progress.user_id),
            created_at: now,
        };
        Some((count, coupon))
    }
}

/// Price breakdown for a coupon applied to an amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CouponQuote {
    /// The coupon as checked
    pub coupon: Coupon,
    /// `floor(amount × percent / 100)`
    pub discount: Money,
    /// Amount after the discount
    pub final_amount: Money,
}

impl CouponQuote {
    fn new(coupon: Coupon, amount: Money) -> Self {
        Self {
            discount: amount.discount(coupon.discount_percent),
            final_amount: amount.after_discount(coupon.discount_percent),
            coupon,
        }
    }
}

/// A user's standing in the loyalty program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoyaltyProgress {
    /// Counter and last rewarded milestone
    pub count: UserPaymentCount,
    /// Payments needed for the next reward
    pub next_milestone: u32,
    /// Coupons issued to the user, newest first
    pub coupons: Vec<Coupon>,
}

/// Environment dependencies for the loyalty engine
#[derive(Clone)]
pub struct LoyaltyEnvironment {
    /// Clock for validity checks and coupon timestamps
    pub clock: Arc<dyn Clock>,
}

impl LoyaltyEnvironment {
    /// Creates a new `LoyaltyEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Loyalty engine and coupon registry.
#[derive(Clone)]
pub struct LoyaltyEngine {
    store: Arc<dyn LoyaltyStore>,
    policy: LoyaltyPolicy,
    env: LoyaltyEnvironment,
}

impl LoyaltyEngine {
    /// Creates the engine over `store`
    #[must_use]
    pub fn new(store: Arc<dyn LoyaltyStore>, policy: LoyaltyPolicy, env: LoyaltyEnvironment) -> Self {
        Self { store, policy, env }
    }

    /// The milestone schedule
    #[must_use]
    pub const fn policy(&self) -> &LoyaltyPolicy {
        &self.policy
    }

    // ------------------------------------------------------------------------
    // Counting
    // ------------------------------------------------------------------------

    /// Counts a paid payment, issuing a coupon when it reaches a new
    /// milestone. Counting the same payment twice changes nothing.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn record_payment(&self, user_id: UserId, payment_id: PaymentId) -> Result<PaymentTally> {
        let now = self.env.clock.now();
        let policy = self.policy;
        let reward = move |progress: &UserPaymentCount| policy.reward(progress, now);
        let tally = self
            .store
            .record_payment(user_id, payment_id, now, &reward)
            .await?;

        if !tally.counted {
            tracing::debug!(user_id = %user_id, payment_id = %payment_id, "Payment already counted");
            return Ok(tally);
        }

        tracing::debug!(
            user_id = %user_id,
            payment_count = tally.progress.payment_count,
            "Payment counted"
        );
        if let Some(coupon) = &tally.reward {
            metrics::record_coupon("issued");
            tracing::info!(
                user_id = %user_id,
                milestone = tally.progress.last_coupon_milestone,
                code = %coupon.code,
                discount_percent = coupon.discount_percent,
                "Loyalty coupon issued"
            );
        }
        Ok(tally)
    }

    /// Un-counts a refunded payment. `None` when it had not been counted.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn record_refund(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
    ) -> Result<Option<UserPaymentCount>> {
        let progress = self
            .store
            .record_refund(user_id, payment_id, self.env.clock.now())
            .await?;
        if let Some(progress) = &progress {
            tracing::info!(
                user_id = %user_id,
                payment_id = %payment_id,
                payment_count = progress.payment_count,
                "Refunded payment un-counted"
            );
        }
        Ok(progress)
    }

    /// Counter, next milestone and issued coupons for a user.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn progress(&self, user_id: UserId) -> Result<LoyaltyProgress> {
        let count = self.store.progress(user_id).await?;
        let coupons = self.store.coupons_issued_to(user_id).await?;
        Ok(LoyaltyProgress {
            next_milestone: self.policy.next_milestone(count.payment_count),
            count,
            coupons,
        })
    }

    // ------------------------------------------------------------------------
    // Redemption
    // ------------------------------------------------------------------------

    async fn lookup(&self, code: &str) -> Result<Coupon> {
        self.store
            .coupon_by_code(code.trim())
            .await?
            .ok_or_else(|| Error::CouponUnknown {
                code: code.trim().to_string(),
            })
    }

    /// Checks that `user_id` could redeem `code` against `amount` without
    /// consuming anything.
    ///
    /// # Errors
    ///
    /// The `COUPON_*` error for the first failed check.
    pub async fn quote(&self, user_id: UserId, code: &str, amount: Money) -> Result<CouponQuote> {
        let coupon = self.lookup(code).await?;
        let used = self.store.has_used(user_id, coupon.id).await?;
        coupon
            .check_redeemable(self.env.clock.now(), used)
            .inspect_err(|_| metrics::record_coupon("rejected"))?;
        Ok(CouponQuote::new(coupon, amount))
    }

    /// Redeems `code` for `user_id`: stock is consumed and the usage
    /// recorded.
    ///
    /// # Errors
    ///
    /// The `COUPON_*` error for the first failed check.
    pub async fn redeem(&self, user_id: UserId, code: &str) -> Result<Coupon> {
        let result = self
            .store
            .redeem(user_id, code.trim(), self.env.clock.now())
            .await;
        match &result {
            Ok(coupon) => {
                metrics::record_coupon("redeemed");
                tracing::info!(user_id = %user_id, code = %coupon.code, "Coupon redeemed");
            }
            Err(err) if matches!(err.category(), ErrorCategory::Coupon) => {
                metrics::record_coupon("rejected");
                tracing::debug!(user_id = %user_id, code = %code, error = %err, "Coupon rejected");
            }
            Err(_) => {}
        }
        result
    }

    /// Redeems `code` against `amount` and returns the discount.
    ///
    /// # Errors
    ///
    /// The `COUPON_*` error for the first failed check.
    pub async fn apply(&self, user_id: UserId, code: &str, amount: Money) -> Result<CouponQuote> {
        let coupon = self.redeem(user_id, code).await?;
        Ok(CouponQuote::new(coupon, amount))
    }

    /// Undoes a redemption of `code` by `user_id`. Returns `false` when there
    /// was nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn restore(&self, user_id: UserId, code: &str) -> Result<bool> {
        let Some(coupon) = self.store.coupon_by_code(code.trim()).await? else {
            return Ok(false);
        };
        let restored = self
            .store
            .restore(user_id, coupon.id, self.env.clock.now())
            .await?;
        if restored {
            metrics::record_coupon("restored");
            tracing::info!(user_id = %user_id, code = %coupon.code, "Coupon redemption restored");
        }
        Ok(restored)
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    /// Every coupon, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn coupons(&self) -> Result<Vec<Coupon>> {
        self.store.coupons().await
    }

    /// Creates an admin coupon.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` for an empty or taken code or a percent outside `1..=100`.
    pub async fn create_coupon(&self, input: NewCoupon) -> Result<Coupon> {
        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(Error::BadInput("coupon code is required".into()));
        }
        if input.name.trim().is_empty() {
            return Err(Error::BadInput("coupon name is required".into()));
        }
        validate_discount_percent(input.discount_percent)?;

        let now = self.env.clock.now();
        let deactivated_by = if input.stock == 0 {
            Some(CouponDeactivation::OutOfStock)
        } else if input.valid_until < now {
            Some(CouponDeactivation::Expired)
        } else {
            None
        };
        let coupon = Coupon {
            id: CouponId::new(),
            code,
            name: input.name.trim().to_string(),
            discount_percent: input.discount_percent,
            valid_until: input.valid_until,
            is_active: deactivated_by.is_none(),
            deactivated_by,
            stock: input.stock,
            issued_to: None,
            created_at: now,
        };
        self.store.insert_coupon(&coupon).await?;
        tracing::info!(code = %coupon.code, stock = coupon.stock, "Coupon created");
        Ok(coupon)
    }

    /// Applies admin changes to a coupon.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown coupon, `BAD_INPUT` for an invalid percent.
    pub async fn update_coupon(&self, id: CouponId, patch: CouponPatch) -> Result<Coupon> {
        if let Some(percent) = patch.discount_percent {
            validate_discount_percent(percent)?;
        }
        if patch.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(Error::BadInput("coupon name is required".into()));
        }
        let updated = self
            .store
            .update_coupon(id, &patch)
            .await?
            .ok_or_else(|| Error::not_found("coupon", id))?;
        tracing::info!(coupon_id = %id, "Coupon updated");
        Ok(updated)
    }

    /// Soft-deletes a coupon.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown coupon.
    pub async fn deactivate_coupon(&self, id: CouponId) -> Result<Coupon> {
        self.update_coupon(
            id,
            CouponPatch {
                is_active: Some(false),
                ..CouponPatch::default()
            },
        )
        .await
    }

    /// Deactivates coupons whose validity ended before `now`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let count = self.store.deactivate_expired(now).await?;
        if count > 0 {
            metrics::record_coupons("expired", count);
            tracing::info!(count, "Expired coupons deactivated");
        }
        Ok(count)
    }
}
