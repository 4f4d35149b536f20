//! Deadline sweeper.
//!
//! Deadlines are persisted timestamps; this task enforces them. Each pass
//! runs, in order:
//!
//! 1. settlement: approved payments whose booking confirmation or loyalty
//!    bookkeeping never finished are settled again
//! 2. payment expiry: pending payments without proof past the expiry fail,
//!    their bookings are cancelled
//! 3. reservation expiry: expired seat holds are released, their bookings
//!    cancelled and any pending payment voided
//! 4. coupon expiry: coupons past their validity are deactivated
//!
//! Every step is a compare-and-set on current state, so a second pass over
//! the same instant finds nothing to do.

use crate::aggregates::{BookingManager, LoyaltyEngine, PaymentManager};
use crate::metrics;
use chrono::{DateTime, Utc};
use cinema_core::{Clock, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

/// What one pass changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Approved payments settled after an earlier failure
    pub payments_settled: usize,
    /// Payments failed for missing proof
    pub payments_expired: usize,
    /// Bookings cancelled because their seat hold expired
    pub reservations_expired: usize,
    /// Pending payments voided with those bookings
    pub payments_voided: usize,
    /// Coupons deactivated past their validity
    pub coupons_expired: u64,
}

impl SweepReport {
    /// Whether the pass changed nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.payments_settled == 0
            && self.payments_expired == 0
            && self.reservations_expired == 0
            && self.payments_voided == 0
            && self.coupons_expired == 0
    }
}

/// Periodic deadline enforcement.
pub struct Sweeper {
    payments: PaymentManager,
    bookings: BookingManager,
    loyalty: LoyaltyEngine,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Sweeper {
    /// Creates a sweeper running every `interval`
    #[must_use]
    pub fn new(
        payments: PaymentManager,
        bookings: BookingManager,
        loyalty: LoyaltyEngine,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            payments,
            bookings,
            loyalty,
            clock,
            interval,
        }
    }

    /// Runs one pass at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; the remaining steps of the pass are
    /// skipped and retried on the next tick.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        report.payments_settled = self.payments.settle_stalled(now).await?.len();
        metrics::record_sweep("settlements");

        let failed = self.payments.expire_stale(now).await?;
        report.payments_expired = failed.len();
        metrics::record_sweep("payments");

        let expired = self.bookings.expire_reservations(now).await?;
        report.reservations_expired = expired.len();
        for booking in &expired {
            if self.payments.void_for_booking(booking.id).await?.is_some() {
                report.payments_voided += 1;
            }
        }
        metrics::record_sweep("reservations");

        report.coupons_expired = self.loyalty.deactivate_expired(now).await?;
        metrics::record_sweep("coupons");

        Ok(report)
    }

    /// Spawns the periodic loop; it exits when `shutdown` fires.
    #[must_use]
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "Sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once(self.clock.now()).await {
                        Ok(report) if report.is_empty() => {}
                        Ok(report) => info!(
                            payments_settled = report.payments_settled,
                            payments_expired = report.payments_expired,
                            reservations_expired = report.reservations_expired,
                            payments_voided = report.payments_voided,
                            coupons_expired = report.coupons_expired,
                            "Sweep pass applied deadlines"
                        ),
                        Err(e) => error!(error = %e, "Sweep pass failed"),
                    }
                }
            }
        }

        info!("Sweeper stopped");
    }
}
