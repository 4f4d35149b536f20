//! Business metrics for the cinema ticketing system.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `cinema_bookings_total{status}` - bookings created, paid, cancelled
//! - `cinema_booking_cancellations_total{reason}` - cancellations by cause
//! - `cinema_payments_total{status}` - payment transitions
//! - `cinema_payment_revenue_cents_total` - revenue from paid payments
//! - `cinema_payment_refunds_cents_total` - refunded amounts
//! - `cinema_seats_total{transition}` - seats reserved, booked, released, expired
//! - `cinema_seat_conflicts_total` - reservations rejected for taken seats
//! - `cinema_coupons_total{event}` - coupons issued, redeemed, restored, rejected
//! - `cinema_sweeps_total{sweep}` - background sweep passes
//! - `cinema_downstream_requests_total{service, outcome}` - gateway calls
//!
//! ## Histograms
//! - `cinema_downstream_duration_seconds{service}` - downstream latency

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Latency buckets for every `*_duration_seconds` histogram.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Installs the Prometheus recorder and serves `/metrics` on `addr`.
///
/// # Errors
///
/// Returns error if a recorder is already installed or the listener cannot
/// bind.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .with_http_listener(addr)
        .install()?;

    register_business_metrics();
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Initialize and register all business metrics descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "cinema_bookings_total",
        "Bookings by status transition (created, paid, cancelled)"
    );
    describe_counter!(
        "cinema_booking_cancellations_total",
        "Booking cancellations by reason"
    );
    describe_counter!(
        "cinema_payments_total",
        "Payment transitions by resulting status"
    );
    describe_counter!(
        "cinema_payment_revenue_cents_total",
        "Revenue from paid payments in cents"
    );
    describe_counter!(
        "cinema_payment_refunds_cents_total",
        "Refunds issued in cents"
    );
    describe_counter!(
        "cinema_seats_total",
        "Seat state transitions (reserved, booked, released, expired)"
    );
    describe_counter!(
        "cinema_seat_conflicts_total",
        "Reservation attempts rejected because a seat was taken"
    );
    describe_counter!(
        "cinema_coupons_total",
        "Coupon lifecycle events (issued, redeemed, restored, rejected)"
    );
    describe_counter!("cinema_sweeps_total", "Background sweep passes by sweep");
    describe_counter!(
        "cinema_downstream_requests_total",
        "Downstream GraphQL requests by service and outcome"
    );
    describe_histogram!(
        "cinema_downstream_duration_seconds",
        "Downstream GraphQL request latency"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a booking status transition (`created`, `paid`, `cancelled`).
pub fn record_booking(status: &'static str) {
    counter!("cinema_bookings_total", "status" => status).increment(1);
}

/// Record a booking cancellation with its cause.
pub fn record_booking_cancelled(reason: &'static str) {
    counter!("cinema_bookings_total", "status" => "cancelled").increment(1);
    counter!("cinema_booking_cancellations_total", "reason" => reason).increment(1);
}

/// Record a payment reaching `status`.
pub fn record_payment(status: &'static str) {
    counter!("cinema_payments_total", "status" => status).increment(1);
}

/// Record revenue from a paid payment.
pub fn record_revenue(amount_cents: u64) {
    counter!("cinema_payment_revenue_cents_total").increment(amount_cents);
}

/// Record a refund.
pub fn record_refund(amount_cents: u64) {
    counter!("cinema_payments_total", "status" => "refunded").increment(1);
    counter!("cinema_payment_refunds_cents_total").increment(amount_cents);
}

/// Record `count` seats making a transition (`reserved`, `booked`, `released`, `expired`).
pub fn record_seats(transition: &'static str, count: usize) {
    counter!("cinema_seats_total", "transition" => transition).increment(count as u64);
}

/// Record a reservation rejected because seats were taken.
pub fn record_seat_conflict() {
    counter!("cinema_seat_conflicts_total").increment(1);
}

/// Record a coupon event (`issued`, `redeemed`, `restored`, `rejected`).
pub fn record_coupon(event: &'static str) {
    record_coupons(event, 1);
}

/// Record `count` coupons going through `event` at once (`expired`).
pub fn record_coupons(event: &'static str, count: u64) {
    counter!("cinema_coupons_total", "event" => event).increment(count);
}

/// Record one sweep pass.
pub fn record_sweep(sweep: &'static str) {
    counter!("cinema_sweeps_total", "sweep" => sweep).increment(1);
}

/// Record a downstream call and its latency.
pub fn record_downstream(service: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "cinema_downstream_requests_total",
        "service" => service,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("cinema_downstream_duration_seconds", "service" => service)
        .record(elapsed.as_secs_f64());
}
