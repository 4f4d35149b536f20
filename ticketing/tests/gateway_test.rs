//! Gateway behaviour: authentication gates, fan-out partial failure and
//! booking compensation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cinema_core::{BookingId, Error, PaymentId, Result, UserId};
use cinema_ticketing::bootstrap::Resources;
use cinema_ticketing::gateway::{BookingRequest, MOVIE_SERVICE};
use cinema_ticketing::providers::PaymentStore;
use cinema_ticketing::stores::InMemoryPaymentStore;
use cinema_ticketing::types::{
    BookingStatus, NewCoupon, Payment, PaymentMethod, PaymentStatus, SeatState,
};
use cinema_web::Authorization;
use common::{Harness, admin_bearer, bearer, identity, seats};
use std::sync::Arc;

/// Payment store whose inserts always fail.
struct RejectingPayments {
    inner: InMemoryPaymentStore,
}

#[async_trait]
impl PaymentStore for RejectingPayments {
    async fn insert(&self, _payment: &Payment) -> Result<()> {
        Err(Error::internal("payments table is read-only"))
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.inner.get(id).await
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        self.inner.for_user(user_id).await
    }

    async fn for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        self.inner.for_booking(booking_id).await
    }

    async fn all(&self) -> Result<Vec<Payment>> {
        self.inner.all().await
    }

    async fn transition(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        self.inner.transition(id, from, to, at).await
    }

    async fn attach_proof(
        &self,
        id: PaymentId,
        proof: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        self.inner.attach_proof(id, proof, at).await
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> Result<Vec<Payment>> {
        self.inner.fail_stale(cutoff, at).await
    }

    async fn mark_settled(&self, id: PaymentId, at: DateTime<Utc>) -> Result<()> {
        self.inner.mark_settled(id, at).await
    }

    async fn unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        self.inner.unsettled(cutoff).await
    }
}

fn auth(value: String) -> Authorization {
    Authorization(Some(value))
}

#[tokio::test]
async fn missing_and_bad_tokens_are_rejected() {
    let harness = Harness::new();
    let gateway = &harness.gateway;

    let err = gateway.authenticate(&Authorization(None)).await.unwrap_err();
    assert_eq!(err.code(), "AUTHENTICATION_REQUIRED");

    let err = gateway
        .authenticate(&auth("Basic dXNlcjpwdw==".into()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TOKEN");

    let err = gateway
        .authenticate(&auth("Bearer nobody".into()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TOKEN");

    let caller = gateway.authenticate(&auth(bearer(9))).await.unwrap();
    assert_eq!(caller.user_id, UserId::new(9));
}

#[tokio::test]
async fn admin_operations_need_the_admin_role() {
    let harness = Harness::new();
    let gateway = &harness.gateway;

    let err = gateway
        .authenticate_admin(&auth(bearer(2)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    let admin = gateway.authenticate_admin(&auth(admin_bearer())).await.unwrap();
    assert!(admin.is_admin());
    assert_eq!(gateway.users(&auth(admin_bearer())).await.unwrap().len(), 3);
}

#[tokio::test]
async fn user_service_outage_is_reported_as_unavailable() {
    let harness = Harness::new();
    harness.users.set_down(true);

    let err = harness
        .gateway
        .authenticate(&auth(bearer(2)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
    assert_eq!(err.to_string(), "user service unavailable");
}

#[tokio::test]
async fn browse_degrades_per_slice() {
    let harness = Harness::new();
    harness.showtime(50).await;
    harness.catalog.set_movies_down(true);

    let browse = harness.gateway.browse(&Authorization(None)).await;
    assert!(!browse.movies.success);
    assert_eq!(
        browse.movies.error.as_deref(),
        Some(format!("{MOVIE_SERVICE} unavailable").as_str())
    );
    assert!(browse.movies.data.is_none());

    assert!(browse.cinemas.success);
    assert_eq!(browse.cinemas.data.map(|c| c.len()), Some(1));
    assert!(browse.showtimes.success);
    assert_eq!(browse.showtimes.data.map(|s| s.len()), Some(1));
}

#[tokio::test]
async fn failed_payment_creation_rolls_the_booking_back() {
    let mut resources = Resources::in_memory();
    resources.payments = Arc::new(RejectingPayments {
        inner: InMemoryPaymentStore::new(),
    });
    let harness = Harness::with_resources(resources);
    let gateway = &harness.gateway;
    let showtime = harness.showtime(40).await;
    let user = identity(2);

    gateway
        .create_coupon(NewCoupon {
            code: "TEN".into(),
            name: "Ten off".into(),
            discount_percent: 10,
            valid_until: harness.clock_now() + Duration::days(10),
            stock: 1,
        })
        .await
        .unwrap();

    let err = gateway
        .create_booking(
            &user,
            BookingRequest {
                showtime_id: showtime,
                seat_numbers: seats(&["A1", "A2"]),
                coupon_code: Some("TEN".into()),
                payment_method: PaymentMethod::CreditCard,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INTERNAL_ERROR");
    assert_eq!(err.public_message(), "internal error");

    let bookings = gateway.my_bookings(&user).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Cancelled);

    let map = gateway.seat_map(showtime).await.unwrap();
    assert!(map.iter().all(|seat| seat.state == SeatState::Available));

    let coupon = gateway
        .coupons()
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.code == "TEN")
        .unwrap();
    assert_eq!(coupon.stock, 1);
    assert!(coupon.is_active);
}

#[tokio::test]
async fn invalid_seat_requests_are_bad_input() {
    let harness = Harness::new();
    let showtime = harness.showtime(50).await;
    let user = identity(2);

    for labels in [vec![], seats(&["A1", "A1"]), seats(&["Z99"])] {
        let err = harness
            .gateway
            .create_booking(
                &user,
                BookingRequest {
                    showtime_id: showtime,
                    seat_numbers: labels,
                    coupon_code: None,
                    payment_method: PaymentMethod::EWallet,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_INPUT", "{err}");
    }
    assert!(harness.gateway.all_bookings().await.unwrap().is_empty());
}
