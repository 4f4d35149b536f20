//! Property tests for the cross-component invariants: seat exclusivity,
//! sweep idempotency, loyalty milestones and coupon arithmetic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration;
use cinema_core::{BookingId, Money, PaymentId, UserId};
use cinema_testing::properties::{discount_percent, price_cents, seat_request};
use cinema_ticketing::aggregates::LoyaltyPolicy;
use cinema_ticketing::config::LoyaltyConfig;
use cinema_ticketing::gateway::BookingRequest;
use cinema_ticketing::types::{
    BookingStatus, NewCoupon, PaymentMethod, PaymentStatus, SeatState, seat_labels,
};
use common::{Harness, identity};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug)]
enum LoyaltyOp {
    Pay,
    Replay(usize),
    Refund(usize),
}

fn loyalty_op() -> impl Strategy<Value = LoyaltyOp> {
    prop_oneof![
        3 => Just(LoyaltyOp::Pay),
        1 => any::<usize>().prop_map(LoyaltyOp::Replay),
        1 => any::<usize>().prop_map(LoyaltyOp::Refund),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn seats_are_never_double_held(requests in prop::collection::vec(seat_request(4), 2..8)) {
        tokio_test::block_on(async {
            let harness = Harness::new();
            let showtime = harness.showtime(20).await;

            let attempts = requests.iter().enumerate().map(|(i, seats)| {
                let gateway = harness.gateway.clone();
                let caller = identity(i64::try_from(i).unwrap() + 10);
                let request = BookingRequest {
                    showtime_id: showtime,
                    seat_numbers: seats.clone(),
                    coupon_code: None,
                    payment_method: PaymentMethod::BankTransfer,
                };
                async move { gateway.create_booking(&caller, request).await }
            });
            let results = futures::future::join_all(attempts).await;

            let mut holders: BTreeMap<String, BookingId> = BTreeMap::new();
            for result in &results {
                match result {
                    Ok(checkout) => {
                        for label in seat_labels(&checkout.booking.seat_numbers) {
                            let previous = holders.insert(label.clone(), checkout.booking.id);
                            prop_assert!(previous.is_none(), "seat {} granted twice", label);
                        }
                    }
                    Err(err) => prop_assert!(
                        matches!(err.code(), "SEATS_UNAVAILABLE" | "BAD_INPUT"),
                        "unexpected {}", err
                    ),
                }
            }

            for seat in harness.gateway.seat_map(showtime).await.unwrap() {
                let expected = holders.get(seat.seat_number.as_str()).copied();
                prop_assert_eq!(seat.state.booking_id(), expected);
            }
            Ok(())
        })?;
    }

    #[test]
    fn a_second_sweep_changes_nothing(
        bookings in 1usize..6,
        paid in 0usize..6,
        hours in 0i64..60,
    ) {
        tokio_test::block_on(async {
            let harness = Harness::new();
            let gateway = &harness.gateway;
            let showtime = harness.showtime(20).await;
            let user = identity(2);

            for i in 0..bookings {
                let checkout = gateway
                    .create_booking(&user, BookingRequest {
                        showtime_id: showtime,
                        seat_numbers: vec![format!("A{}", i + 1)],
                        coupon_code: None,
                        payment_method: PaymentMethod::CreditCard,
                    })
                    .await
                    .unwrap();
                if i < paid {
                    gateway
                        .upload_payment_proof(&user, checkout.payment.id, "proof")
                        .await
                        .unwrap();
                }
            }

            harness.advance(Duration::hours(hours));
            let sweeper = harness.components.sweeper();
            sweeper.run_once(harness.clock_now()).await.unwrap();
            let bookings_after = gateway.my_bookings(&user).await.unwrap();
            let payments_after = gateway.my_payments(&user).await.unwrap();
            let seats_after = gateway.seat_map(showtime).await.unwrap();

            let second = sweeper.run_once(harness.clock_now()).await.unwrap();
            prop_assert!(second.is_empty(), "second pass did {:?}", second);
            prop_assert_eq!(gateway.my_bookings(&user).await.unwrap(), bookings_after.clone());
            prop_assert_eq!(gateway.my_payments(&user).await.unwrap(), payments_after.clone());
            prop_assert_eq!(gateway.seat_map(showtime).await.unwrap(), seats_after.clone());

            // Booking, payment and seats agree after the sweep.
            for booking in &bookings_after {
                let payment = payments_after
                    .iter()
                    .find(|p| p.booking_id == booking.id)
                    .unwrap();
                let holds = seats_after
                    .iter()
                    .filter(|s| s.state.booking_id() == Some(booking.id))
                    .count();
                match booking.status {
                    BookingStatus::Paid => {
                        prop_assert_eq!(payment.status, PaymentStatus::Paid);
                        prop_assert_eq!(holds, booking.seat_numbers.len());
                    }
                    BookingStatus::Pending => {
                        prop_assert_eq!(payment.status, PaymentStatus::Pending);
                        prop_assert_eq!(holds, booking.seat_numbers.len());
                    }
                    BookingStatus::Cancelled => {
                        prop_assert!(!payment.status.is_active());
                        prop_assert_eq!(holds, 0);
                    }
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn milestones_are_rewarded_once(ops in prop::collection::vec(loyalty_op(), 1..40)) {
        tokio_test::block_on(async {
            let harness = Harness::new();
            let loyalty = &harness.components.loyalty;
            let policy = LoyaltyPolicy::new(LoyaltyConfig::default());
            let user = UserId::new(3);

            let mut paid: Vec<PaymentId> = Vec::new();
            let mut refunded: HashSet<PaymentId> = HashSet::new();
            let mut rewarded: Vec<u32> = Vec::new();
            let mut last_milestone = 0;

            for op in ops {
                match op {
                    LoyaltyOp::Pay => {
                        let id = PaymentId::new();
                        paid.push(id);
                        let tally = loyalty.record_payment(user, id).await.unwrap();
                        prop_assert!(tally.counted);
                        if tally.reward.is_some() {
                            rewarded.push(tally.progress.payment_count);
                        }
                    }
                    LoyaltyOp::Replay(i) if !paid.is_empty() => {
                        let id = paid[i % paid.len()];
                        let tally = loyalty.record_payment(user, id).await.unwrap();
                        prop_assert!(!tally.counted);
                        prop_assert!(tally.reward.is_none());
                    }
                    LoyaltyOp::Refund(i) if !paid.is_empty() => {
                        let id = paid[i % paid.len()];
                        let progress = loyalty.record_refund(user, id).await.unwrap();
                        prop_assert_eq!(progress.is_some(), refunded.insert(id));
                    }
                    LoyaltyOp::Replay(_) | LoyaltyOp::Refund(_) => {}
                }

                let progress = loyalty.progress(user).await.unwrap();
                let counted = u32::try_from(paid.len() - refunded.len()).unwrap();
                prop_assert_eq!(progress.count.payment_count, counted);
                prop_assert!(progress.count.last_coupon_milestone >= last_milestone);
                last_milestone = progress.count.last_coupon_milestone;
            }

            prop_assert!(rewarded.windows(2).all(|w| w[0] < w[1]), "milestone rewarded twice");
            prop_assert!(rewarded.iter().all(|&m| policy.is_milestone(m)));
            let issued = loyalty.progress(user).await.unwrap().coupons.len();
            prop_assert_eq!(issued, rewarded.len());
            Ok(())
        })?;
    }

    #[test]
    fn coupon_quotes_split_the_amount(cents in price_cents(), percent in discount_percent()) {
        tokio_test::block_on(async {
            let harness = Harness::new();
            let gateway = &harness.gateway;
            gateway
                .create_coupon(NewCoupon {
                    code: "PROP".into(),
                    name: "Property".into(),
                    discount_percent: percent,
                    valid_until: harness.clock_now() + Duration::days(1),
                    stock: 1,
                })
                .await
                .unwrap();

            let amount = Money::from_cents(cents);
            let quote = gateway.apply_coupon(&identity(4), "PROP", amount).await.unwrap();
            prop_assert_eq!(quote.discount.cents(), cents * u64::from(percent) / 100);
            prop_assert_eq!(quote.discount.cents() + quote.final_amount.cents(), cents);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn sweep_leaves_fresh_holds_alone() {
    let harness = Harness::new();
    let showtime = harness.showtime(20).await;
    let checkout = harness
        .gateway
        .create_booking(
            &identity(2),
            BookingRequest {
                showtime_id: showtime,
                seat_numbers: vec!["B2".into()],
                coupon_code: None,
                payment_method: PaymentMethod::CreditCard,
            },
        )
        .await
        .unwrap();

    harness.advance(Duration::hours(23));
    let report = harness
        .components
        .sweeper()
        .run_once(harness.clock_now())
        .await
        .unwrap();
    assert!(report.is_empty());

    let seat = harness
        .gateway
        .seat_map(showtime)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.seat_number.as_str() == "B2")
        .unwrap();
    assert!(matches!(seat.state, SeatState::Reserved { booking_id, .. } if booking_id == checkout.booking.id));
}
