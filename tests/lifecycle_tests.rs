mod common;

use common::Harness;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tripbook::domain::booking::BookingStatus;
use tripbook::domain::payment::PaymentStatus;
use tripbook::error::EngineError;

#[tokio::test]
async fn test_happy_path_releases_half_then_remainder() {
    let h = Harness::new();
    let (traveler, _, booking) = h.paid_booking(dec!(5000)).await;
    assert_eq!(booking.status, BookingStatus::Paid);

    let booking = h
        .engine
        .confirm_arrival(traveler, booking.id)
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::TripStarted);
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(2500));
    assert_eq!(payment.status, PaymentStatus::FirstReleased);

    let booking = h
        .engine
        .confirm_complete(traveler, booking.id)
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::TripCompleted);
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(5000));
    assert_eq!(payment.refunded, dec!(0));
    assert_eq!(payment.status, PaymentStatus::FullyReleased);
    assert!(payment.is_settled());
}

#[tokio::test]
async fn test_odd_cent_total_settles_exactly() {
    let h = Harness::new();
    let (traveler, _, booking) = h.paid_booking(dec!(4999.99)).await;

    h.engine
        .confirm_arrival(traveler, booking.id)
        .await
        .unwrap();
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(2500.00));

    h.engine
        .confirm_complete(traveler, booking.id)
        .await
        .unwrap();
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(4999.99));
    assert!(payment.is_settled());
}

#[tokio::test]
async fn test_redelivered_confirmation_is_a_no_op() {
    let h = Harness::new();
    let (traveler, _, booking) = h.paid_booking(dec!(5000)).await;

    h.engine
        .confirm_arrival(traveler, booking.id)
        .await
        .unwrap();
    let again = h
        .engine
        .confirm_arrival(traveler, booking.id)
        .await
        .unwrap();
    assert_eq!(again.status, BookingStatus::TripStarted);

    // The release happened once.
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(2500));
}

#[tokio::test]
async fn test_concurrent_duplicate_confirmations_release_once() {
    let h = Harness::new();
    let (traveler, _, booking) = h.paid_booking(dec!(5000)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move {
            engine.confirm_arrival(traveler, booking.id).await
        }));
    }
    for handle in handles {
        // Either the winner's commit or an idempotent replay.
        handle.await.unwrap().unwrap();
    }

    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(2500));
}

#[tokio::test]
async fn test_wrong_actor_cannot_confirm() {
    let h = Harness::new();
    let (_, guide, booking) = h.paid_booking(dec!(5000)).await;

    let result = h.engine.confirm_arrival(guide, booking.id).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(0));
}

#[tokio::test]
async fn test_out_of_order_event_rejected() {
    let h = Harness::new();
    let (traveler, _, booking) = h.paid_booking(dec!(5000)).await;

    // Completion before arrival.
    let result = h.engine.confirm_complete(traveler, booking.id).await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidTransition {
            from: BookingStatus::Paid,
            ..
        })
    ));
}

#[tokio::test]
async fn test_cancel_before_payment_only() {
    let h = Harness::new();
    let (traveler, _, booking) = h.booking(dec!(5000)).await;

    let cancelled = h.engine.cancel_booking(traveler, booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    // Idempotent.
    let again = h.engine.cancel_booking(traveler, booking.id).await.unwrap();
    assert_eq!(again.status, BookingStatus::Cancelled);

    let (traveler, _, paid) = h.paid_booking(dec!(5000)).await;
    let result = h.engine.cancel_booking(traveler, paid.id).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_confirm_payment_requires_matching_reference() {
    let h = Harness::new();
    let (traveler, _, booking) = h.booking(dec!(5000)).await;
    h.engine
        .create_payment_intent(traveler, booking.id)
        .await
        .unwrap();

    let result = h.engine.confirm_payment(booking.id, "pi-forged").await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_confirm_payment_requires_an_intent_on_file() {
    let h = Harness::new();
    let (_, _, booking) = h.booking(dec!(5000)).await;

    // No intent was ever created; a forged callback must not capture.
    let result = h.engine.confirm_payment(booking.id, "pi-forged").await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let booking = h.engine.booking(booking.id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::PendingPayment);
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.processor_ref.is_none());
}

#[tokio::test]
async fn test_self_reported_no_show_splits_evenly() {
    let h = Harness::new();
    let (traveler, _, booking) = h.paid_booking(dec!(4000)).await;

    let booking = h
        .engine
        .confirm_no_show(traveler, booking.id)
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::NoShowConfirmed);

    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(2000));
    assert_eq!(payment.refunded, dec!(2000));
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert!(payment.is_settled());
}

#[tokio::test]
async fn test_guide_report_holds_escrow() {
    let h = Harness::new();
    let (_, guide, booking) = h.paid_booking(dec!(4000)).await;

    let booking = h.engine.report_no_show(guide, booking.id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::NoShowReported);
    assert!(booking.no_show_reported_at.is_some());

    // Nothing moves until the window closes or a dispute resolves.
    let payment = h.engine.payment(booking.id).await.unwrap();
    assert_eq!(payment.released, dec!(0));
    assert_eq!(payment.refunded, dec!(0));
}

#[tokio::test]
async fn test_no_show_self_report_notifies_both_parties() {
    let h = Harness::new();
    let (traveler, _, booking) = h.paid_booking(dec!(4000)).await;
    h.engine
        .confirm_no_show(traveler, booking.id)
        .await
        .unwrap();

    let events = h.notifier.events();
    assert!(events.contains(&"no_show_confirmed"));
}
