//! Checkout-creation endpoint tests.

use axum::http::StatusCode;

mod common;
use common::*;

use coursepass::db::queries;
use coursepass::models::{IntentStatus, SubscriptionStatus};
use coursepass::reference::{self, PaymentKind};

#[tokio::test]
async fn test_checkout_mints_reference_and_pending_intent() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);

    let (user, course) = {
        let conn = state.db.get().unwrap();
        (create_test_user(&conn), create_test_course(&conn, Some("monthly")))
    };

    let response = post_json(
        app(state.clone()),
        "/checkout",
        serde_json::json!({ "user_id": user.id, "course_id": course.id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let checkout_url = body["checkout_url"].as_str().unwrap();
    assert!(checkout_url.starts_with("https://processor.test/checkout"));

    // The reference round-trips to the purchase context.
    let raw_reference = body["reference"].as_str().unwrap();
    let decoded = reference::decode(raw_reference).unwrap();
    assert_eq!(decoded.user_id, user.id);
    assert_eq!(decoded.course_id, course.id);
    assert_eq!(decoded.kind, PaymentKind::OneTime);

    let conn = state.db.get().unwrap();
    let intent = queries::get_checkout_intent(&conn, raw_reference).unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Pending);
    assert_eq!(intent.user_email.as_deref(), Some("student@example.com"));
    assert_eq!(intent.course_title.as_deref(), Some("Intro to Testing"));
}

#[tokio::test]
async fn test_checkout_unknown_course_returns_404() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);

    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn)
    };

    let response = post_json(
        app(state),
        "/checkout",
        serde_json::json!({ "user_id": user.id, "course_id": "missing-course" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_course_without_price_is_rejected() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);

    let (user, course_id) = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn);
        let course = queries::create_course(
            &conn,
            &coursepass::models::CreateCourse {
                title: "Unpriced".to_string(),
                price_cents: None,
                currency: None,
                access_duration: Some("monthly".to_string()),
            },
        )
        .unwrap();
        (user, course.id)
    };

    let response = post_json(
        app(state),
        "/checkout",
        serde_json::json!({ "user_id": user.id, "course_id": course_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_subscription_checkout_records_pending_subscription() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);

    let (user, course) = {
        let conn = state.db.get().unwrap();
        (create_test_user(&conn), create_test_course(&conn, Some("monthly")))
    };

    let response = post_json(
        app(state.clone()),
        "/checkout/subscription",
        serde_json::json!({
            "user_id": user.id,
            "course_id": course.id,
            "payer_email": "student@example.com",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let subscription_id = body["subscription_id"].as_str().unwrap();
    let raw_reference = body["reference"].as_str().unwrap();
    assert_eq!(
        reference::decode(raw_reference).unwrap().kind,
        PaymentKind::Subscription
    );

    let conn = state.db.get().unwrap();
    let subscription = queries::get_subscription(&conn, subscription_id).unwrap().unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Pending);
    assert_eq!(subscription.user_id, user.id);
    assert!(subscription.management_url.is_some());

    let intent = queries::get_checkout_intent(&conn, raw_reference).unwrap().unwrap();
    assert_eq!(intent.subscription_id.as_deref(), Some(subscription_id));
}
