//! Subscription status-update endpoint tests.

use axum::http::StatusCode;

mod common;
use common::*;

use coursepass::db::queries;
use coursepass::models::SubscriptionStatus;

fn seed_subscription(state: &coursepass::db::AppState) -> (String, String) {
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn);
    let course = create_test_course(&conn, Some("monthly"));
    queries::create_pending_subscription(
        &conn,
        "sub-1",
        &user.id,
        &course.id,
        Some("student@example.com"),
        Some("https://processor.test/manage/sub-1"),
    )
    .unwrap();
    queries::update_subscription_status(&conn, "sub-1", SubscriptionStatus::Authorized).unwrap();
    (user.id, "sub-1".to_string())
}

#[tokio::test]
async fn test_cancel_records_status_and_feedback() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);
    let (user_id, subscription_id) = seed_subscription(&state);

    let response = post_json(
        app(state.clone()),
        "/subscriptions/status",
        serde_json::json!({
            "user_id": user_id,
            "subscription_id": subscription_id,
            "action": "cancel",
            "feedback": "Too expensive for me right now",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.db.get().unwrap();
    let subscription = queries::get_subscription(&conn, &subscription_id).unwrap().unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Cancelled);

    let feedback = queries::list_cancellation_feedback(&conn, &subscription_id).unwrap();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].feedback, "Too expensive for me right now");
    assert_eq!(feedback[0].user_id, user_id);
}

#[tokio::test]
async fn test_cancel_without_feedback_records_nothing_extra() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);
    let (user_id, subscription_id) = seed_subscription(&state);

    let response = post_json(
        app(state.clone()),
        "/subscriptions/status",
        serde_json::json!({
            "user_id": user_id,
            "subscription_id": subscription_id,
            "action": "cancel",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert!(queries::list_cancellation_feedback(&conn, &subscription_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_pause_and_resume() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);
    let (user_id, subscription_id) = seed_subscription(&state);

    let response = post_json(
        app(state.clone()),
        "/subscriptions/status",
        serde_json::json!({
            "user_id": user_id,
            "subscription_id": subscription_id,
            "action": "pause",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    {
        let conn = state.db.get().unwrap();
        let subscription = queries::get_subscription(&conn, &subscription_id).unwrap().unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::Paused);
    }

    let response = post_json(
        app(state.clone()),
        "/subscriptions/status",
        serde_json::json!({
            "user_id": user_id,
            "subscription_id": subscription_id,
            "action": "resume",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let conn = state.db.get().unwrap();
    let subscription = queries::get_subscription(&conn, &subscription_id).unwrap().unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Authorized);
}

#[tokio::test]
async fn test_other_users_subscription_is_forbidden() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);
    let (_owner_id, subscription_id) = seed_subscription(&state);

    let response = post_json(
        app(state.clone()),
        "/subscriptions/status",
        serde_json::json!({
            "user_id": "someone-else",
            "subscription_id": subscription_id,
            "action": "cancel",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let conn = state.db.get().unwrap();
    let subscription = queries::get_subscription(&conn, &subscription_id).unwrap().unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Authorized);
}

#[tokio::test]
async fn test_unknown_subscription_returns_404() {
    let processor = MockProcessor::new();
    let state = create_test_state(processor);

    let response = post_json(
        app(state),
        "/subscriptions/status",
        serde_json::json!({
            "user_id": "u-1",
            "subscription_id": "sub-missing",
            "action": "cancel",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
