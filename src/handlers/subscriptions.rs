use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::SubscriptionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Cancel,
    Pause,
    Resume,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionStatusRequest {
    pub user_id: String,
    pub subscription_id: String,
    pub action: SubscriptionAction,
    /// Optional cancellation-survey feedback, recorded on cancel only.
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
}

/// Cancel, pause or resume a subscription: push the change to the processor
/// first, then mirror it locally.
pub async fn update_subscription(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionStatusRequest>,
) -> Result<Json<SubscriptionStatusResponse>> {
    let conn = state.db.get()?;
    let subscription = queries::get_subscription(&conn, &request.subscription_id)?
        .ok_or_else(|| AppError::NotFound("Subscription not found".into()))?;

    if subscription.user_id != request.user_id {
        return Err(AppError::Forbidden(
            "Subscription does not belong to this user".into(),
        ));
    }
    drop(conn);

    let target = match request.action {
        SubscriptionAction::Cancel => SubscriptionStatus::Cancelled,
        SubscriptionAction::Pause => SubscriptionStatus::Paused,
        SubscriptionAction::Resume => SubscriptionStatus::Authorized,
    };

    state
        .processor
        .update_preapproval_status(&request.subscription_id, target.as_ref())
        .await?;

    let conn = state.db.get()?;
    queries::update_subscription_status(&conn, &request.subscription_id, target)?;

    if request.action == SubscriptionAction::Cancel {
        if let Some(feedback) = request.feedback.as_deref() {
            let feedback = feedback.trim();
            if !feedback.is_empty() {
                queries::record_cancellation_feedback(
                    &conn,
                    &request.user_id,
                    &request.subscription_id,
                    feedback,
                )?;
            }
        }
    }

    tracing::info!(
        subscription_id = %request.subscription_id,
        action = ?request.action,
        "Subscription status updated"
    );

    Ok(Json(SubscriptionStatusResponse {
        subscription_id: request.subscription_id,
        status: target,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/subscriptions/status", post(update_subscription))
}
