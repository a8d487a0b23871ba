//! Checkout creation.
//!
//! These endpoints mint the external reference the processor echoes back on
//! the webhook, ask the processor for a checkout URL, and open the pending
//! checkout intent the webhook flow later resolves.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{Course, CreateCheckoutIntent, User};
use crate::payments::{CreatePreapproval, CreatePreference};
use crate::reference::{self, PaymentKind};

const DEFAULT_CURRENCY: &str = "COP";

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub course_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCheckoutRequest {
    pub user_id: String,
    pub course_id: String,
    pub payer_email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

fn load_purchase_inputs(
    state: &AppState,
    user_id: &str,
    course_id: &str,
) -> Result<(User, Course, i64)> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_id(&conn, user_id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let course = queries::get_course_by_id(&conn, course_id)?
        .ok_or_else(|| AppError::NotFound("Course not found".into()))?;
    let price_cents = course.price_cents.ok_or_else(|| {
        AppError::BadRequest("Course has no price configured".into())
    })?;
    Ok((user, course, price_cents))
}

pub async fn initiate_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let (user, course, price_cents) =
        load_purchase_inputs(&state, &request.user_id, &request.course_id)?;

    let external_reference = reference::encode(&user.id, &course.id, PaymentKind::OneTime)?;
    let currency = course
        .currency
        .clone()
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let session = state
        .processor
        .create_preference(&CreatePreference {
            external_reference: external_reference.clone(),
            title: course.title.clone(),
            unit_price_cents: price_cents,
            currency,
            back_url: format!("{}/checkout/complete", state.base_url),
        })
        .await?;

    let conn = state.db.get()?;
    queries::create_checkout_intent(
        &conn,
        &CreateCheckoutIntent {
            reference: external_reference.clone(),
            user_id: user.id.clone(),
            course_id: course.id.clone(),
            user_email: Some(user.email.clone()),
            user_name: Some(user.name.clone()),
            course_title: Some(course.title.clone()),
            subscription_id: None,
        },
    )?;

    tracing::info!(
        user_id = %user.id,
        course_id = %course.id,
        reference = %external_reference,
        "Checkout created"
    );

    Ok(Json(CheckoutResponse {
        checkout_url: session.init_point,
        reference: external_reference,
        subscription_id: None,
    }))
}

pub async fn initiate_subscription_checkout(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionCheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let (user, course, price_cents) =
        load_purchase_inputs(&state, &request.user_id, &request.course_id)?;

    let external_reference = reference::encode(&user.id, &course.id, PaymentKind::Subscription)?;
    let currency = course
        .currency
        .clone()
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let session = state
        .processor
        .create_preapproval(&CreatePreapproval {
            external_reference: external_reference.clone(),
            reason: course.title.clone(),
            amount_cents: price_cents,
            currency,
            payer_email: request.payer_email.clone(),
            back_url: format!("{}/checkout/complete", state.base_url),
        })
        .await?;

    let conn = state.db.get()?;
    if let Some(subscription_id) = &session.id {
        queries::create_pending_subscription(
            &conn,
            subscription_id,
            &user.id,
            &course.id,
            Some(&request.payer_email),
            Some(&session.init_point),
        )?;
    }
    queries::create_checkout_intent(
        &conn,
        &CreateCheckoutIntent {
            reference: external_reference.clone(),
            user_id: user.id.clone(),
            course_id: course.id.clone(),
            user_email: Some(user.email.clone()),
            user_name: Some(user.name.clone()),
            course_title: Some(course.title.clone()),
            subscription_id: session.id.clone(),
        },
    )?;

    tracing::info!(
        user_id = %user.id,
        course_id = %course.id,
        subscription_id = ?session.id,
        "Subscription checkout created"
    );

    Ok(Json(CheckoutResponse {
        checkout_url: session.init_point,
        reference: external_reference,
        subscription_id: session.id.clone(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(initiate_checkout))
        .route("/checkout/subscription", post(initiate_subscription_checkout))
}
