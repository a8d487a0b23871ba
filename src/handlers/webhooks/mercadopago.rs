//! Processor webhook ingestion.
//!
//! Deliveries are at-least-once, possibly duplicated and out of order, and
//! the response status is the sender's retry signal: 200 means "do not
//! redeliver" even for terminal failures, 500 means "redeliver". The
//! idempotency ledger makes redelivery safe; the grant transaction makes the
//! business effect atomic with the ledger close.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::db::{AppState, queries};
use crate::db::queries::{GrantOutcome, GrantParams, LedgerGate, PaymentOutcome};
use crate::error::{AppError, Result, RetryDecision};
use crate::events::{WebhookBody, WebhookEvent};
use crate::models::{IntentStatus, UpdateCheckoutIntent, ledger_status};
use crate::payments::{PaymentEventKind, verify_webhook_signature};
use crate::reference::{self, ExternalReference, PaymentKind};

pub async fn handle_processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to parse webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };

    // Authenticity gate. Nothing is recorded for rejected requests.
    if let Err(e) =
        verify_webhook_signature(&state.webhook_secret, &headers, &body, parsed.data_id())
    {
        tracing::warn!("Webhook rejected: {}", e);
        return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
    }

    match WebhookEvent::classify(&parsed) {
        WebhookEvent::Payment { payment_id, is_update } => {
            finish_payment_event(&state, PaymentEventKind::Payment, &payment_id, is_update).await
        }
        WebhookEvent::SubscriptionAuthorizedPayment { payment_id } => {
            finish_payment_event(&state, PaymentEventKind::AuthorizedPayment, &payment_id, false)
                .await
        }
        WebhookEvent::SubscriptionPreapproval { preapproval_id } => {
            match process_preapproval_event(&state, &preapproval_id).await {
                Ok(msg) => (StatusCode::OK, msg).into_response(),
                Err(err) => respond_for_failure(&state, None, err),
            }
        }
        WebhookEvent::Unknown { event_type } => {
            tracing::info!(event_type = %event_type, "Ignoring unhandled webhook event type");
            (StatusCode::OK, "Event ignored").into_response()
        }
    }
}

async fn finish_payment_event(
    state: &AppState,
    kind: PaymentEventKind,
    payment_id: &str,
    is_update: bool,
) -> Response {
    match process_payment_event(state, kind, payment_id, is_update).await {
        Ok(msg) => (StatusCode::OK, msg).into_response(),
        Err(err) => respond_for_failure(state, Some(payment_id), err),
    }
}

/// Turn a processing failure into the retry signal, recording terminal
/// state for failures redelivery cannot fix.
fn respond_for_failure(state: &AppState, payment_id: Option<&str>, err: AppError) -> Response {
    match err.retry_decision() {
        RetryDecision::NonRetryable => {
            if let Some(payment_id) = payment_id {
                ensure_error_recorded(state, payment_id, &err);
            }
            tracing::warn!(error = %err, "Webhook failed terminally; acknowledging to stop redelivery");
            (StatusCode::OK, "Handled with non-retryable error").into_response()
        }
        RetryDecision::Retryable => {
            tracing::error!(error = %err, "Webhook processing failed; requesting redelivery");
            (StatusCode::INTERNAL_SERVER_ERROR, "Temporary failure").into_response()
        }
    }
}

/// Last-resort terminal write: a payment id must not stay `processing` after
/// a non-retryable failure. No-op when a terminal status is already present.
fn ensure_error_recorded(state: &AppState, payment_id: &str, err: &AppError) {
    let message = err.to_string();
    let result = state.db.get().map_err(AppError::from).and_then(|conn| {
        queries::record_payment_error_if_processing(&conn, payment_id, &message)
    });
    if let Err(record_err) = result {
        tracing::error!(payment_id, error = %record_err, "Failed to record terminal error state");
    }
}

async fn process_payment_event(
    state: &AppState,
    kind: PaymentEventKind,
    payment_id: &str,
    is_update: bool,
) -> Result<&'static str> {
    // First transaction: claim the payment id or bail out.
    {
        let mut conn = state.db.get()?;
        match queries::begin_payment_processing(&mut conn, payment_id)? {
            LedgerGate::AlreadyProcessed => {
                tracing::info!(payment_id, is_update, "Payment already processed; skipping");
                return Ok("Already processed");
            }
            LedgerGate::Proceed => {}
        }
    }

    // Authoritative payment state. A dependency call, deliberately outside
    // any transaction; failures here leave only the non-terminal
    // `processing` marker, so the next delivery retries cleanly.
    let payment = state.processor.fetch_payment(kind, payment_id).await?;

    let raw_reference = payment.external_reference.clone().ok_or_else(|| {
        AppError::MalformedReference("Payment carries no external reference".into())
    })?;
    let reference = reference::decode(&raw_reference)?;

    let conn = state.db.get()?;

    if payment.is_in_flight() {
        // Asynchronous payment method still settling; an updated event with
        // the final status will follow and must pass the ledger gate, so no
        // terminal record is written.
        touch_intent(
            &conn,
            &raw_reference,
            &UpdateCheckoutIntent {
                payment_id: Some(payment_id.to_string()),
                payment_status: Some(payment.status.clone()),
                ..Default::default()
            },
        );
        tracing::info!(payment_id, status = %payment.status, "Payment still in flight");
        return Ok("Payment pending");
    }

    if !payment.is_approved() {
        queries::record_payment_outcome(
            &conn,
            payment_id,
            &PaymentOutcome {
                status: &payment.status,
                user_id: Some(&reference.user_id),
                course_id: Some(&reference.course_id),
                is_subscription: reference.kind == PaymentKind::Subscription,
                error_message: None,
            },
        )?;
        touch_intent(
            &conn,
            &raw_reference,
            &UpdateCheckoutIntent {
                status: Some(IntentStatus::Failed),
                payment_id: Some(payment_id.to_string()),
                payment_status: Some(payment.status.clone()),
                failure_reason: Some(format!("Payment {}", payment.status)),
                ..Default::default()
            },
        );
        tracing::info!(payment_id, status = %payment.status, "Payment not approved");
        return Ok("Payment not approved");
    }

    // Approved. Resolve the grant inputs; missing data is terminal.
    let user = match queries::get_user_by_id(&conn, &reference.user_id)? {
        Some(u) => u,
        None => {
            let err = AppError::NotFound(format!("User {} not found", reference.user_id));
            record_grant_failure(&conn, payment_id, &raw_reference, &reference, &err);
            return Err(err);
        }
    };
    let course = match queries::get_course_by_id(&conn, &reference.course_id)? {
        Some(c) => c,
        None => {
            let err = AppError::NotFound(format!("Course {} not found", reference.course_id));
            record_grant_failure(&conn, payment_id, &raw_reference, &reference, &err);
            return Err(err);
        }
    };
    let access_duration = match course.access_duration.clone() {
        Some(d) => d,
        None => {
            let err = AppError::ConfigurationError(format!(
                "Course {} has no access_duration configured",
                course.id
            ));
            record_grant_failure(&conn, payment_id, &raw_reference, &reference, &err);
            return Err(err);
        }
    };
    drop(conn);

    // Second transaction: the grant and the terminal ledger write, atomic.
    let mut conn = state.db.get()?;
    let outcome = queries::grant_entitlement_atomic(
        &mut conn,
        &GrantParams {
            user_id: &user.id,
            course_id: &course.id,
            payment_id,
            kind: reference.kind,
            access_duration: &access_duration,
            course_title: &course.title,
            subscription_id: payment.subscription_id.as_deref(),
            payer_email: Some(&user.email),
        },
    )?;

    let (intent_status, msg) = match outcome {
        GrantOutcome::Granted { .. } => (IntentStatus::Completed, "Entitlement granted"),
        GrantOutcome::Renewed { .. } => (IntentStatus::Completed, "Subscription renewed"),
        GrantOutcome::AlreadyOwned => (IntentStatus::AlreadyOwned, "Course already owned"),
    };
    touch_intent(
        &conn,
        &raw_reference,
        &UpdateCheckoutIntent {
            status: Some(intent_status),
            payment_id: Some(payment_id.to_string()),
            payment_status: Some(payment.status.clone()),
            subscription_id: payment.subscription_id.clone(),
            ..Default::default()
        },
    );

    tracing::info!(
        payment_id,
        user_id = %user.id,
        course_id = %course.id,
        ?outcome,
        "Payment processed"
    );
    Ok(msg)
}

/// Subscription lifecycle change: mirror the processor's preapproval status
/// onto the local record.
async fn process_preapproval_event(
    state: &AppState,
    preapproval_id: &str,
) -> Result<&'static str> {
    let preapproval = state.processor.fetch_preapproval(preapproval_id).await?;

    let status = match preapproval.status.parse() {
        Ok(status) => status,
        Err(_) => {
            tracing::info!(
                preapproval_id,
                status = %preapproval.status,
                "Ignoring unrecognized preapproval status"
            );
            return Ok("Preapproval status ignored");
        }
    };

    let conn = state.db.get()?;
    let updated = queries::update_subscription_status(&conn, preapproval_id, status)?;
    if !updated {
        tracing::warn!(preapproval_id, "Preapproval event for unknown subscription");
        return Ok("Unknown subscription");
    }

    tracing::info!(preapproval_id, status = %preapproval.status, "Subscription status updated");
    Ok("Subscription status updated")
}

/// Terminal bookkeeping for an approved payment that cannot be granted:
/// error ledger record plus a failed intent, both merge-writes.
fn record_grant_failure(
    conn: &Connection,
    payment_id: &str,
    raw_reference: &str,
    reference: &ExternalReference,
    err: &AppError,
) {
    let message = err.to_string();
    if let Err(record_err) = queries::record_payment_outcome(
        conn,
        payment_id,
        &PaymentOutcome {
            status: ledger_status::ERROR,
            user_id: Some(&reference.user_id),
            course_id: Some(&reference.course_id),
            is_subscription: reference.kind == PaymentKind::Subscription,
            error_message: Some(&message),
        },
    ) {
        tracing::error!(payment_id, error = %record_err, "Failed to write error ledger record");
    }
    touch_intent(
        conn,
        raw_reference,
        &UpdateCheckoutIntent {
            status: Some(IntentStatus::Failed),
            payment_id: Some(payment_id.to_string()),
            failure_reason: Some(message),
            ..Default::default()
        },
    );
}

/// Best-effort intent update. The intent is observability, not a
/// correctness boundary: failures are logged and swallowed.
fn touch_intent(conn: &Connection, reference: &str, update: &UpdateCheckoutIntent) {
    if let Err(err) = queries::update_checkout_intent(conn, reference, update) {
        tracing::warn!(reference, error = %err, "Failed to update checkout intent");
    }
}
