use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior, params, types::Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;
use crate::reference::PaymentKind;
use crate::util::{initial_expiry, renewal_expiry};

use super::from_row::{
    CANCELLATION_FEEDBACK_COLS, COURSE_COLS, ENTITLEMENT_COLS, INTENT_COLS,
    PROCESSED_PAYMENT_COLS, SUBSCRIPTION_COLS, USER_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn to_json(list: &[String]) -> Result<String> {
    serde_json::to_string(list).map_err(|e| AppError::Internal(format!("JSON encode error: {}", e)))
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query.
struct UpdateBuilder {
    table: &'static str,
    key_column: &'static str,
    key: String,
    /// Extra predicate ANDed onto the key match.
    guard: Option<&'static str>,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, key_column: &'static str, key: &str) -> Self {
        Self {
            table,
            key_column,
            key: key.to_string(),
            guard: None,
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn when(mut self, guard: &'static str) -> Self {
        self.guard = Some(guard);
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.key.into());
        let mut sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table,
            sets.join(", "),
            self.key_column
        );
        if let Some(guard) = self.guard {
            sql.push_str(" AND ");
            sql.push_str(guard);
        }
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO users (id, email, name, purchased_course_ids, created_at, updated_at)
         VALUES (?1, ?2, ?3, '[]', ?4, ?5)",
        params![&id, &input.email, &input.name, now, now],
    )?;

    Ok(User {
        id,
        email: input.email.clone(),
        name: input.name.clone(),
        purchased_course_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        params![id],
    )
}

// ============ Courses ============

pub fn create_course(conn: &Connection, input: &CreateCourse) -> Result<Course> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO courses (id, title, price_cents, currency, access_duration, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &id,
            &input.title,
            input.price_cents,
            &input.currency,
            &input.access_duration,
            now
        ],
    )?;

    Ok(Course {
        id,
        title: input.title.clone(),
        price_cents: input.price_cents,
        currency: input.currency.clone(),
        access_duration: input.access_duration.clone(),
        created_at: now,
    })
}

pub fn get_course_by_id(conn: &Connection, id: &str) -> Result<Option<Course>> {
    query_one(
        conn,
        &format!("SELECT {} FROM courses WHERE id = ?1", COURSE_COLS),
        params![id],
    )
}

// ============ Entitlements ============

pub fn get_entitlement(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<Entitlement>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM user_entitlements WHERE user_id = ?1 AND course_id = ?2",
            ENTITLEMENT_COLS
        ),
        params![user_id, course_id],
    )
}

// ============ Idempotency Ledger ============

/// Outcome of the ledger gate for an inbound payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerGate {
    /// Fresh or previously non-terminal payment; caller owns processing.
    Proceed,
    /// A prior delivery already granted for this payment id.
    AlreadyProcessed,
}

/// First transaction of the webhook flow: claim the payment id.
///
/// Inside one IMMEDIATE transaction: a record already terminally `approved`
/// short-circuits; anything else (absent, `processing`, or a non-approved
/// terminal status being redelivered) is merged to `processing` and the
/// caller proceeds. Concurrent deliveries of the same payment id serialize
/// here, at the transaction layer.
pub fn begin_payment_processing(conn: &mut Connection, payment_id: &str) -> Result<LedgerGate> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<ProcessedPayment> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM processed_payments WHERE payment_id = ?1",
            PROCESSED_PAYMENT_COLS
        ),
        params![payment_id],
    )?;

    match existing {
        Some(record) if record.status == ledger_status::APPROVED => {
            // No writes made - dropping the transaction is enough.
            Ok(LedgerGate::AlreadyProcessed)
        }
        Some(_) => {
            tx.execute(
                "UPDATE processed_payments SET status = ?2, updated_at = ?3 WHERE payment_id = ?1",
                params![payment_id, ledger_status::PROCESSING, now()],
            )?;
            tx.commit()?;
            Ok(LedgerGate::Proceed)
        }
        None => {
            let now = now();
            tx.execute(
                "INSERT INTO processed_payments (payment_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![payment_id, ledger_status::PROCESSING, now],
            )?;
            tx.commit()?;
            Ok(LedgerGate::Proceed)
        }
    }
}

pub fn get_processed_payment(
    conn: &Connection,
    payment_id: &str,
) -> Result<Option<ProcessedPayment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM processed_payments WHERE payment_id = ?1",
            PROCESSED_PAYMENT_COLS
        ),
        params![payment_id],
    )
}

/// Terminal ledger write for payments that did not reach the grant
/// transaction: rejected/failed raw statuses and non-retryable errors.
pub struct PaymentOutcome<'a> {
    pub status: &'a str,
    pub user_id: Option<&'a str>,
    pub course_id: Option<&'a str>,
    pub is_subscription: bool,
    pub error_message: Option<&'a str>,
}

pub fn record_payment_outcome(
    conn: &Connection,
    payment_id: &str,
    outcome: &PaymentOutcome<'_>,
) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO processed_payments
            (payment_id, status, user_id, course_id, is_subscription, is_renewal, error_message,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7)
         ON CONFLICT(payment_id) DO UPDATE SET
            status = excluded.status,
            user_id = COALESCE(excluded.user_id, user_id),
            course_id = COALESCE(excluded.course_id, course_id),
            is_subscription = excluded.is_subscription,
            error_message = excluded.error_message,
            updated_at = excluded.updated_at",
        params![
            payment_id,
            outcome.status,
            outcome.user_id,
            outcome.course_id,
            outcome.is_subscription,
            outcome.error_message,
            now
        ],
    )?;
    Ok(())
}

/// Ensure a payment id left in `processing` ends up with a terminal `error`
/// record. A no-op when another path already wrote a terminal status, so the
/// top-level failure handler can call this unconditionally.
pub fn record_payment_error_if_processing(
    conn: &Connection,
    payment_id: &str,
    message: &str,
) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO processed_payments
            (payment_id, status, error_message, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(payment_id) DO UPDATE SET
            status = excluded.status,
            error_message = excluded.error_message,
            updated_at = excluded.updated_at
         WHERE processed_payments.status = ?5",
        params![
            payment_id,
            ledger_status::ERROR,
            message,
            now,
            ledger_status::PROCESSING
        ],
    )?;
    Ok(())
}

// ============ Entitlement Assignment ============

pub struct GrantParams<'a> {
    pub user_id: &'a str,
    pub course_id: &'a str,
    pub payment_id: &'a str,
    pub kind: PaymentKind,
    pub access_duration: &'a str,
    pub course_title: &'a str,
    pub subscription_id: Option<&'a str>,
    pub payer_email: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Fresh entitlement written.
    Granted { expires_at: i64 },
    /// Existing subscription entitlement extended.
    Renewed { expires_at: i64 },
    /// Active non-subscription entitlement already present; nothing granted.
    AlreadyOwned,
}

/// Atomically grant or renew a course entitlement and close the payment
/// ledger, in one IMMEDIATE transaction.
///
/// The entitlement is re-read inside the transaction; the terminal ledger
/// write happens in the same transaction as the entitlement mutation, so no
/// interleaving can observe an `approved` ledger entry without the matching
/// entitlement, or vice versa.
pub fn grant_entitlement_atomic(
    conn: &mut Connection,
    grant: &GrantParams<'_>,
) -> Result<GrantOutcome> {
    let now = now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<Entitlement> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM user_entitlements WHERE user_id = ?1 AND course_id = ?2",
            ENTITLEMENT_COLS
        ),
        params![grant.user_id, grant.course_id],
    )?;

    let outcome = match existing {
        Some(current) if current.is_active(now) => match grant.kind {
            PaymentKind::Subscription => {
                // Renewal: extend from the later of now and the current
                // expiry; cached display fields are left untouched.
                let expires_at = renewal_expiry(now, current.expires_at, grant.access_duration);
                tx.execute(
                    "UPDATE user_entitlements
                     SET expires_at = ?3, status = ?4, access_duration = ?5
                     WHERE user_id = ?1 AND course_id = ?2",
                    params![
                        grant.user_id,
                        grant.course_id,
                        expires_at,
                        EntitlementStatus::Active.as_ref(),
                        grant.access_duration
                    ],
                )?;

                if let Some(subscription_id) = grant.subscription_id {
                    upsert_subscription_payment(&tx, subscription_id, grant, now)?;
                }

                write_terminal_ledger(
                    &tx,
                    grant,
                    ledger_status::APPROVED,
                    /* is_renewal */ true,
                    now,
                )?;
                GrantOutcome::Renewed { expires_at }
            }
            PaymentKind::OneTime => {
                // Duplicate one-time purchase of an owned course: record it,
                // grant nothing.
                write_terminal_ledger(&tx, grant, ledger_status::ALREADY_OWNED, false, now)?;
                GrantOutcome::AlreadyOwned
            }
        },
        _ => {
            // New purchase (or repurchase after expiry).
            let expires_at = initial_expiry(now, grant.access_duration);
            tx.execute(
                "INSERT INTO user_entitlements
                    (user_id, course_id, access_duration, expires_at, status, purchased_at,
                     course_title, completed_tutorials)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]')
                 ON CONFLICT(user_id, course_id) DO UPDATE SET
                    access_duration = excluded.access_duration,
                    expires_at = excluded.expires_at,
                    status = excluded.status,
                    purchased_at = excluded.purchased_at,
                    course_title = excluded.course_title",
                params![
                    grant.user_id,
                    grant.course_id,
                    grant.access_duration,
                    expires_at,
                    EntitlementStatus::Active.as_ref(),
                    now,
                    grant.course_title
                ],
            )?;

            append_purchased_course(&tx, grant.user_id, grant.course_id, now)?;

            if grant.kind == PaymentKind::Subscription {
                if let Some(subscription_id) = grant.subscription_id {
                    upsert_subscription_payment(&tx, subscription_id, grant, now)?;
                }
            }

            write_terminal_ledger(&tx, grant, ledger_status::APPROVED, false, now)?;
            GrantOutcome::Granted { expires_at }
        }
    };

    tx.commit()?;
    Ok(outcome)
}

fn append_purchased_course(
    tx: &Connection,
    user_id: &str,
    course_id: &str,
    now: i64,
) -> Result<()> {
    let user: Option<User> = query_one(
        tx,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        params![user_id],
    )?;
    let mut user =
        user.ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    if !user.purchased_course_ids.iter().any(|id| id == course_id) {
        user.purchased_course_ids.push(course_id.to_string());
        tx.execute(
            "UPDATE users SET purchased_course_ids = ?2, updated_at = ?3 WHERE id = ?1",
            params![user_id, to_json(&user.purchased_course_ids)?, now],
        )?;
    }
    Ok(())
}

fn upsert_subscription_payment(
    tx: &Connection,
    subscription_id: &str,
    grant: &GrantParams<'_>,
    now: i64,
) -> Result<()> {
    tx.execute(
        "INSERT INTO subscriptions
            (id, user_id, course_id, status, payer_email, last_payment_id, last_payment_at,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            last_payment_id = excluded.last_payment_id,
            last_payment_at = excluded.last_payment_at,
            updated_at = excluded.updated_at",
        params![
            subscription_id,
            grant.user_id,
            grant.course_id,
            SubscriptionStatus::Authorized.as_ref(),
            grant.payer_email,
            grant.payment_id,
            now
        ],
    )?;
    Ok(())
}

fn write_terminal_ledger(
    tx: &Connection,
    grant: &GrantParams<'_>,
    status: &str,
    is_renewal: bool,
    now: i64,
) -> Result<()> {
    tx.execute(
        "INSERT INTO processed_payments
            (payment_id, status, user_id, course_id, is_subscription, is_renewal, created_at,
             updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(payment_id) DO UPDATE SET
            status = excluded.status,
            user_id = excluded.user_id,
            course_id = excluded.course_id,
            is_subscription = excluded.is_subscription,
            is_renewal = excluded.is_renewal,
            updated_at = excluded.updated_at",
        params![
            grant.payment_id,
            status,
            grant.user_id,
            grant.course_id,
            grant.kind == PaymentKind::Subscription,
            is_renewal,
            now
        ],
    )?;
    Ok(())
}

// ============ Checkout Intents ============

pub fn create_checkout_intent(
    conn: &Connection,
    input: &CreateCheckoutIntent,
) -> Result<CheckoutIntent> {
    let now = now();
    conn.execute(
        "INSERT INTO checkout_intents
            (reference, user_id, course_id, status, user_email, user_name, course_title,
             subscription_id, started_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            &input.reference,
            &input.user_id,
            &input.course_id,
            IntentStatus::Pending.as_ref(),
            &input.user_email,
            &input.user_name,
            &input.course_title,
            &input.subscription_id,
            now
        ],
    )?;

    Ok(CheckoutIntent {
        reference: input.reference.clone(),
        user_id: input.user_id.clone(),
        course_id: input.course_id.clone(),
        status: IntentStatus::Pending,
        user_email: input.user_email.clone(),
        user_name: input.user_name.clone(),
        course_title: input.course_title.clone(),
        payment_id: None,
        payment_status: None,
        subscription_id: input.subscription_id.clone(),
        failure_reason: None,
        started_at: now,
        updated_at: now,
    })
}

pub fn get_checkout_intent(conn: &Connection, reference: &str) -> Result<Option<CheckoutIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM checkout_intents WHERE reference = ?1",
            INTENT_COLS
        ),
        params![reference],
    )
}

/// Merge-update a checkout intent. Only pending intents are written - the
/// lifecycle is terminal once non-pending, so a stale event redelivered after
/// completion cannot clobber the recorded outcome.
pub fn update_checkout_intent(
    conn: &Connection,
    reference: &str,
    update: &UpdateCheckoutIntent,
) -> Result<bool> {
    UpdateBuilder::new("checkout_intents", "reference", reference)
        .when("status = 'pending'")
        .with_updated_at()
        .set_opt("status", update.status.map(|s| s.as_ref().to_string()))
        .set_opt("payment_id", update.payment_id.clone())
        .set_opt("payment_status", update.payment_status.clone())
        .set_opt("subscription_id", update.subscription_id.clone())
        .set_opt("failure_reason", update.failure_reason.clone())
        .execute(conn)
}

/// Scheduled sweep: move pending intents started before `cutoff` to
/// abandoned. Returns how many were swept.
pub fn mark_stale_intents_abandoned(conn: &Connection, cutoff: i64) -> Result<usize> {
    let swept = conn.execute(
        "UPDATE checkout_intents SET status = ?1, updated_at = ?2
         WHERE status = ?3 AND started_at < ?4",
        params![
            IntentStatus::Abandoned.as_ref(),
            now(),
            IntentStatus::Pending.as_ref(),
            cutoff
        ],
    )?;
    Ok(swept)
}

// ============ Subscriptions ============

pub fn create_pending_subscription(
    conn: &Connection,
    id: &str,
    user_id: &str,
    course_id: &str,
    payer_email: Option<&str>,
    management_url: Option<&str>,
) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO subscriptions
            (id, user_id, course_id, status, payer_email, management_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(id) DO UPDATE SET
            payer_email = excluded.payer_email,
            management_url = excluded.management_url,
            updated_at = excluded.updated_at",
        params![
            id,
            user_id,
            course_id,
            SubscriptionStatus::Pending.as_ref(),
            payer_email,
            management_url,
            now
        ],
    )?;
    Ok(())
}

pub fn get_subscription(conn: &Connection, id: &str) -> Result<Option<SubscriptionRecord>> {
    query_one(
        conn,
        &format!("SELECT {} FROM subscriptions WHERE id = ?1", SUBSCRIPTION_COLS),
        params![id],
    )
}

pub fn update_subscription_status(
    conn: &Connection,
    id: &str,
    status: SubscriptionStatus,
) -> Result<bool> {
    UpdateBuilder::new("subscriptions", "id", id)
        .with_updated_at()
        .set("status", status.as_ref().to_string())
        .execute(conn)
}

// ============ Cancellation Feedback ============

pub fn record_cancellation_feedback(
    conn: &Connection,
    user_id: &str,
    subscription_id: &str,
    feedback: &str,
) -> Result<CancellationFeedback> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO cancellation_feedback (id, user_id, subscription_id, feedback, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, user_id, subscription_id, feedback, now],
    )?;
    Ok(CancellationFeedback {
        id,
        user_id: user_id.to_string(),
        subscription_id: subscription_id.to_string(),
        feedback: feedback.to_string(),
        created_at: now,
    })
}

pub fn list_cancellation_feedback(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Vec<CancellationFeedback>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM cancellation_feedback WHERE subscription_id = ?1 ORDER BY created_at",
            CANCELLATION_FEEDBACK_COLS
        ),
        params![subscription_id],
    )
}
