//! Row-mapping helpers: one `FromRow` impl and one column-list constant per
//! model, consumed by `query_one`/`query_all` so the SELECT statements in
//! `queries.rs` stay declarative.

use rusqlite::{Connection, Params, Row, types::Type};

use crate::error::Result;
use crate::models::*;

pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub fn query_one<T: FromRow, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

/// Parse a JSON-array TEXT column into a Vec<String>.
fn json_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

/// Parse a TEXT column into a strum-backed enum.
fn parse_enum<T: std::str::FromStr>(idx: usize, raw: String) -> rusqlite::Result<T> {
    raw.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized enum value '{}'", raw).into(),
        )
    })
}

pub const USER_COLS: &str = "id, email, name, purchased_course_ids, created_at, updated_at";

impl FromRow for User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            purchased_course_ids: json_list(row.get(3)?),
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

pub const COURSE_COLS: &str = "id, title, price_cents, currency, access_duration, created_at";

impl FromRow for Course {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Course {
            id: row.get(0)?,
            title: row.get(1)?,
            price_cents: row.get(2)?,
            currency: row.get(3)?,
            access_duration: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

pub const ENTITLEMENT_COLS: &str =
    "user_id, course_id, access_duration, expires_at, status, purchased_at, course_title, \
     completed_tutorials";

impl FromRow for Entitlement {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Entitlement {
            user_id: row.get(0)?,
            course_id: row.get(1)?,
            access_duration: row.get(2)?,
            expires_at: row.get(3)?,
            status: parse_enum(4, row.get(4)?)?,
            purchased_at: row.get(5)?,
            course_title: row.get(6)?,
            completed_tutorials: json_list(row.get(7)?),
        })
    }
}

pub const PROCESSED_PAYMENT_COLS: &str =
    "payment_id, status, user_id, course_id, is_subscription, is_renewal, error_message, \
     created_at, updated_at";

impl FromRow for ProcessedPayment {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ProcessedPayment {
            payment_id: row.get(0)?,
            status: row.get(1)?,
            user_id: row.get(2)?,
            course_id: row.get(3)?,
            is_subscription: row.get(4)?,
            is_renewal: row.get(5)?,
            error_message: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

pub const INTENT_COLS: &str =
    "reference, user_id, course_id, status, user_email, user_name, course_title, payment_id, \
     payment_status, subscription_id, failure_reason, started_at, updated_at";

impl FromRow for CheckoutIntent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CheckoutIntent {
            reference: row.get(0)?,
            user_id: row.get(1)?,
            course_id: row.get(2)?,
            status: parse_enum(3, row.get(3)?)?,
            user_email: row.get(4)?,
            user_name: row.get(5)?,
            course_title: row.get(6)?,
            payment_id: row.get(7)?,
            payment_status: row.get(8)?,
            subscription_id: row.get(9)?,
            failure_reason: row.get(10)?,
            started_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

pub const SUBSCRIPTION_COLS: &str =
    "id, user_id, course_id, status, payer_email, management_url, last_payment_id, \
     last_payment_at, created_at, updated_at";

impl FromRow for SubscriptionRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SubscriptionRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            course_id: row.get(2)?,
            status: parse_enum(3, row.get(3)?)?,
            payer_email: row.get(4)?,
            management_url: row.get(5)?,
            last_payment_id: row.get(6)?,
            last_payment_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

pub const CANCELLATION_FEEDBACK_COLS: &str =
    "id, user_id, subscription_id, feedback, created_at";

impl FromRow for CancellationFeedback {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CancellationFeedback {
            id: row.get(0)?,
            user_id: row.get(1)?,
            subscription_id: row.get(2)?,
            feedback: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
