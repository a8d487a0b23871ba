use serde::{Deserialize, Serialize};

/// Ledger statuses with special meaning. Anything else stored in
/// `ProcessedPayment.status` is the processor's raw status echoed back
/// ("rejected", "cancelled", ...).
pub mod ledger_status {
    /// Non-terminal marker written before the authoritative fetch.
    pub const PROCESSING: &str = "processing";
    /// Terminal: entitlement granted or renewed.
    pub const APPROVED: &str = "approved";
    /// Terminal: user already owned the course, nothing granted.
    pub const ALREADY_OWNED: &str = "already_owned";
    /// Terminal: a non-retryable failure was recorded.
    pub const ERROR: &str = "error";
}

/// Durable idempotency record, keyed by processor payment id.
///
/// At most one record per payment id ever reaches `approved`; that write
/// happens inside the same transaction as the entitlement mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedPayment {
    pub payment_id: String,
    pub status: String,
    pub user_id: Option<String>,
    pub course_id: Option<String>,
    pub is_subscription: bool,
    pub is_renewal: bool,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProcessedPayment {
    pub fn is_terminal(&self) -> bool {
        self.status != ledger_status::PROCESSING
    }
}

/// Normalized payment details fetched from the processor API.
///
/// `payments/{id}` and `authorized_payments/{id}` responses both collapse
/// into this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    pub id: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub subscription_id: Option<String>,
    pub transaction_amount: f64,
    pub currency_id: Option<String>,
    pub date_approved: Option<String>,
}

impl PaymentData {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }

    /// Still settling on the processor side (asynchronous payment methods).
    /// An `updated` event will follow with the final status.
    pub fn is_in_flight(&self) -> bool {
        self.status == "pending" || self.status == "in_process"
    }
}
