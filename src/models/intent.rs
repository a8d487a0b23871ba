use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Completed,
    Failed,
    Abandoned,
    AlreadyOwned,
}

/// Operational lifecycle record of one checkout attempt, keyed by the
/// external reference string. Less authoritative than the payment ledger;
/// writes are merge-only and best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutIntent {
    pub reference: String,
    pub user_id: String,
    pub course_id: String,
    pub status: IntentStatus,
    // Denormalized for operator dashboards
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub course_title: Option<String>,
    pub payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub subscription_id: Option<String>,
    pub failure_reason: Option<String>,
    pub started_at: i64,
    pub updated_at: i64,
}

#[derive(Debug)]
pub struct CreateCheckoutIntent {
    pub reference: String,
    pub user_id: String,
    pub course_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub course_title: Option<String>,
    pub subscription_id: Option<String>,
}

/// Merge-update for an intent; `None` fields are left untouched.
#[derive(Debug, Default)]
pub struct UpdateCheckoutIntent {
    pub status: Option<IntentStatus>,
    pub payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub subscription_id: Option<String>,
    pub failure_reason: Option<String>,
}
