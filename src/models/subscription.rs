use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Authorized,
    Paused,
    Cancelled,
}

/// Processor-backed subscription, keyed by the processor's preapproval id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub status: SubscriptionStatus,
    pub payer_email: Option<String>,
    /// Processor-hosted page where the payer manages the subscription.
    pub management_url: Option<String>,
    pub last_payment_id: Option<String>,
    pub last_payment_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Append-only record of free-text survey feedback left at cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationFeedback {
    pub id: String,
    pub user_id: String,
    pub subscription_id: String,
    pub feedback: String,
    pub created_at: i64,
}
