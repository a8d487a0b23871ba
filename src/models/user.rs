use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Every course id the user has ever purchased, in purchase order.
    pub purchased_course_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntitlementStatus {
    Active,
    Expired,
}

/// Course access recorded on the user aggregate, keyed by course id.
///
/// Mutated only inside the entitlement-grant transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: String,
    pub course_id: String,
    pub access_duration: String,
    pub expires_at: i64,
    pub status: EntitlementStatus,
    pub purchased_at: i64,
    /// Cached for display; preserved across renewals.
    pub course_title: String,
    pub completed_tutorials: Vec<String>,
}

impl Entitlement {
    pub fn is_active(&self, now: i64) -> bool {
        self.status == EntitlementStatus::Active && self.expires_at > now
    }
}
