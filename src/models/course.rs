use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    /// Access window label: "monthly", "3-month", "6-month", "yearly".
    /// Missing means the course cannot be sold.
    pub access_duration: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourse {
    pub title: String,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub access_duration: Option<String>,
}
