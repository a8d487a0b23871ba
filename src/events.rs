//! Webhook event classification.
//!
//! The processor declares the event shape through the `type` and `action`
//! string fields. Classification happens exactly once at ingestion into a
//! closed enum; everything downstream dispatches on it with an exhaustive
//! match, so handling a new event type is a compile-time decision.

use serde::Deserialize;

/// Raw webhook body: `{type, action, data: {id}}`.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub action: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub id: Option<String>,
}

impl WebhookBody {
    pub fn data_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A plain one-time payment. `is_update` distinguishes the processor's
    /// `payment.updated` redelivery from the initial `payment.created`.
    Payment { payment_id: String, is_update: bool },
    /// A recurring charge made under an authorized subscription.
    SubscriptionAuthorizedPayment { payment_id: String },
    /// A subscription (preapproval) lifecycle change.
    SubscriptionPreapproval { preapproval_id: String },
    /// Anything else. Acknowledged and ignored.
    Unknown { event_type: String },
}

impl WebhookEvent {
    pub fn classify(body: &WebhookBody) -> Self {
        let event_type = body.event_type.as_deref().unwrap_or_default();
        let data_id = body.data_id().unwrap_or_default().to_string();

        match event_type {
            "payment" if !data_id.is_empty() => WebhookEvent::Payment {
                payment_id: data_id,
                is_update: body.action.as_deref() == Some("payment.updated"),
            },
            "subscription_authorized_payment" if !data_id.is_empty() => {
                WebhookEvent::SubscriptionAuthorizedPayment { payment_id: data_id }
            }
            "subscription_preapproval" if !data_id.is_empty() => {
                WebhookEvent::SubscriptionPreapproval { preapproval_id: data_id }
            }
            _ => WebhookEvent::Unknown {
                event_type: event_type.to_string(),
            },
        }
    }
}
