mod mercadopago;
mod signature;

pub use mercadopago::*;
pub use signature::*;

use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::PaymentData;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which processor endpoint resolves a webhook's payment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    /// A plain payment: `payments/{id}`.
    Payment,
    /// A recurring charge under a subscription: `authorized_payments/{id}`.
    AuthorizedPayment,
}

/// Checkout session minted by the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: Option<String>,
    /// URL the buyer is sent to.
    pub init_point: String,
}

/// Normalized preapproval (subscription) state from the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreapprovalData {
    pub id: String,
    pub status: String,
    pub payer_email: Option<String>,
    pub external_reference: Option<String>,
    pub init_point: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePreference {
    pub external_reference: String,
    pub title: String,
    pub unit_price_cents: i64,
    pub currency: String,
    pub back_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatePreapproval {
    pub external_reference: String,
    pub reason: String,
    pub amount_cents: i64,
    pub currency: String,
    pub payer_email: String,
    pub back_url: String,
}

/// The processor API surface the service depends on. The webhook flow and
/// checkout handlers only see this trait, so tests substitute a mock.
pub trait ProcessorApi: Send + Sync {
    fn fetch_payment<'a>(
        &'a self,
        kind: PaymentEventKind,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentData>>;

    fn fetch_preapproval<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<PreapprovalData>>;

    fn create_preference<'a>(
        &'a self,
        req: &'a CreatePreference,
    ) -> BoxFuture<'a, Result<CheckoutSession>>;

    fn create_preapproval<'a>(
        &'a self,
        req: &'a CreatePreapproval,
    ) -> BoxFuture<'a, Result<CheckoutSession>>;

    fn update_preapproval_status<'a>(
        &'a self,
        id: &'a str,
        status: &'a str,
    ) -> BoxFuture<'a, Result<PreapprovalData>>;
}
