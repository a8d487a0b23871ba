use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::PaymentData;

use super::{
    BoxFuture, CheckoutSession, CreatePreapproval, CreatePreference, PaymentEventKind,
    PreapprovalData, ProcessorApi,
};

/// `payments/{id}` response, reduced to the fields we consume.
#[derive(Debug, Deserialize)]
struct PaymentResponse {
    status: String,
    external_reference: Option<String>,
    transaction_amount: Option<f64>,
    currency_id: Option<String>,
    date_approved: Option<String>,
}

/// `authorized_payments/{id}` response. The charge's own status lives on the
/// nested `payment` object when present.
#[derive(Debug, Deserialize)]
struct AuthorizedPaymentResponse {
    status: String,
    preapproval_id: Option<String>,
    external_reference: Option<String>,
    transaction_amount: Option<f64>,
    currency_id: Option<String>,
    date_approved: Option<String>,
    payment: Option<NestedPayment>,
}

#[derive(Debug, Deserialize)]
struct NestedPayment {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreapprovalResponse {
    id: String,
    status: String,
    payer_email: Option<String>,
    external_reference: Option<String>,
    init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: Option<String>,
    init_point: String,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl MercadoPagoClient {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DependencyFailure(format!(
                "Processor API returned {} for {}: {}",
                status, path, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::DependencyFailure(format!("Invalid processor response: {}", e)))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DependencyFailure(format!(
                "Processor API returned {} for {}: {}",
                status, path, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::DependencyFailure(format!("Invalid processor response: {}", e)))
    }
}

impl ProcessorApi for MercadoPagoClient {
    fn fetch_payment<'a>(
        &'a self,
        kind: PaymentEventKind,
        payment_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentData>> {
        Box::pin(async move {
            match kind {
                PaymentEventKind::Payment => {
                    let raw: PaymentResponse =
                        self.get_json(&format!("/v1/payments/{}", payment_id)).await?;
                    Ok(PaymentData {
                        id: payment_id.to_string(),
                        status: raw.status,
                        external_reference: raw.external_reference,
                        subscription_id: None,
                        transaction_amount: raw.transaction_amount.unwrap_or(0.0),
                        currency_id: raw.currency_id,
                        date_approved: raw.date_approved,
                    })
                }
                PaymentEventKind::AuthorizedPayment => {
                    let raw: AuthorizedPaymentResponse = self
                        .get_json(&format!("/v1/authorized_payments/{}", payment_id))
                        .await?;
                    let status = raw
                        .payment
                        .and_then(|p| p.status)
                        .unwrap_or(raw.status);
                    Ok(PaymentData {
                        id: payment_id.to_string(),
                        status,
                        external_reference: raw.external_reference,
                        subscription_id: raw.preapproval_id,
                        transaction_amount: raw.transaction_amount.unwrap_or(0.0),
                        currency_id: raw.currency_id,
                        date_approved: raw.date_approved,
                    })
                }
            }
        })
    }

    fn fetch_preapproval<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<PreapprovalData>> {
        Box::pin(async move {
            let raw: PreapprovalResponse = self.get_json(&format!("/preapproval/{}", id)).await?;
            Ok(PreapprovalData {
                id: raw.id,
                status: raw.status,
                payer_email: raw.payer_email,
                external_reference: raw.external_reference,
                init_point: raw.init_point,
            })
        })
    }

    fn create_preference<'a>(
        &'a self,
        req: &'a CreatePreference,
    ) -> BoxFuture<'a, Result<CheckoutSession>> {
        Box::pin(async move {
            let body = json!({
                "external_reference": req.external_reference,
                "items": [{
                    "title": req.title,
                    "quantity": 1,
                    "unit_price": req.unit_price_cents as f64 / 100.0,
                    "currency_id": req.currency,
                }],
                "back_urls": { "success": req.back_url, "failure": req.back_url },
                "auto_return": "approved",
            });
            let raw: PreferenceResponse = self
                .send_json(reqwest::Method::POST, "/checkout/preferences", &body)
                .await?;
            Ok(CheckoutSession {
                id: raw.id,
                init_point: raw.init_point,
            })
        })
    }

    fn create_preapproval<'a>(
        &'a self,
        req: &'a CreatePreapproval,
    ) -> BoxFuture<'a, Result<CheckoutSession>> {
        Box::pin(async move {
            let body = json!({
                "external_reference": req.external_reference,
                "reason": req.reason,
                "payer_email": req.payer_email,
                "back_url": req.back_url,
                "auto_recurring": {
                    "frequency": 1,
                    "frequency_type": "months",
                    "transaction_amount": req.amount_cents as f64 / 100.0,
                    "currency_id": req.currency,
                },
            });
            let raw: PreapprovalResponse = self
                .send_json(reqwest::Method::POST, "/preapproval", &body)
                .await?;
            Ok(CheckoutSession {
                id: Some(raw.id),
                init_point: raw.init_point.unwrap_or_default(),
            })
        })
    }

    fn update_preapproval_status<'a>(
        &'a self,
        id: &'a str,
        status: &'a str,
    ) -> BoxFuture<'a, Result<PreapprovalData>> {
        Box::pin(async move {
            let body = json!({ "status": status });
            let raw: PreapprovalResponse = self
                .send_json(reqwest::Method::PUT, &format!("/preapproval/{}", id), &body)
                .await?;
            Ok(PreapprovalData {
                id: raw.id,
                status: raw.status,
                payer_email: raw.payer_email,
                external_reference: raw.external_reference,
                init_point: raw.init_point,
            })
        })
    }
}
