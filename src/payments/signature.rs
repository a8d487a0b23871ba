//! Webhook signature verification.
//!
//! Two schemes, selected by which header the processor sent. The structured
//! scheme (`x-signature`) wins when both are present. A request carrying
//! neither header is rejected outright.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const STRUCTURED_HEADER: &str = "x-signature";
const REQUEST_ID_HEADER: &str = "x-request-id";
const LEGACY_HEADERS: [&str; 2] = ["x-hmac-signature", "x-mercadopago-signature"];

/// Verify an inbound webhook against the shared secret.
///
/// `data_id` is the event payload's nested `data.id`, required by the
/// structured scheme's canonical string. Any missing input under that scheme
/// is a verification failure, not an internal error.
pub fn verify_webhook_signature(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
    data_id: Option<&str>,
) -> Result<()> {
    if let Some(value) = header_str(headers, STRUCTURED_HEADER) {
        return verify_structured(secret, value, headers, data_id);
    }

    for name in LEGACY_HEADERS {
        if let Some(value) = header_str(headers, name) {
            return verify_legacy(secret, value, body);
        }
    }

    Err(AppError::AuthenticationFailure(
        "Missing webhook signature header".into(),
    ))
}

/// Legacy scheme: `hex(HMAC_SHA256(secret, raw_body))` in a single header.
fn verify_legacy(secret: &str, provided: &str, body: &[u8]) -> Result<()> {
    let expected = hmac_hex(secret, body)?;
    if constant_time_eq(provided, &expected) {
        Ok(())
    } else {
        Err(AppError::AuthenticationFailure(
            "Webhook signature mismatch".into(),
        ))
    }
}

/// Structured scheme: the header is a comma-separated `key=value` list
/// carrying `ts` and `v1`; the signed message is a canonical template over
/// the data id, the request id header, and the timestamp.
fn verify_structured(
    secret: &str,
    header_value: &str,
    headers: &HeaderMap,
    data_id: Option<&str>,
) -> Result<()> {
    let (mut ts, mut v1) = (None, None);
    for part in header_value.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim().to_string()),
            Some(("v1", value)) => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let (Some(ts), Some(v1)) = (ts, v1) else {
        return Err(AppError::AuthenticationFailure(
            "Signature header missing ts or v1".into(),
        ));
    };
    let Some(request_id) = header_str(headers, REQUEST_ID_HEADER) else {
        return Err(AppError::AuthenticationFailure(
            "Missing x-request-id header".into(),
        ));
    };
    let Some(data_id) = data_id else {
        return Err(AppError::AuthenticationFailure(
            "Event payload has no data id".into(),
        ));
    };

    let canonical = format!("id:{};request-id:{};ts:{};", data_id, request_id, ts);
    let expected = hmac_hex(secret, canonical.as_bytes())?;
    if constant_time_eq(&v1, &expected) {
        Ok(())
    } else {
        Err(AppError::AuthenticationFailure(
            "Webhook signature mismatch".into(),
        ))
    }
}

fn hmac_hex(secret: &str, message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison. A length mismatch returns false
/// immediately; equal lengths are compared without short-circuiting.
fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_test";

    fn headers_with(pairs: &[(&str, String)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn legacy_scheme_accepts_valid_signature() {
        let body = br#"{"type":"payment","data":{"id":"77"}}"#;
        let sig = hmac_hex(SECRET, body).unwrap();
        let headers = headers_with(&[("x-hmac-signature", sig)]);
        assert!(verify_webhook_signature(SECRET, &headers, body, Some("77")).is_ok());
    }

    #[test]
    fn legacy_scheme_rejects_tampered_body() {
        let body = br#"{"type":"payment","data":{"id":"77"}}"#;
        let sig = hmac_hex(SECRET, body).unwrap();
        let headers = headers_with(&[("x-mercadopago-signature", sig)]);
        let tampered = br#"{"type":"payment","data":{"id":"78"}}"#;
        assert!(verify_webhook_signature(SECRET, &headers, tampered, Some("78")).is_err());
    }

    #[test]
    fn structured_scheme_accepts_valid_signature() {
        let canonical = "id:77;request-id:req-1;ts:1700000000;";
        let v1 = hmac_hex(SECRET, canonical.as_bytes()).unwrap();
        let headers = headers_with(&[
            ("x-signature", format!("ts=1700000000,v1={}", v1)),
            ("x-request-id", "req-1".to_string()),
        ]);
        assert!(verify_webhook_signature(SECRET, &headers, b"{}", Some("77")).is_ok());
    }

    #[test]
    fn structured_scheme_takes_priority_over_legacy() {
        // Valid legacy signature, garbage structured one: must fail.
        let body = br#"{"data":{"id":"77"}}"#;
        let legacy = hmac_hex(SECRET, body).unwrap();
        let headers = headers_with(&[
            ("x-hmac-signature", legacy),
            ("x-signature", "ts=1,v1=deadbeef".to_string()),
            ("x-request-id", "req-1".to_string()),
        ]);
        assert!(verify_webhook_signature(SECRET, &headers, body, Some("77")).is_err());
    }

    #[test]
    fn structured_scheme_fails_on_missing_inputs() {
        let canonical = "id:77;request-id:req-1;ts:1700000000;";
        let v1 = hmac_hex(SECRET, canonical.as_bytes()).unwrap();

        // No x-request-id header
        let headers = headers_with(&[("x-signature", format!("ts=1700000000,v1={}", v1))]);
        assert!(verify_webhook_signature(SECRET, &headers, b"{}", Some("77")).is_err());

        // No data id
        let headers = headers_with(&[
            ("x-signature", format!("ts=1700000000,v1={}", v1)),
            ("x-request-id", "req-1".to_string()),
        ]);
        assert!(verify_webhook_signature(SECRET, &headers, b"{}", None).is_err());

        // No ts key
        let headers = headers_with(&[
            ("x-signature", format!("v1={}", v1)),
            ("x-request-id", "req-1".to_string()),
        ]);
        assert!(verify_webhook_signature(SECRET, &headers, b"{}", Some("77")).is_err());
    }

    #[test]
    fn missing_all_signature_headers_is_rejected() {
        let headers = HeaderMap::new();
        assert!(verify_webhook_signature(SECRET, &headers, b"{}", Some("77")).is_err());
    }
}
