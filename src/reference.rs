//! External reference codec.
//!
//! The processor treats the external reference as an uninterpreted token: we
//! encode `(user, course, payment kind)` into it at checkout time and decode
//! it back out of the webhook's payment data. The format is versioned so a
//! future layout change is an explicit compatibility decision - an unknown
//! version tag is an error, never silently coerced.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

pub const REFERENCE_VERSION: &str = "v1";

const DELIMITER: char = '|';

/// The processor rejects external_reference values longer than this.
const MAX_ENCODED_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentKind {
    OneTime,
    Subscription,
}

/// Business context round-tripped through the payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    pub version: String,
    pub user_id: String,
    pub course_id: String,
    pub kind: PaymentKind,
}

/// Encode a reference in the current version's layout.
pub fn encode(user_id: &str, course_id: &str, kind: PaymentKind) -> Result<String> {
    if user_id.contains(DELIMITER) || course_id.contains(DELIMITER) {
        return Err(AppError::BadRequest(format!(
            "Ids must not contain the '{}' delimiter",
            DELIMITER
        )));
    }

    let encoded = format!(
        "{}{d}{}{d}{}{d}{}",
        REFERENCE_VERSION,
        user_id,
        course_id,
        kind.as_ref(),
        d = DELIMITER
    );

    if encoded.len() > MAX_ENCODED_LEN {
        return Err(AppError::BadRequest(format!(
            "Encoded reference exceeds {} characters",
            MAX_ENCODED_LEN
        )));
    }

    Ok(encoded)
}

/// Decode a reference produced by [`encode`]. Pure and total: anything this
/// module did not produce is a `MalformedReference` error.
pub fn decode(raw: &str) -> Result<ExternalReference> {
    let parts: Vec<&str> = raw.split(DELIMITER).collect();
    if parts.len() != 4 {
        return Err(AppError::MalformedReference(format!(
            "Expected 4 parts, got {}",
            parts.len()
        )));
    }

    let version = parts[0];
    if version != REFERENCE_VERSION {
        return Err(AppError::MalformedReference(format!(
            "Unknown reference version '{}'",
            version
        )));
    }

    let kind: PaymentKind = parts[3].parse().map_err(|_| {
        AppError::MalformedReference(format!("Unknown payment kind '{}'", parts[3]))
    })?;

    Ok(ExternalReference {
        version: version.to_string(),
        user_id: parts[1].to_string(),
        course_id: parts[2].to_string(),
        kind,
    })
}
