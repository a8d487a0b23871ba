//! Shared helpers for entitlement expiry math.

const SECONDS_PER_DAY: i64 = 86400;

/// Map a course's `access_duration` label to a number of days.
///
/// Unrecognized labels fall back to 30 days. A missing label is a
/// configuration error and is rejected before this table is consulted.
pub fn access_duration_days(duration: &str) -> i64 {
    match duration {
        "monthly" => 30,
        "3-month" => 90,
        "6-month" => 180,
        "yearly" => 365,
        _ => 30,
    }
}

/// Expiry for a fresh entitlement: `now + duration`.
pub fn initial_expiry(now: i64, duration: &str) -> i64 {
    now + access_duration_days(duration) * SECONDS_PER_DAY
}

/// Expiry for a subscription renewal.
///
/// The renewal base is the later of the current expiry and now, so a renewal
/// arriving before the period ends extends from the period end, and one
/// arriving after a lapse extends from now. A late-arriving renewal never
/// shrinks the expiry.
pub fn renewal_expiry(now: i64, current_expires_at: i64, duration: &str) -> i64 {
    let base = now.max(current_expires_at);
    base + access_duration_days(duration) * SECONDS_PER_DAY
}
