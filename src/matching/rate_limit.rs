// src/matching/rate_limit.rs - Contact rate limiting per patient

/// Max distinct therapists one patient may initiate contact with per rolling
/// 24-hour window.
pub const DAILY_CONTACT_LIMIT: i64 = 3;

/// Outcome of a rate-limit check, echoing the count it was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactRateDecision {
    pub allowed: bool,
    pub count: i64,
}

/// Pure predicate over the caller-supplied 24h count. The count itself comes
/// from a time-windowed store query; this function performs no I/O. Slight
/// race windows around the boundary are an accepted risk of the windowed
/// read.
pub fn check_contact_allowed(recent_count: i64) -> ContactRateDecision {
    check_contact_allowed_with_limit(recent_count, DAILY_CONTACT_LIMIT)
}

/// Same predicate with a configurable limit.
pub fn check_contact_allowed_with_limit(recent_count: i64, limit: i64) -> ContactRateDecision {
    ContactRateDecision {
        allowed: recent_count < limit,
        count: recent_count,
    }
}
