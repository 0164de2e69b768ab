//! Pure reductions from score rows to GPA/CPA records.
//!
//! Both aggregators follow a best-effort policy: missing weights or points
//! count as zero and empty denominators yield zero. Nothing here fails;
//! validation happens upstream of the score source.

pub mod cumulative;
pub mod term;

pub use cumulative::{aggregate_cumulative, group_by_subject, resolve_retakes};
pub use term::{TermOutcome, aggregate_terms};

/// Round half away from zero to 2 decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `score + bonus`, never above `cap`.
pub fn cap_bonus(score: f64, bonus: f64, cap: f64) -> f64 {
    (score + bonus).min(cap)
}
