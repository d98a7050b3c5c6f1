//! Metric normalization.
//!
//! Scraped counters arrive as display strings ("1.2K", "3M", "1,024") or,
//! from some producers, as plain numbers. [`normalize`] turns any of them into
//! an integer count and never fails.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalized counters keyed by name (`replies`, `reshares`, `favorites`, `views`, ...).
pub type Metrics = BTreeMap<String, u64>;

/// A counter as delivered by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMetric {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for RawMetric {
    fn from(value: &str) -> Self {
        RawMetric::Text(value.to_string())
    }
}

impl From<i64> for RawMetric {
    fn from(value: i64) -> Self {
        RawMetric::Integer(value)
    }
}

/// Converts a raw counter into an integer.
///
/// Negative and non-finite numbers clamp to 0.
pub fn normalize(raw: Option<&RawMetric>) -> u64 {
    match raw {
        None | Some(RawMetric::Null) => 0,
        Some(RawMetric::Integer(n)) => (*n).max(0) as u64,
        Some(RawMetric::Float(f)) => round_count(*f),
        Some(RawMetric::Text(s)) => normalize_str(s),
    }
}

/// String form of [`normalize`].
///
/// - empty → 0
/// - trailing `k`/`K` → × 1,000, rounded
/// - trailing `m`/`M` → × 1,000,000, rounded
/// - any other non-numeric character is stripped before parsing
/// - unparseable → 0
pub fn normalize_str(raw: &str) -> u64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let multiplier = match trimmed.chars().last() {
        Some('k') | Some('K') => 1_000.0,
        Some('m') | Some('M') => 1_000_000.0,
        _ => 1.0,
    };

    let numeric: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if numeric.is_empty() {
        return 0;
    }

    match numeric.parse::<f64>() {
        Ok(value) => round_count(value * multiplier),
        Err(_) => 0,
    }
}

/// Normalizes every counter of a raw metric map.
pub fn normalize_all(raw: &BTreeMap<String, RawMetric>) -> Metrics {
    raw.iter()
        .map(|(name, value)| (name.clone(), normalize(Some(value))))
        .collect()
}

fn round_count(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    // `as` saturates at u64::MAX
    value.round() as u64
}
