/// Utility helpers shared by all connectors.
///
/// IMPORTANT:
/// - No exchange-specific business logic should live here.
/// - This module must remain lightweight and deterministic
///   (apart from the clock helpers).
///
use serde::Deserialize;

/// A numeric field as vendors actually send it.
///
/// Exchanges mix JSON numbers and decimal strings, sometimes for the same
/// field across channels ("50000.5" vs 50000.5). Connectors deserialize
/// into this and coerce to `f64` at the boundary.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    /// Finite `f64` value, or `None` for unparsable text, NaN and infinities.
    pub fn to_f64(&self) -> Option<f64> {
        let v = match self {
            Number::Float(f) => *f,
            Number::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        v.is_finite().then_some(v)
    }

    /// Like [`Number::to_f64`], additionally rejecting negative values.
    ///
    /// Used for prices, amounts and volumes.
    pub fn to_non_negative(&self) -> Option<f64> {
        self.to_f64().filter(|v| *v >= 0.0)
    }
}

/// Optional vendor number with the "missing means 0" convention used for
/// ticker fields.
pub fn or_zero(n: Option<&Number>) -> f64 {
    n.and_then(Number::to_f64).unwrap_or(0.0)
}

/// Integer timestamp that may arrive as a number or a decimal string.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Timestamp {
    Int(i64),
    Text(String),
}

impl Timestamp {
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Timestamp::Int(i) => Some(*i),
            Timestamp::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current Unix timestamp in microseconds.
///
/// Delta Exchange stamps its messages in microseconds; this is the
/// fallback when a frame carries no timestamp.
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
