//! Tolerant decimal handling for values that arrive from browser-era JSON.
//!
//! Stored selections and remote rows carry prices as JSON numbers, numeric
//! strings, `null`, or garbage. Anything that does not parse as a decimal is
//! read as absent so that pricing treats it as zero instead of failing the
//! whole document.

use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(raw) => parse_decimal(raw.trim()),
        _ => None,
    }
}

pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw)).ok()
}

/// Rounds a money amount to kopecks.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Writes a JSON number when `f64` carries the amount exactly, otherwise the
/// decimal string, which [`decimal_from_json`] reads back unchanged.
fn serialize_exact<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value.to_f64() {
        Some(number) if Decimal::from_f64(number).is_some_and(|back| back == *value) => {
            serializer.serialize_f64(number)
        }
        _ => serializer.serialize_str(&value.normalize().to_string()),
    }
}

/// `#[serde(with = "lenient")]` for `Option<Decimal>` fields.
pub mod lenient {
    use super::*;

    pub fn serialize<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(decimal) => serialize_exact(decimal, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(decimal_from_json))
    }
}

/// `#[serde(with = "number")]` for required `Decimal` fields; unreadable
/// input becomes zero.
pub mod number {
    use super::*;

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_exact(value, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(decimal_from_json).unwrap_or(Decimal::ZERO))
    }
}
