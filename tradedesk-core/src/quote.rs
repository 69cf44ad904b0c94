//! Price tick payloads

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Latest quote for a symbol, as pushed on a `price` frame
///
/// Price fields are kept exactly as the server sent them. A field that is
/// not a decimal still lands in the book; the `*_decimal` accessors return
/// `None` for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    #[serde(deserialize_with = "wire_text")]
    pub bid: String,
    #[serde(deserialize_with = "wire_text")]
    pub ask: String,
    #[serde(deserialize_with = "wire_text")]
    pub mid: String,
    #[serde(deserialize_with = "wire_text")]
    pub spread: String,
    /// Server timestamp, passed through verbatim
    #[serde(deserialize_with = "wire_text")]
    pub timestamp: String,
}

impl PriceQuote {
    pub fn bid_decimal(&self) -> Option<Decimal> {
        parse_decimal(&self.bid)
    }

    pub fn ask_decimal(&self) -> Option<Decimal> {
        parse_decimal(&self.ask)
    }

    pub fn mid_decimal(&self) -> Option<Decimal> {
        parse_decimal(&self.mid)
    }

    pub fn spread_decimal(&self) -> Option<Decimal> {
        parse_decimal(&self.spread)
    }

    /// Interpret the timestamp as RFC 3339 or epoch seconds/milliseconds
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Decimal or scientific notation (`1.0850`, `1.2E-5`)
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

/// Accept a string, a bare number or null and keep its text form
fn wire_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    let epoch = raw.parse::<i64>().ok()?;
    if epoch > 10_000_000_000 {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    }
}
