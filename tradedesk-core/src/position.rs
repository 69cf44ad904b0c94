//! Position update payloads

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::quote::parse_decimal;

/// Latest state of one open position
///
/// Only `symbol` is interpreted; every other field the bridge sends is kept
/// as-is so the dashboard can render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub symbol: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PositionUpdate {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Read a numeric field sent either as a JSON number or a decimal string
    pub fn decimal_field(&self, name: &str) -> Option<Decimal> {
        match self.fields.get(name)? {
            Value::String(s) => parse_decimal(s),
            Value::Number(n) => parse_decimal(&n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_extra_fields_preserved() {
        let update: PositionUpdate = serde_json::from_str(
            r#"{"symbol":"US30","volume":0.5,"profit":"-12.40","side":"buy"}"#,
        )
        .unwrap();

        assert_eq!(update.symbol, "US30");
        assert_eq!(update.field("side"), Some(&Value::from("buy")));
        assert_eq!(update.decimal_field("volume"), Some(dec!(0.5)));
        assert_eq!(update.decimal_field("profit"), Some(dec!(-12.40)));
        assert_eq!(update.decimal_field("side"), None);
        assert!(!update.fields.contains_key("symbol"));
    }
}
