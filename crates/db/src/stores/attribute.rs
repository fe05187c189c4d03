//! Typed attribute values for key-value items.
//!
//! Numbers are arbitrary-precision decimals and timestamps are first-class,
//! neither of which JSON can carry natively. [`AttributeValue::to_json`] is the
//! lossy-but-total conversion used whenever an item is shown to the model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::StoreError;

pub const PARTITION_KEY: &str = "PK";
pub const SORT_KEY: &str = "SK";

pub type Item = BTreeMap<String, AttributeValue>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(Decimal),
    Bool(bool),
    Null,
    Timestamp(DateTime<Utc>),
    L(Vec<AttributeValue>),
    M(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::N(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            Self::M(values) => Some(values),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::S(value) => Value::String(value.clone()),
            Self::N(value) => decimal_to_json(value),
            Self::Bool(value) => Value::Bool(*value),
            Self::Null => Value::Null,
            Self::Timestamp(value) => Value::String(value.to_rfc3339()),
            Self::L(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            Self::M(values) => Value::Object(
                values.iter().map(|(key, value)| (key.clone(), value.to_json())).collect(),
            ),
        }
    }

    /// Converts plain JSON into attributes; every JSON number becomes a decimal.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => json_number_to_attribute(number),
            Value::String(text) => Self::S(text.clone()),
            Value::Array(values) => Self::L(values.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::M(
                map.iter().map(|(key, value)| (key.clone(), Self::from_json(value))).collect(),
            ),
        }
    }
}

pub fn item_to_json(item: &Item) -> Value {
    Value::Object(item.iter().map(|(key, value)| (key.clone(), value.to_json())).collect())
}

/// Extracts the `(PK, SK)` pair an item is stored under.
pub fn item_key(item: &Item) -> Result<(String, String), StoreError> {
    let pk = item
        .get(PARTITION_KEY)
        .and_then(AttributeValue::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| StoreError::InvalidKey("item is missing a string `PK`".to_string()))?;
    let sk = item
        .get(SORT_KEY)
        .and_then(AttributeValue::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| StoreError::InvalidKey("item is missing a string `SK`".to_string()))?;
    Ok((pk.to_string(), sk.to_string()))
}

fn decimal_to_json(value: &Decimal) -> Value {
    if value.fract().is_zero() {
        if let Some(integer) = value.to_i64() {
            return Value::Number(integer.into());
        }
    }

    value
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.normalize().to_string()))
}

fn json_number_to_attribute(number: &Number) -> AttributeValue {
    let raw = number.to_string();
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&raw))
        .map(AttributeValue::N)
        .unwrap_or(AttributeValue::S(raw))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{item_key, item_to_json, AttributeValue, Item, PARTITION_KEY, SORT_KEY};

    #[test]
    fn decimals_and_timestamps_convert_to_plain_json() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("timestamp");
        let mut item = Item::new();
        item.insert("count".to_string(), AttributeValue::N(Decimal::new(42, 0)));
        item.insert("cost".to_string(), AttributeValue::N(Decimal::new(1_234_567, 2)));
        item.insert("created_at".to_string(), AttributeValue::Timestamp(at));
        item.insert("tags".to_string(), AttributeValue::L(vec![AttributeValue::string("lab")]));

        let json = item_to_json(&item);

        assert_eq!(json["count"], json!(42));
        assert_eq!(json["cost"], json!(12345.67));
        assert_eq!(json["created_at"], json!("2026-01-02T03:04:05+00:00"));
        assert_eq!(json["tags"], json!(["lab"]));
    }

    #[test]
    fn integral_decimal_beyond_i64_is_still_serializable() {
        let huge = Decimal::from_i128_with_scale(99_999_999_999_999_999_999_999_999, 0);
        let json = AttributeValue::N(huge).to_json();
        assert!(json.is_number() || json.is_string());
        assert!(serde_json::to_string(&json).is_ok());
    }

    #[test]
    fn json_numbers_become_decimals() {
        let value = AttributeValue::from_json(&json!({"estimated_cost": 15000.5, "qty": 2}));
        let map = value.as_map().expect("map");

        assert_eq!(map["estimated_cost"].as_decimal(), Some(Decimal::new(150_005, 1)));
        assert_eq!(map["qty"].as_decimal(), Some(Decimal::new(2, 0)));
    }

    #[test]
    fn item_key_requires_string_partition_and_sort_keys() {
        let mut item = BTreeMap::new();
        item.insert(PARTITION_KEY.to_string(), AttributeValue::string("INTAKE#t"));
        assert!(item_key(&item).is_err());

        item.insert(SORT_KEY.to_string(), AttributeValue::string("INTAKE#1"));
        assert_eq!(
            item_key(&item).expect("key"),
            ("INTAKE#t".to_string(), "INTAKE#1".to_string())
        );
    }

    #[test]
    fn storage_encoding_round_trips_exact_decimals() {
        let original = AttributeValue::N(Decimal::new(1_000_000_000_000_000_001, 3));
        let encoded = serde_json::to_string(&original).expect("encode");
        let decoded: AttributeValue = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, original);
    }
}
