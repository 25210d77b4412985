//! Raw transaction input as delivered by a form, API call or batch file

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field name carrying the caller's transaction identifier, if any.
pub const TRANSACTION_ID_FIELD: &str = "transaction_id";

/// A single loosely-typed field value.
///
/// Deserialized from plain JSON: `null`, booleans, numbers and strings.
/// Strings stay text exactly as sent; date parsing happens per column during
/// reconciliation. Objects and arrays are kept as `Other` so an unused nested
/// field never breaks decoding of the whole input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Built programmatically; JSON strings always decode as `Text`
    Timestamp(DateTime<Utc>),
    Other(serde_json::Value),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("null"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Number(n) => write!(f, "{n}"),
            RawValue::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            RawValue::Text(s) => write!(f, "{s:?}"),
            RawValue::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(value: DateTime<Utc>) -> Self {
        RawValue::Timestamp(value)
    }
}

/// Flat mapping of field name to value with no completeness guarantee.
///
/// Created per request and consumed once by the pipeline. Extra fields are
/// allowed and ignored by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTransactionInput {
    fields: BTreeMap<String, RawValue>,
}

impl RawTransactionInput {
    /// Create an empty input
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Look up a field. Explicit `null` reads as absent.
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Caller-supplied transaction identifier, when present as text or number.
    pub fn transaction_id(&self) -> Option<String> {
        match self.get(TRANSACTION_ID_FIELD)? {
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawTransactionInput {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_mixed_values() {
        let json = r#"{
            "amount": 250.0,
            "city_pop": 500000,
            "category": "grocery_pos",
            "zip": "10001",
            "is_online": true,
            "timestamp": "2024-03-01T12:30:00Z",
            "merchant": null
        }"#;

        let raw: RawTransactionInput = serde_json::from_str(json).unwrap();

        assert_eq!(raw.get("amount"), Some(&RawValue::Number(250.0)));
        assert_eq!(raw.get("city_pop"), Some(&RawValue::Number(500000.0)));
        assert_eq!(raw.get("category"), Some(&RawValue::from("grocery_pos")));
        assert_eq!(raw.get("zip"), Some(&RawValue::from("10001")));
        assert_eq!(raw.get("is_online"), Some(&RawValue::Bool(true)));
        assert_eq!(
            raw.get("timestamp"),
            Some(&RawValue::from("2024-03-01T12:30:00Z"))
        );
        assert_eq!(raw.get("merchant"), None);
        assert_eq!(raw.len(), 7);
    }

    #[test]
    fn test_nested_values_are_kept_as_other() {
        let raw: RawTransactionInput = serde_json::from_str(
            r#"{"amount": 10.0, "meta": {"source": "web"}, "tags": ["a", "b"]}"#,
        )
        .unwrap();

        assert_eq!(raw.get("amount"), Some(&RawValue::Number(10.0)));
        assert!(matches!(raw.get("meta"), Some(RawValue::Other(_))));
        assert_eq!(raw.get("tags").unwrap().to_string(), r#"["a","b"]"#);
    }

    #[test]
    fn test_transaction_id() {
        let raw = RawTransactionInput::new().with(TRANSACTION_ID_FIELD, "tx_1");
        assert_eq!(raw.transaction_id().as_deref(), Some("tx_1"));
        assert_eq!(RawTransactionInput::new().transaction_id(), None);
    }

    #[test]
    fn test_display_quotes_text() {
        assert_eq!(RawValue::from("abc").to_string(), "\"abc\"");
        assert_eq!(RawValue::Number(1.5).to_string(), "1.5");
    }
}
