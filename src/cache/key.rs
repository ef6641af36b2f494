//! Canonical cache keys
//!
//! A key is `<operation>:<json>` where the JSON object holds every
//! parameter, defaults included, with keys sorted. Construction order never
//! matters and any differing value yields a differing key.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    op: String,
    params: BTreeMap<String, Value>,
}

impl CacheKey {
    /// Start a key for `op`; operation names must not contain `:`
    pub fn new(op: impl Into<String>) -> Self {
        let op = op.into();
        debug_assert!(!op.contains(':'), "operation name contains ':'");
        Self {
            op,
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter; a repeated name replaces the earlier value
    pub fn param(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.params.insert(name.into(), value);
        self
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Split an encoded key back into operation and parameters
    pub fn decode(encoded: &str) -> Option<(String, serde_json::Map<String, Value>)> {
        let (op, payload) = encoded.split_once(':')?;
        match serde_json::from_str::<Value>(payload).ok()? {
            Value::Object(params) => Some((op.to_string(), params)),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = serde_json::to_string(&self.params).map_err(|_| fmt::Error)?;
        write!(f, "{}:{}", self.op, payload)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_independent() {
        let a = CacheKey::new("day")
            .param("kind", "repository")
            .param("date", "2025-01-01")
            .param("language", Option::<String>::None);
        let b = CacheKey::new("day")
            .param("language", Option::<String>::None)
            .param("date", "2025-01-01")
            .param("kind", "repository");

        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(
            a.to_string(),
            r#"day:{"date":"2025-01-01","kind":"repository","language":null}"#
        );
    }

    #[test]
    fn test_distinct_values_distinct_keys() {
        let base = || CacheKey::new("day").param("kind", "repository");
        assert_ne!(
            base().param("date", "2025-01-01").to_string(),
            base().param("date", "2025-01-02").to_string()
        );
        assert_ne!(
            CacheKey::new("top_streaks").param("limit", 10).to_string(),
            CacheKey::new("top_newcomers").param("limit", 10).to_string()
        );
        // A string that looks like a number is not the number
        assert_ne!(
            base().param("limit", 10).to_string(),
            base().param("limit", "10").to_string()
        );
    }

    #[test]
    fn test_decode() {
        let key = CacheKey::new("day").param("date", "2025-01-01").to_string();
        let (op, params) = CacheKey::decode(&key).unwrap();
        assert_eq!(op, "day");
        assert_eq!(params["date"], "2025-01-01");
        assert!(CacheKey::decode("no-separator").is_none());
    }
}
