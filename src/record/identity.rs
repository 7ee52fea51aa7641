//! Record identity
//!
//! The identity of a synchronized row is `(primary key, table name)`. It is
//! rendered as `"<primary key>:<table>"` and that string is both the remote
//! record name and the key of the metadata store. Table names never contain
//! `:` (enforced at setup), so parsing splits at the last separator.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Identity of a synchronized row and of its remote record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordIdentity {
    table: String,
    primary_key: String,
}

impl RecordIdentity {
    /// Create an identity from a table name and a rendered primary key
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
        }
    }

    /// Create an identity from a primary key column value
    ///
    /// Returns `None` when the value cannot be a primary key (null, bool,
    /// arrays, objects).
    pub fn from_value(table: impl Into<String>, value: &Value) -> Option<Self> {
        primary_key_string(value).map(|pk| Self::new(table, pk))
    }

    /// Table the row lives in
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rendered primary key
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Stable record name, `"<primary key>:<table>"`
    pub fn record_name(&self) -> String {
        format!("{}:{}", self.primary_key, self.table)
    }

    /// Parse a record name produced by `record_name`
    pub fn parse(name: &str) -> Result<Self, IdentityParseError> {
        let (pk, table) = name
            .rsplit_once(':')
            .ok_or_else(|| IdentityParseError(name.to_string()))?;
        if pk.is_empty() || table.is_empty() {
            return Err(IdentityParseError(name.to_string()));
        }
        Ok(Self::new(table, pk))
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.primary_key, self.table)
    }
}

impl FromStr for RecordIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RecordIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.record_name())
    }
}

impl<'de> Deserialize<'de> for RecordIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdentityVisitor;

        impl<'de> Visitor<'de> for IdentityVisitor {
            type Value = RecordIdentity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a record name of the form <primary key>:<table>")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RecordIdentity, E> {
                RecordIdentity::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdentityVisitor)
    }
}

/// Malformed record name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed record name '{0}'")]
pub struct IdentityParseError(pub String);

/// Render a primary key column value
///
/// Strings are used verbatim and integers in decimal. Anything else cannot
/// identify a row.
pub fn primary_key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Inverse of `primary_key_string` for rows rebuilt from an identity alone
pub fn primary_key_value(rendered: &str) -> Value {
    match rendered.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(rendered.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_name_round_trip() {
        let id = RecordIdentity::new("reminders", "r-1");
        assert_eq!(id.record_name(), "r-1:reminders");
        assert_eq!(RecordIdentity::parse("r-1:reminders").unwrap(), id);
    }

    #[test]
    fn test_parse_splits_at_last_separator() {
        let id = RecordIdentity::parse("urn:x:1:lists").unwrap();
        assert_eq!(id.table(), "lists");
        assert_eq!(id.primary_key(), "urn:x:1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(RecordIdentity::parse("no-separator").is_err());
        assert!(RecordIdentity::parse(":lists").is_err());
        assert!(RecordIdentity::parse("1:").is_err());
    }

    #[test]
    fn test_primary_key_rendering() {
        assert_eq!(primary_key_string(&json!(42)), Some("42".to_string()));
        assert_eq!(primary_key_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(primary_key_string(&json!(null)), None);
        assert_eq!(primary_key_string(&json!(1.5)), None);
        assert_eq!(primary_key_string(&json!("")), None);
    }

    #[test]
    fn test_primary_key_value_prefers_integers() {
        assert_eq!(primary_key_value("7"), json!(7));
        assert_eq!(primary_key_value("seven"), json!("seven"));
    }

    #[test]
    fn test_identity_serializes_as_string() {
        let id = RecordIdentity::new("lists", "1");
        let encoded = serde_json::to_string(&id).unwrap();
        assert_eq!(encoded, "\"1:lists\"");
        let decoded: RecordIdentity = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, id);
    }
}
