//! Remote record representations

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identity::RecordIdentity;
use super::share::ShareHandle;
use super::zone::ZoneId;

/// A local row: column name to value
pub type Row = BTreeMap<String, Value>;

/// Opaque remote version of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeTag(String);

impl ChangeTag {
    /// Wrap a tag issued by the remote store
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Raw tag
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity-only snapshot used as the optimistic-concurrency header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFields {
    /// Record identity
    pub identity: RecordIdentity,
    /// Zone the record lives in
    pub zone: ZoneId,
    /// Remote version; `None` until the record has been saved once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_tag: Option<ChangeTag>,
    /// Parent record in the remote hierarchy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordIdentity>,
}

impl SystemFields {
    /// System fields of a record that has never been saved
    pub fn unsaved(identity: RecordIdentity, zone: ZoneId, parent: Option<RecordIdentity>) -> Self {
        Self {
            identity,
            zone,
            change_tag: None,
            parent,
        }
    }
}

/// A field value with the logical time it was last written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    /// Value
    pub value: Value,
    /// Logical clock of the last write; absent on legacy records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<u64>,
}

impl FieldValue {
    /// A value stamped with a logical time
    pub fn stamped(value: Value, modified_at: u64) -> Self {
        Self {
            value,
            modified_at: Some(modified_at),
        }
    }

    /// A value without a logical time
    pub fn unstamped(value: Value) -> Self {
        Self {
            value,
            modified_at: None,
        }
    }
}

/// Full-field snapshot of a remote record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// System fields
    pub system: SystemFields,
    /// Every field the remote holds, including ones unknown to the local schema
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    /// Share attached to this record (root records only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareHandle>,
}

impl RemoteRecord {
    /// An empty, never-saved record
    pub fn new(identity: RecordIdentity, zone: ZoneId) -> Self {
        Self {
            system: SystemFields::unsaved(identity, zone, None),
            fields: BTreeMap::new(),
            share: None,
        }
    }

    /// Builder: set the parent
    pub fn with_parent(mut self, parent: RecordIdentity) -> Self {
        self.system.parent = Some(parent);
        self
    }

    /// Builder: set a stamped field
    pub fn with_field(mut self, column: impl Into<String>, value: Value, modified_at: u64) -> Self {
        self.fields.insert(column.into(), FieldValue::stamped(value, modified_at));
        self
    }

    /// Record identity
    pub fn identity(&self) -> &RecordIdentity {
        &self.system.identity
    }

    /// Table the record belongs to
    pub fn table(&self) -> &str {
        self.system.identity.table()
    }

    /// Parent record, if any
    pub fn parent(&self) -> Option<&RecordIdentity> {
        self.system.parent.as_ref()
    }

    /// Value of a field
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.fields.get(column).map(|f| &f.value)
    }

    /// Logical clock of a field
    pub fn field_clock(&self, column: &str) -> Option<u64> {
        self.fields.get(column).and_then(|f| f.modified_at)
    }

    /// Largest field clock, zero when no field carries one
    pub fn max_field_clock(&self) -> u64 {
        self.fields
            .values()
            .filter_map(|f| f.modified_at)
            .max()
            .unwrap_or(0)
    }

    /// Set a field
    pub fn set_field(&mut self, column: impl Into<String>, field: FieldValue) {
        self.fields.insert(column.into(), field);
    }

    /// Copy of the system fields
    pub fn system_fields(&self) -> SystemFields {
        self.system.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RemoteRecord {
        RemoteRecord::new(RecordIdentity::new("reminders", "1"), ZoneId::default_zone())
            .with_field("title", json!("milk"), 12)
            .with_field("done", json!(false), 30)
    }

    #[test]
    fn test_max_field_clock() {
        assert_eq!(sample().max_field_clock(), 30);
    }

    #[test]
    fn test_unstamped_fields_do_not_count() {
        let mut record = RemoteRecord::new(RecordIdentity::new("reminders", "1"), ZoneId::default_zone());
        record.set_field("title", FieldValue::unstamped(json!("legacy")));
        assert_eq!(record.max_field_clock(), 0);
        assert_eq!(record.field_clock("title"), None);
        assert_eq!(record.value("title"), Some(&json!("legacy")));
    }

    #[test]
    fn test_new_record_has_no_change_tag() {
        assert!(sample().system.change_tag.is_none());
    }
}
