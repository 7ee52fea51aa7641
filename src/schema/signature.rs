//! Record type signatures
//!
//! A signature captures the shape of a table as it was when the engine last
//! ran. Comparing the cached signature with the live schema on start tells
//! the reconciler which columns appeared or disappeared. Signatures detect
//! drift only; they never migrate anything themselves.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::TableSchema;

/// Cached description of a table's shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypeSignature {
    /// Table name
    pub table_name: String,
    /// Canonical text of the table definition
    pub schema_text: String,
    /// Column names
    pub column_set: BTreeSet<String>,
}

/// Column-level difference between a cached and a live signature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureDiff {
    /// Columns present now but not before
    pub added: Vec<String>,
    /// Columns present before but not now
    pub removed: Vec<String>,
}

impl SignatureDiff {
    /// Whether the column sets are identical
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl RecordTypeSignature {
    /// Compute the signature of a live schema
    pub fn of(schema: &TableSchema) -> Self {
        let mut text = format!("{}(pk={}", schema.name, schema.primary_key);
        for column in &schema.columns {
            text.push_str(&format!(";{}={}", column.name, column.default));
        }
        for fk in &schema.foreign_keys {
            text.push_str(&format!(
                ";fk {}->{}.{} del={} upd={}",
                fk.child_column,
                fk.parent_table,
                fk.parent_column,
                fk.on_delete.as_str(),
                fk.on_update.as_str()
            ));
        }
        text.push(')');

        Self {
            table_name: schema.name.clone(),
            schema_text: text,
            column_set: schema.column_set(),
        }
    }

    /// Hex SHA-256 of the schema text
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.schema_text.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Columns added and removed going from `self` to `live`
    pub fn diff(&self, live: &RecordTypeSignature) -> SignatureDiff {
        SignatureDiff {
            added: live.column_set.difference(&self.column_set).cloned().collect(),
            removed: self.column_set.difference(&live.column_set).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_schemas_share_fingerprint() {
        let a = RecordTypeSignature::of(&TableSchema::new("lists", "id").column("title"));
        let b = RecordTypeSignature::of(&TableSchema::new("lists", "id").column("title"));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn test_diff_reports_added_and_removed() {
        let before = RecordTypeSignature::of(&TableSchema::new("lists", "id").column("title"));
        let after = RecordTypeSignature::of(
            &TableSchema::new("lists", "id").column_with_default("color", json!("blue")),
        );
        let diff = before.diff(&after);
        assert_eq!(diff.added, vec!["color".to_string()]);
        assert_eq!(diff.removed, vec!["title".to_string()]);
    }

    #[test]
    fn test_default_change_alters_fingerprint_only() {
        let a = RecordTypeSignature::of(&TableSchema::new("lists", "id").column("title"));
        let b = RecordTypeSignature::of(
            &TableSchema::new("lists", "id").column_with_default("title", json!("untitled")),
        );
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(a.diff(&b).is_empty());
    }
}
