//! Foreign key violations

use serde_json::Value;
use thiserror::Error;

use crate::record::RecordIdentity;

/// A write that would break a foreign key
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForeignKeyViolation {
    /// The referenced parent row does not exist
    #[error("{child}: {column} = {value} references no row in '{parent_table}'")]
    MissingParent {
        child: RecordIdentity,
        column: String,
        parent_table: String,
        value: Value,
    },

    /// Children exist and the key is declared RESTRICT
    #[error("{parent} is still referenced by {child}")]
    Restrict {
        parent: RecordIdentity,
        child: RecordIdentity,
    },
}

impl ForeignKeyViolation {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ForeignKeyViolation::MissingParent { .. } => "SYNC_FK_MISSING_PARENT",
            ForeignKeyViolation::Restrict { .. } => "SYNC_FK_RESTRICT",
        }
    }
}
