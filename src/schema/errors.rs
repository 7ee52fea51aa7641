//! Setup error types
//!
//! Every setup error is fatal: it fails engine construction and can never
//! occur in the middle of a sync cycle.

use thiserror::Error;

use super::types::ForeignKeyAction;

/// Result type for setup operations
pub type SetupResult<T> = Result<T, SetupError>;

/// Engine construction failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    /// Table name is not a plain identifier or uses the reserved prefix
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    /// Table registered twice
    #[error("table '{0}' is registered more than once")]
    DuplicateTable(String),

    /// Primary key column not declared
    #[error("table '{table}' has no primary key column '{column}'")]
    MissingPrimaryKey { table: String, column: String },

    /// Foreign key refers to an undeclared column
    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    /// Foreign key points at a table that is not synchronized
    #[error("table '{table}' references unsynchronized table '{parent}'")]
    UnknownParentTable { table: String, parent: String },

    /// Foreign key action cannot be emulated
    #[error("foreign key {table}.{column} uses unsupported action {}", .action.as_str())]
    UnsupportedForeignKeyAction {
        table: String,
        column: String,
        action: ForeignKeyAction,
    },

    /// More than one foreign key on a synchronized table
    #[error("table '{table}' declares {count} foreign keys; at most one is allowed")]
    MultipleForeignKeys { table: String, count: usize },

    /// Foreign key graph is not a DAG
    #[error("foreign keys form a cycle: {}", .cycle.join(" -> "))]
    CyclicForeignKeys { cycle: Vec<String> },

    /// No remote container configured
    #[error("missing container identity")]
    MissingContainerIdentity,

    /// Configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SetupError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SetupError::InvalidTableName(_) => "SYNC_SETUP_INVALID_TABLE_NAME",
            SetupError::DuplicateTable(_) => "SYNC_SETUP_DUPLICATE_TABLE",
            SetupError::MissingPrimaryKey { .. } => "SYNC_SETUP_MISSING_PRIMARY_KEY",
            SetupError::UnknownColumn { .. } => "SYNC_SETUP_UNKNOWN_COLUMN",
            SetupError::UnknownParentTable { .. } => "SYNC_SETUP_UNKNOWN_PARENT_TABLE",
            SetupError::UnsupportedForeignKeyAction { .. } => "SYNC_SETUP_UNSUPPORTED_FK_ACTION",
            SetupError::MultipleForeignKeys { .. } => "SYNC_SETUP_MULTIPLE_FOREIGN_KEYS",
            SetupError::CyclicForeignKeys { .. } => "SYNC_SETUP_CYCLIC_FOREIGN_KEYS",
            SetupError::MissingContainerIdentity => "SYNC_SETUP_MISSING_CONTAINER",
            SetupError::InvalidConfig(_) => "SYNC_SETUP_INVALID_CONFIG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_path() {
        let err = SetupError::CyclicForeignKeys {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "foreign keys form a cycle: a -> b -> a");
        assert_eq!(err.code(), "SYNC_SETUP_CYCLIC_FOREIGN_KEYS");
    }

    #[test]
    fn test_unsupported_action_message() {
        let err = SetupError::UnsupportedForeignKeyAction {
            table: "items".into(),
            column: "list_id".into(),
            action: ForeignKeyAction::NoAction,
        };
        assert!(err.to_string().contains("NO ACTION"));
    }
}
