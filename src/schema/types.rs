//! Table schema definitions
//!
//! Tables are described once, at engine construction, by the application.
//! Every registered table is synchronized. The only relational constraint
//! the remote store understands is a single parent link, so a table may
//! declare at most one foreign key.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Row;

/// Foreign key action applied to children when the parent is deleted or
/// its referenced key changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// Delete (or rewrite, on update) the children
    Cascade,
    /// Reject while children exist
    Restrict,
    /// Set the child's column to null
    SetNull,
    /// Set the child's column to its default
    SetDefault,
    /// Not supported for synchronized relationships
    NoAction,
}

impl ForeignKeyAction {
    /// Returns the SQL spelling for messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::NoAction => "NO ACTION",
        }
    }

    /// Whether this action can be emulated for a synchronized relationship
    pub fn is_supported(&self) -> bool {
        !matches!(self, ForeignKeyAction::NoAction)
    }
}

/// A declared foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    /// Table declaring the key
    pub child_table: String,
    /// Referenced table
    pub parent_table: String,
    /// Column in the child table
    pub child_column: String,
    /// Referenced column in the parent table
    pub parent_column: String,
    /// Action on parent delete
    pub on_delete: ForeignKeyAction,
    /// Action on parent key update
    pub on_update: ForeignKeyAction,
}

impl ForeignKeyDescriptor {
    /// Create a foreign key with `CASCADE` on delete and update
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            parent_table: parent_table.into(),
            child_column: child_column.into(),
            parent_column: parent_column.into(),
            on_delete: ForeignKeyAction::Cascade,
            on_update: ForeignKeyAction::Cascade,
        }
    }

    /// Builder: action on delete
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Builder: action on update
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Value used when a row omits the column
    #[serde(default)]
    pub default: Value,
}

/// Schema of a synchronized table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Primary key column
    pub primary_key: String,
    /// Columns, primary key included
    pub columns: Vec<ColumnDef>,
    /// Declared foreign keys
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl TableSchema {
    /// Create a table with only its primary key column
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        Self {
            name: name.into(),
            columns: vec![ColumnDef {
                name: primary_key.clone(),
                default: Value::Null,
            }],
            primary_key,
            foreign_keys: Vec::new(),
        }
    }

    /// Builder: add a nullable column
    pub fn column(self, name: impl Into<String>) -> Self {
        self.column_with_default(name, Value::Null)
    }

    /// Builder: add a column with a default
    pub fn column_with_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            default,
        });
        self
    }

    /// Builder: add a foreign key from `column` to `parent_table.parent_column`
    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
        on_delete: ForeignKeyAction,
        on_update: ForeignKeyAction,
    ) -> Self {
        let fk = ForeignKeyDescriptor::new(self.name.clone(), column, parent_table, parent_column)
            .on_delete(on_delete)
            .on_update(on_update);
        self.foreign_keys.push(fk);
        self
    }

    /// Column definition by name
    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.column_def(name).is_some()
    }

    /// Default of a column, null for unknown columns
    pub fn default_of(&self, name: &str) -> Value {
        self.column_def(name)
            .map(|c| c.default.clone())
            .unwrap_or(Value::Null)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Column names as a set
    pub fn column_set(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// A row holding every column's default
    pub fn default_row(&self) -> Row {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.default.clone()))
            .collect()
    }

    /// The foreign key that links rows to their remote parent
    pub fn parent_link(&self) -> Option<&ForeignKeyDescriptor> {
        match self.foreign_keys.as_slice() {
            [fk] => Some(fk),
            _ => None,
        }
    }

    /// Whether rows of this table are hierarchy roots
    pub fn is_root(&self) -> bool {
        self.foreign_keys.is_empty()
    }
}

/// Whether records of a table may be shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSharing {
    /// Root records may be shared with other users
    Shareable,
    /// Never shared
    Private,
}

/// A table registered with the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTable {
    /// Schema
    pub schema: TableSchema,
    /// Sharing class
    pub sharing: TableSharing,
}

impl SyncTable {
    /// Register a shareable table
    pub fn shareable(schema: TableSchema) -> Self {
        Self {
            schema,
            sharing: TableSharing::Shareable,
        }
    }

    /// Register a private table
    pub fn private(schema: TableSchema) -> Self {
        Self {
            schema,
            sharing: TableSharing::Private,
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Whether root records of this table may be shared
    pub fn is_shareable(&self) -> bool {
        self.sharing == TableSharing::Shareable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reminders() -> TableSchema {
        TableSchema::new("reminders", "id")
            .column("title")
            .column_with_default("priority", json!(0))
            .foreign_key(
                "list_id",
                "lists",
                "id",
                ForeignKeyAction::Cascade,
                ForeignKeyAction::Cascade,
            )
            .column("list_id")
    }

    #[test]
    fn test_default_row_covers_all_columns() {
        let row = reminders().default_row();
        assert_eq!(row.len(), 4);
        assert_eq!(row["priority"], json!(0));
        assert_eq!(row["title"], json!(null));
    }

    #[test]
    fn test_parent_link_requires_single_key() {
        let schema = reminders();
        let link = schema.parent_link().unwrap();
        assert_eq!(link.parent_table, "lists");
        assert!(!schema.is_root());
        assert!(TableSchema::new("lists", "id").parent_link().is_none());
    }

    #[test]
    fn test_no_action_is_unsupported() {
        assert!(!ForeignKeyAction::NoAction.is_supported());
        assert!(ForeignKeyAction::SetDefault.is_supported());
    }
}
