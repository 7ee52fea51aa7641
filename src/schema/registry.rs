//! Schema registry and setup validation
//!
//! The registry is built once from the application's table list. Any
//! problem is a `SetupError` and the engine refuses to start.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::errors::{SetupError, SetupResult};
use super::signature::RecordTypeSignature;
use super::types::{ForeignKeyDescriptor, SyncTable, TableSchema};
use crate::ordering::TopologicalOrder;

/// Prefix reserved for the engine's own bookkeeping tables
pub const RESERVED_PREFIX: &str = "aerosync_";

fn table_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Whether a name is a valid synchronized table name
pub fn is_valid_table_name(name: &str) -> bool {
    table_name_pattern().map_or(false, |re| re.is_match(name)) && !name.starts_with(RESERVED_PREFIX)
}

/// Validated set of synchronized tables
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, SyncTable>,
    children: BTreeMap<String, Vec<ForeignKeyDescriptor>>,
    order: TopologicalOrder,
}

impl SchemaRegistry {
    /// Validate and register tables
    pub fn new(tables: Vec<SyncTable>) -> SetupResult<Self> {
        let mut by_name: BTreeMap<String, SyncTable> = BTreeMap::new();
        for table in tables {
            let name = table.name().to_string();
            if !is_valid_table_name(&name) {
                return Err(SetupError::InvalidTableName(name));
            }
            if by_name.contains_key(&name) {
                return Err(SetupError::DuplicateTable(name));
            }
            by_name.insert(name, table);
        }

        for table in by_name.values() {
            Self::validate_table(&table.schema, &by_name)?;
        }

        let graph: BTreeMap<String, Vec<String>> = by_name
            .values()
            .map(|t| {
                let parents = t
                    .schema
                    .foreign_keys
                    .iter()
                    .map(|fk| fk.parent_table.clone())
                    .collect();
                (t.name().to_string(), parents)
            })
            .collect();
        let order = TopologicalOrder::build(&graph)?;

        let mut children: BTreeMap<String, Vec<ForeignKeyDescriptor>> = BTreeMap::new();
        for table in by_name.values() {
            for fk in &table.schema.foreign_keys {
                children
                    .entry(fk.parent_table.clone())
                    .or_default()
                    .push(fk.clone());
            }
        }

        Ok(Self {
            tables: by_name,
            children,
            order,
        })
    }

    fn validate_table(schema: &TableSchema, all: &BTreeMap<String, SyncTable>) -> SetupResult<()> {
        if !schema.has_column(&schema.primary_key) {
            return Err(SetupError::MissingPrimaryKey {
                table: schema.name.clone(),
                column: schema.primary_key.clone(),
            });
        }
        if schema.foreign_keys.len() > 1 {
            return Err(SetupError::MultipleForeignKeys {
                table: schema.name.clone(),
                count: schema.foreign_keys.len(),
            });
        }
        for fk in &schema.foreign_keys {
            if !schema.has_column(&fk.child_column) {
                return Err(SetupError::UnknownColumn {
                    table: schema.name.clone(),
                    column: fk.child_column.clone(),
                });
            }
            for action in [fk.on_delete, fk.on_update] {
                if !action.is_supported() {
                    return Err(SetupError::UnsupportedForeignKeyAction {
                        table: schema.name.clone(),
                        column: fk.child_column.clone(),
                        action,
                    });
                }
            }
            let parent = all
                .get(&fk.parent_table)
                .ok_or_else(|| SetupError::UnknownParentTable {
                    table: schema.name.clone(),
                    parent: fk.parent_table.clone(),
                })?;
            if !parent.schema.has_column(&fk.parent_column) {
                return Err(SetupError::UnknownColumn {
                    table: fk.parent_table.clone(),
                    column: fk.parent_column.clone(),
                });
            }
        }
        Ok(())
    }

    /// Registered table
    pub fn table(&self, name: &str) -> Option<&SyncTable> {
        self.tables.get(name)
    }

    /// Schema of a registered table
    pub fn schema(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name).map(|t| &t.schema)
    }

    /// Whether the table is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Registered tables in name order
    pub fn tables(&self) -> impl Iterator<Item = &SyncTable> {
        self.tables.values()
    }

    /// Dependency order over the registered tables
    pub fn order(&self) -> &TopologicalOrder {
        &self.order
    }

    /// Foreign keys of other tables that point at `parent`
    pub fn referencing(&self, parent: &str) -> &[ForeignKeyDescriptor] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The parent link of a table, if it has one
    pub fn parent_link(&self, table: &str) -> Option<&ForeignKeyDescriptor> {
        self.schema(table).and_then(TableSchema::parent_link)
    }

    /// Whether root records of the table may be shared
    pub fn is_shareable(&self, table: &str) -> bool {
        self.table(table).map(SyncTable::is_shareable).unwrap_or(false)
    }

    /// Live signatures of all registered tables
    pub fn signatures(&self) -> BTreeMap<String, RecordTypeSignature> {
        self.tables
            .values()
            .map(|t| (t.name().to_string(), RecordTypeSignature::of(&t.schema)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKeyAction;

    fn lists() -> SyncTable {
        SyncTable::shareable(TableSchema::new("lists", "id").column("title"))
    }

    fn items(on_delete: ForeignKeyAction) -> SyncTable {
        SyncTable::shareable(
            TableSchema::new("items", "id")
                .column("list_id")
                .column("name")
                .foreign_key("list_id", "lists", "id", on_delete, ForeignKeyAction::Cascade),
        )
    }

    #[test]
    fn test_valid_registry() {
        let registry = SchemaRegistry::new(vec![items(ForeignKeyAction::Cascade), lists()]).unwrap();
        assert_eq!(registry.order().tables(), &["lists".to_string(), "items".to_string()]);
        assert_eq!(registry.referencing("lists").len(), 1);
        assert!(registry.referencing("items").is_empty());
        assert_eq!(registry.parent_link("items").unwrap().parent_table, "lists");
    }

    #[test]
    fn test_rejects_invalid_table_names() {
        for name in ["1lists", "my:table", "aerosync_metadata", ""] {
            let err = SchemaRegistry::new(vec![SyncTable::private(TableSchema::new(name, "id"))])
                .unwrap_err();
            assert_eq!(err, SetupError::InvalidTableName(name.to_string()));
        }
    }

    #[test]
    fn test_rejects_duplicate_table() {
        let err = SchemaRegistry::new(vec![lists(), lists()]).unwrap_err();
        assert_eq!(err, SetupError::DuplicateTable("lists".to_string()));
    }

    #[test]
    fn test_rejects_unknown_parent() {
        let err = SchemaRegistry::new(vec![items(ForeignKeyAction::Cascade)]).unwrap_err();
        assert!(matches!(err, SetupError::UnknownParentTable { .. }));
    }

    #[test]
    fn test_rejects_no_action() {
        let err = SchemaRegistry::new(vec![lists(), items(ForeignKeyAction::NoAction)]).unwrap_err();
        assert!(matches!(err, SetupError::UnsupportedForeignKeyAction { .. }));
    }

    #[test]
    fn test_rejects_multiple_foreign_keys() {
        let tags = SyncTable::private(TableSchema::new("tags", "id"));
        let both = SyncTable::private(
            TableSchema::new("links", "id")
                .column("list_id")
                .column("tag_id")
                .foreign_key("list_id", "lists", "id", ForeignKeyAction::Cascade, ForeignKeyAction::Cascade)
                .foreign_key("tag_id", "tags", "id", ForeignKeyAction::Cascade, ForeignKeyAction::Cascade),
        );
        let err = SchemaRegistry::new(vec![lists(), tags, both]).unwrap_err();
        assert_eq!(
            err,
            SetupError::MultipleForeignKeys {
                table: "links".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn test_rejects_unknown_fk_column() {
        let bad = SyncTable::private(TableSchema::new("items", "id").foreign_key(
            "list_id",
            "lists",
            "id",
            ForeignKeyAction::Cascade,
            ForeignKeyAction::Cascade,
        ));
        let err = SchemaRegistry::new(vec![lists(), bad]).unwrap_err();
        assert!(matches!(err, SetupError::UnknownColumn { .. }));
    }

    #[test]
    fn test_rejects_missing_primary_key() {
        let mut schema = TableSchema::new("lists", "id");
        schema.primary_key = "uuid".to_string();
        let err = SchemaRegistry::new(vec![SyncTable::private(schema)]).unwrap_err();
        assert!(matches!(err, SetupError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn test_sharing_class() {
        let registry = SchemaRegistry::new(vec![
            lists(),
            SyncTable::private(TableSchema::new("settings", "id")),
        ])
        .unwrap();
        assert!(registry.is_shareable("lists"));
        assert!(!registry.is_shareable("settings"));
        assert!(!registry.is_shareable("missing"));
    }
}
