//! Foreign key emulation over the local database image
//!
//! The planner functions only read the state. They return the child
//! actions a write implies, and the write session applies them together
//! with the write itself, inside one transaction.

use std::collections::BTreeSet;

use serde_json::Value;

use super::errors::ForeignKeyViolation;
use crate::local::DatabaseState;
use crate::record::{RecordIdentity, Row};
use crate::schema::{ForeignKeyAction, ForeignKeyDescriptor, SchemaRegistry, TableSchema};

/// A change to a child row implied by a parent write
#[derive(Debug, Clone, PartialEq)]
pub enum ChildAction {
    /// Delete the child
    Delete(RecordIdentity),
    /// Set the child's foreign key column
    Rewrite {
        identity: RecordIdentity,
        column: String,
        value: Value,
    },
}

fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Identity of the row in `fk.parent_table` whose parent column equals `value`
pub fn find_parent(
    state: &DatabaseState,
    registry: &SchemaRegistry,
    fk: &ForeignKeyDescriptor,
    value: &Value,
) -> Option<RecordIdentity> {
    let parent_schema = registry.schema(&fk.parent_table)?;
    if fk.parent_column == parent_schema.primary_key {
        let identity = RecordIdentity::from_value(fk.parent_table.as_str(), value)?;
        return state.has_row(&identity).then_some(identity);
    }
    state.table(&fk.parent_table).and_then(|t| {
        t.iter()
            .find(|(_, row)| row.get(&fk.parent_column) == Some(value))
            .map(|(pk, _)| RecordIdentity::new(fk.parent_table.as_str(), pk.as_str()))
    })
}

/// Identity the row's foreign key points at, whether or not that row exists
///
/// Used when applying remote records whose parent may not have arrived yet.
/// Only keys on the parent's primary key can be derived without the row.
pub fn derive_parent(
    state: &DatabaseState,
    registry: &SchemaRegistry,
    schema: &TableSchema,
    row: &Row,
) -> Option<RecordIdentity> {
    let fk = schema.parent_link()?;
    let value = row.get(&fk.child_column).filter(|v| !v.is_null())?;
    let parent_schema = registry.schema(&fk.parent_table)?;
    if fk.parent_column == parent_schema.primary_key {
        RecordIdentity::from_value(fk.parent_table.as_str(), value)
    } else {
        find_parent(state, registry, fk, value)
    }
}

/// Check that every non-null foreign key of `row` resolves
///
/// Returns the parent identity of the row's parent link.
pub fn check_references(
    state: &DatabaseState,
    registry: &SchemaRegistry,
    schema: &TableSchema,
    identity: &RecordIdentity,
    row: &Row,
) -> Result<Option<RecordIdentity>, ForeignKeyViolation> {
    let mut parent = None;
    for fk in &schema.foreign_keys {
        let value = row.get(&fk.child_column);
        if is_null(value) {
            continue;
        }
        let value = value.cloned().unwrap_or(Value::Null);
        match find_parent(state, registry, fk, &value) {
            Some(found) => parent = Some(found),
            None => {
                return Err(ForeignKeyViolation::MissingParent {
                    child: identity.clone(),
                    column: fk.child_column.clone(),
                    parent_table: fk.parent_table.clone(),
                    value,
                })
            }
        }
    }
    Ok(parent)
}

/// Rows of `fk.child_table` whose foreign key column equals `value`
pub fn find_children(
    state: &DatabaseState,
    fk: &ForeignKeyDescriptor,
    value: &Value,
) -> Vec<RecordIdentity> {
    if value.is_null() {
        return Vec::new();
    }
    state
        .table(&fk.child_table)
        .map(|t| {
            t.iter()
                .filter(|(_, row)| row.get(&fk.child_column) == Some(value))
                .map(|(pk, _)| RecordIdentity::new(fk.child_table.as_str(), pk.as_str()))
                .collect()
        })
        .unwrap_or_default()
}

fn effective(action: ForeignKeyAction, remote_origin: bool) -> ForeignKeyAction {
    // The remote hierarchy is already gone; refusing would only diverge
    if remote_origin && action == ForeignKeyAction::Restrict {
        ForeignKeyAction::Cascade
    } else {
        action
    }
}

fn default_of(registry: &SchemaRegistry, fk: &ForeignKeyDescriptor) -> Value {
    registry
        .schema(&fk.child_table)
        .map(|s| s.default_of(&fk.child_column))
        .unwrap_or(Value::Null)
}

/// Child actions implied by deleting `identity`
///
/// Cascades are followed transitively. Actions come out parents first.
pub fn plan_delete(
    state: &DatabaseState,
    registry: &SchemaRegistry,
    identity: &RecordIdentity,
    remote_origin: bool,
) -> Result<Vec<ChildAction>, ForeignKeyViolation> {
    let mut actions = Vec::new();
    let mut doomed: BTreeSet<RecordIdentity> = BTreeSet::new();
    let mut queue = vec![identity.clone()];
    doomed.insert(identity.clone());

    while let Some(current) = queue.pop() {
        let row = match state.row(&current) {
            Some(row) => row,
            None => continue,
        };
        for fk in registry.referencing(current.table()) {
            let value = match row.get(&fk.parent_column) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            for child in find_children(state, fk, value) {
                if doomed.contains(&child) {
                    continue;
                }
                match effective(fk.on_delete, remote_origin) {
                    ForeignKeyAction::Cascade => {
                        doomed.insert(child.clone());
                        actions.push(ChildAction::Delete(child.clone()));
                        queue.push(child);
                    }
                    ForeignKeyAction::Restrict | ForeignKeyAction::NoAction => {
                        return Err(ForeignKeyViolation::Restrict {
                            parent: current.clone(),
                            child,
                        });
                    }
                    ForeignKeyAction::SetNull => actions.push(ChildAction::Rewrite {
                        identity: child,
                        column: fk.child_column.clone(),
                        value: Value::Null,
                    }),
                    ForeignKeyAction::SetDefault => actions.push(ChildAction::Rewrite {
                        identity: child,
                        column: fk.child_column.clone(),
                        value: default_of(registry, fk),
                    }),
                }
            }
        }
    }

    // Rewrites of rows that are deleted anyway are pointless
    actions.retain(|a| match a {
        ChildAction::Rewrite { identity, .. } => !doomed.contains(identity),
        ChildAction::Delete(_) => true,
    });
    Ok(actions)
}

/// Child actions implied by changing referenced columns of a row
pub fn plan_key_change(
    state: &DatabaseState,
    registry: &SchemaRegistry,
    identity: &RecordIdentity,
    old_row: &Row,
    new_row: &Row,
    remote_origin: bool,
) -> Result<Vec<ChildAction>, ForeignKeyViolation> {
    let mut actions = Vec::new();
    for fk in registry.referencing(identity.table()) {
        let old = old_row.get(&fk.parent_column).cloned().unwrap_or(Value::Null);
        let new = new_row.get(&fk.parent_column).cloned().unwrap_or(Value::Null);
        if old == new {
            continue;
        }
        for child in find_children(state, fk, &old) {
            let value = match effective(fk.on_update, remote_origin) {
                ForeignKeyAction::Cascade => new.clone(),
                ForeignKeyAction::Restrict | ForeignKeyAction::NoAction => {
                    return Err(ForeignKeyViolation::Restrict {
                        parent: identity.clone(),
                        child,
                    });
                }
                ForeignKeyAction::SetNull => Value::Null,
                ForeignKeyAction::SetDefault => default_of(registry, fk),
            };
            actions.push(ChildAction::Rewrite {
                identity: child,
                column: fk.child_column.clone(),
                value,
            });
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SyncTable;
    use serde_json::json;

    fn registry(on_delete: ForeignKeyAction) -> SchemaRegistry {
        SchemaRegistry::new(vec![
            SyncTable::shareable(TableSchema::new("lists", "id").column("title")),
            SyncTable::shareable(
                TableSchema::new("items", "id")
                    .column_with_default("list_id", json!(0))
                    .foreign_key("list_id", "lists", "id", on_delete, on_delete),
            ),
            SyncTable::shareable(
                TableSchema::new("notes", "id")
                    .column("item_id")
                    .foreign_key(
                        "item_id",
                        "items",
                        "id",
                        ForeignKeyAction::Cascade,
                        ForeignKeyAction::Cascade,
                    ),
            ),
        ])
        .unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn state() -> DatabaseState {
        let mut state = DatabaseState::new();
        state.put_row(&RecordIdentity::new("lists", "1"), row(&[("id", json!(1))]));
        state.put_row(
            &RecordIdentity::new("items", "a"),
            row(&[("id", json!("a")), ("list_id", json!(1))]),
        );
        state.put_row(
            &RecordIdentity::new("notes", "n"),
            row(&[("id", json!("n")), ("item_id", json!("a"))]),
        );
        state
    }

    #[test]
    fn test_cascade_is_transitive() {
        let reg = registry(ForeignKeyAction::Cascade);
        let actions = plan_delete(&state(), &reg, &RecordIdentity::new("lists", "1"), false).unwrap();
        assert_eq!(
            actions,
            vec![
                ChildAction::Delete(RecordIdentity::new("items", "a")),
                ChildAction::Delete(RecordIdentity::new("notes", "n")),
            ]
        );
    }

    #[test]
    fn test_restrict_rejects_local_but_cascades_remote() {
        let reg = registry(ForeignKeyAction::Restrict);
        let list = RecordIdentity::new("lists", "1");
        let err = plan_delete(&state(), &reg, &list, false).unwrap_err();
        assert!(matches!(err, ForeignKeyViolation::Restrict { .. }));
        assert_eq!(plan_delete(&state(), &reg, &list, true).unwrap().len(), 2);
    }

    #[test]
    fn test_set_null_and_default() {
        let list = RecordIdentity::new("lists", "1");
        let actions = plan_delete(&state(), &registry(ForeignKeyAction::SetNull), &list, false).unwrap();
        assert_eq!(
            actions,
            vec![ChildAction::Rewrite {
                identity: RecordIdentity::new("items", "a"),
                column: "list_id".into(),
                value: Value::Null,
            }]
        );

        let actions =
            plan_delete(&state(), &registry(ForeignKeyAction::SetDefault), &list, false).unwrap();
        assert!(matches!(&actions[0], ChildAction::Rewrite { value, .. } if *value == json!(0)));
    }

    #[test]
    fn test_key_change_cascades_new_value() {
        let reg = registry(ForeignKeyAction::Cascade);
        let actions = plan_key_change(
            &state(),
            &reg,
            &RecordIdentity::new("lists", "1"),
            &row(&[("id", json!(1))]),
            &row(&[("id", json!(2))]),
            false,
        )
        .unwrap();
        assert_eq!(
            actions,
            vec![ChildAction::Rewrite {
                identity: RecordIdentity::new("items", "a"),
                column: "list_id".into(),
                value: json!(2),
            }]
        );
    }

    #[test]
    fn test_reference_check() {
        let reg = registry(ForeignKeyAction::Cascade);
        let schema = reg.schema("items").unwrap();
        let id = RecordIdentity::new("items", "b");

        let ok = check_references(&state(), &reg, schema, &id, &row(&[("list_id", json!(1))])).unwrap();
        assert_eq!(ok, Some(RecordIdentity::new("lists", "1")));

        let none = check_references(&state(), &reg, schema, &id, &row(&[("list_id", Value::Null)])).unwrap();
        assert_eq!(none, None);

        let err = check_references(&state(), &reg, schema, &id, &row(&[("list_id", json!(9))])).unwrap_err();
        assert!(matches!(err, ForeignKeyViolation::MissingParent { .. }));
    }

    #[test]
    fn test_derive_parent_without_row() {
        let reg = registry(ForeignKeyAction::Cascade);
        let schema = reg.schema("items").unwrap();
        let parent = derive_parent(&DatabaseState::new(), &reg, schema, &row(&[("list_id", json!(7))]));
        assert_eq!(parent, Some(RecordIdentity::new("lists", "7")));
    }
}
