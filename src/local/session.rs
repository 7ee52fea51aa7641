//! Write interception
//!
//! A `WriteSession` is the only way rows change. Within one transaction it
//! normalizes the row, enforces foreign keys (checks and child actions),
//! checks share permissions and zone placement and captures the change, in
//! that order. The `WriteContext` decides whether the last three steps run.

use serde_json::Value;

use super::errors::{WriteError, WriteResult};
use super::state::DatabaseState;
use crate::capture::{forget, record_delete, record_save, WriteContext};
use crate::foreign_key::{check_references, find_parent, plan_delete, plan_key_change, ChildAction};
use crate::record::{RecordIdentity, Row};
use crate::schema::{SchemaRegistry, TableSchema};
use crate::sharing::read_only_share;

/// Row writes against one transaction's state
pub struct WriteSession<'a> {
    state: &'a mut DatabaseState,
    registry: &'a SchemaRegistry,
    ctx: WriteContext,
    captured: bool,
}

impl<'a> WriteSession<'a> {
    /// Session over a transaction's working state
    pub fn new(state: &'a mut DatabaseState, registry: &'a SchemaRegistry, ctx: WriteContext) -> Self {
        Self {
            state,
            registry,
            ctx,
            captured: false,
        }
    }

    /// Working state, including uncommitted writes of this session
    pub fn state(&self) -> &DatabaseState {
        self.state
    }

    /// Whether any write was captured as a pending change
    pub fn captured(&self) -> bool {
        self.captured
    }

    fn schema(&self, table: &str) -> WriteResult<&'a TableSchema> {
        self.registry
            .schema(table)
            .ok_or_else(|| WriteError::UnknownTable(table.to_string()))
    }

    fn normalize(&self, schema: &TableSchema, row: Row) -> WriteResult<Row> {
        let mut out = schema.default_row();
        for (column, value) in row {
            if schema.has_column(&column) {
                out.insert(column, value);
            } else if !self.ctx.is_remote() {
                return Err(WriteError::UnknownColumn {
                    table: schema.name.clone(),
                    column,
                });
            }
        }
        Ok(out)
    }

    fn identity_of(schema: &TableSchema, row: &Row) -> WriteResult<RecordIdentity> {
        row.get(&schema.primary_key)
            .and_then(|v| RecordIdentity::from_value(schema.name.as_str(), v))
            .ok_or_else(|| WriteError::MissingPrimaryKey(schema.name.clone()))
    }

    fn check_permission(
        &self,
        identity: &RecordIdentity,
        parent: Option<&RecordIdentity>,
    ) -> WriteResult<()> {
        if !self.ctx.enforces_permissions() {
            return Ok(());
        }
        let sync = &self.state.sync;
        // A new parent can lead into another hierarchy
        let moved_to = parent.filter(|p| {
            sync.metadata
                .get(identity)
                .map_or(false, |m| m.parent.as_ref() != Some(*p))
        });
        let denied = read_only_share(sync, identity, parent)
            .or_else(|| moved_to.and_then(|p| read_only_share(sync, p, None)));
        match denied {
            Some(share_id) => Err(WriteError::PermissionDenied {
                identity: identity.clone(),
                share_id,
            }),
            None => Ok(()),
        }
    }

    /// Rows the remote already holds stay in their zone
    fn check_zone(&self, identity: &RecordIdentity, parent: Option<&RecordIdentity>) -> WriteResult<()> {
        if !self.ctx.captures() {
            return Ok(());
        }
        let sync = &self.state.sync;
        let meta = match sync.metadata.get(identity) {
            Some(meta) if meta.is_synced() && meta.parent.as_ref() != parent => meta,
            _ => return Ok(()),
        };
        match parent.and_then(|p| sync.metadata.get(p)) {
            Some(target) if target.zone != meta.zone => Err(WriteError::ZoneChange {
                identity: identity.clone(),
                from: meta.zone.clone(),
                to: target.zone.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn current_parent(&self, schema: &TableSchema, row: &Row) -> Option<RecordIdentity> {
        let fk = schema.parent_link()?;
        let value = row.get(&fk.child_column).filter(|v| !v.is_null())?;
        find_parent(self.state, self.registry, fk, value)
    }

    fn after_write(
        &mut self,
        identity: &RecordIdentity,
        old: Option<&Row>,
        new: &Row,
        parent: Option<RecordIdentity>,
    ) {
        if self.ctx.captures() {
            record_save(&mut self.state.sync, identity, old, new, parent);
            self.captured = true;
        } else if let Some(meta) = self.state.sync.metadata.get_mut(identity) {
            meta.parent = parent;
        }
    }

    fn after_delete(&mut self, identity: &RecordIdentity) {
        if self.ctx.captures() {
            record_delete(&mut self.state.sync, identity);
            self.captured = true;
        } else {
            forget(&mut self.state.sync, identity);
        }
    }

    /// Insert a new row; missing columns take their defaults
    pub fn insert(&mut self, table: &str, row: Row) -> WriteResult<RecordIdentity> {
        let schema = self.schema(table)?;
        let row = self.normalize(schema, row)?;
        let identity = Self::identity_of(schema, &row)?;
        if self.state.has_row(&identity) {
            return Err(WriteError::DuplicateRow(identity));
        }

        let parent = check_references(self.state, self.registry, schema, &identity, &row)?;
        self.check_permission(&identity, parent.as_ref())?;
        self.check_zone(&identity, parent.as_ref())?;
        self.state.put_row(&identity, row.clone());
        self.after_write(&identity, None, &row, parent);
        Ok(identity)
    }

    /// Change columns of an existing row
    ///
    /// Changing the primary key moves the row: the old identity is deleted
    /// and the new one saved. Children follow the key per their foreign
    /// key's update action. Returns the row's identity after the update.
    pub fn update(&mut self, identity: &RecordIdentity, changes: Row) -> WriteResult<RecordIdentity> {
        let schema = self.schema(identity.table())?;
        let old = self
            .state
            .row(identity)
            .cloned()
            .ok_or_else(|| WriteError::RowNotFound(identity.clone()))?;

        let mut new = old.clone();
        for (column, value) in changes {
            if schema.has_column(&column) {
                new.insert(column, value);
            } else if !self.ctx.is_remote() {
                return Err(WriteError::UnknownColumn {
                    table: schema.name.clone(),
                    column,
                });
            }
        }
        let new_identity = Self::identity_of(schema, &new)?;
        self.check_permission(identity, None)?;

        let actions = plan_key_change(
            self.state,
            self.registry,
            identity,
            &old,
            &new,
            self.ctx.is_remote(),
        )?;
        let parent = check_references(self.state, self.registry, schema, &new_identity, &new)?;

        if new_identity != *identity {
            if self.state.has_row(&new_identity) {
                return Err(WriteError::DuplicateRow(new_identity));
            }
            self.check_permission(&new_identity, parent.as_ref())?;
            self.check_zone(&new_identity, parent.as_ref())?;
            self.state.remove_row(identity);
            self.state.put_row(&new_identity, new.clone());
            self.after_delete(identity);
            self.after_write(&new_identity, None, &new, parent);
        } else {
            if old == new {
                return Ok(new_identity);
            }
            self.check_permission(identity, parent.as_ref())?;
            self.check_zone(identity, parent.as_ref())?;
            self.state.put_row(identity, new.clone());
            self.after_write(identity, Some(&old), &new, parent);
        }

        self.apply(actions)?;
        Ok(new_identity)
    }

    /// Insert the row, or overwrite the existing row with it
    pub fn upsert(&mut self, table: &str, row: Row) -> WriteResult<RecordIdentity> {
        let schema = self.schema(table)?;
        let row = self.normalize(schema, row)?;
        let identity = Self::identity_of(schema, &row)?;
        if self.state.has_row(&identity) {
            self.update(&identity, row)
        } else {
            self.insert(table, row)
        }
    }

    /// Delete a row, applying its children's delete actions
    pub fn delete(&mut self, identity: &RecordIdentity) -> WriteResult<()> {
        self.schema(identity.table())?;
        if !self.state.has_row(identity) {
            return Err(WriteError::RowNotFound(identity.clone()));
        }
        self.check_permission(identity, None)?;

        let actions = plan_delete(self.state, self.registry, identity, self.ctx.is_remote())?;
        self.apply(actions)?;
        self.state.remove_row(identity);
        self.after_delete(identity);
        Ok(())
    }

    /// Overwrite one column without foreign key checks
    ///
    /// Used for foreign key actions and schema back-fills, where the value
    /// is already known to be acceptable.
    pub fn set_column(
        &mut self,
        identity: &RecordIdentity,
        column: &str,
        value: Value,
    ) -> WriteResult<()> {
        let schema = self.schema(identity.table())?;
        let old = match self.state.row(identity) {
            Some(row) => row.clone(),
            None => return Ok(()),
        };
        let mut new = old.clone();
        new.insert(column.to_string(), value);
        if new == old {
            return Ok(());
        }
        let parent = self.current_parent(schema, &new);
        self.state.put_row(identity, new.clone());
        self.after_write(identity, Some(&old), &new, parent);
        Ok(())
    }

    fn apply(&mut self, actions: Vec<ChildAction>) -> WriteResult<()> {
        for action in actions {
            match action {
                ChildAction::Delete(child) => {
                    if self.state.remove_row(&child).is_some() {
                        self.after_delete(&child);
                    }
                }
                ChildAction::Rewrite {
                    identity,
                    column,
                    value,
                } => self.set_column(&identity, &column, value)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign_key::ForeignKeyViolation;
    use crate::metadata::PendingKind;
    use crate::schema::{ForeignKeyAction, SyncTable};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(vec![
            SyncTable::shareable(TableSchema::new("lists", "id").column("title")),
            SyncTable::shareable(
                TableSchema::new("items", "id")
                    .column("list_id")
                    .column("name")
                    .foreign_key(
                        "list_id",
                        "lists",
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

    fn seeded(state: &mut DatabaseState, registry: &SchemaRegistry) {
        let mut session = WriteSession::new(state, registry, WriteContext::local());
        session.insert("lists", row(&[("id", json!(1)), ("title", json!("trip"))])).unwrap();
        session
            .insert("items", row(&[("id", json!("a")), ("list_id", json!(1))]))
            .unwrap();
    }

    #[test]
    fn test_insert_fills_defaults_and_captures() {
        let reg = registry();
        let mut state = DatabaseState::new();
        seeded(&mut state, &reg);

        let item = RecordIdentity::new("items", "a");
        assert_eq!(state.row(&item).unwrap()["name"], Value::Null);
        let meta = state.sync.metadata.get(&item).unwrap();
        assert_eq!(meta.parent, Some(RecordIdentity::new("lists", "1")));
        assert_eq!(state.sync.pending.len(), 2);
    }

    #[test]
    fn test_insert_rejects_unknown_column_and_missing_parent() {
        let reg = registry();
        let mut state = DatabaseState::new();
        let mut session = WriteSession::new(&mut state, &reg, WriteContext::local());

        let err = session
            .insert("lists", row(&[("id", json!(1)), ("colour", json!("red"))]))
            .unwrap_err();
        assert!(matches!(err, WriteError::UnknownColumn { .. }));

        let err = session
            .insert("items", row(&[("id", json!("a")), ("list_id", json!(5))]))
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::ForeignKey(ForeignKeyViolation::MissingParent { .. })
        ));
        assert!(!session.captured());
    }

    #[test]
    fn test_local_cascade_delete_queues_every_delete() {
        let reg = registry();
        let mut state = DatabaseState::new();
        seeded(&mut state, &reg);

        let list = RecordIdentity::new("lists", "1");
        WriteSession::new(&mut state, &reg, WriteContext::local())
            .delete(&list)
            .unwrap();
        assert_eq!(state.row_count("items"), 0);
        assert!(state.sync.pending.has_delete(&list));
        assert!(state.sync.pending.has_delete(&RecordIdentity::new("items", "a")));
    }

    #[test]
    fn test_remote_delete_forgets_metadata() {
        let reg = registry();
        let mut state = DatabaseState::new();
        seeded(&mut state, &reg);

        WriteSession::new(&mut state, &reg, WriteContext::remote())
            .delete(&RecordIdentity::new("lists", "1"))
            .unwrap();
        assert!(state.sync.metadata.is_empty());
        assert!(state.sync.pending.is_empty());
    }

    #[test]
    fn test_primary_key_change_moves_row_and_children() {
        let reg = registry();
        let mut state = DatabaseState::new();
        seeded(&mut state, &reg);

        let old = RecordIdentity::new("lists", "1");
        let new = WriteSession::new(&mut state, &reg, WriteContext::local())
            .update(&old, row(&[("id", json!(2))]))
            .unwrap();
        assert_eq!(new, RecordIdentity::new("lists", "2"));
        assert_eq!(state.sync.pending.kind_of(&old), Some(PendingKind::Delete));
        assert_eq!(state.sync.pending.kind_of(&new), Some(PendingKind::Save));

        let item = RecordIdentity::new("items", "a");
        assert_eq!(state.row(&item).unwrap()["list_id"], json!(2));
        assert_eq!(state.sync.metadata.get(&item).unwrap().parent, Some(new));
    }

    #[test]
    fn test_unchanged_update_is_not_captured() {
        let reg = registry();
        let mut state = DatabaseState::new();
        seeded(&mut state, &reg);
        state.sync.pending = Default::default();

        let mut session = WriteSession::new(&mut state, &reg, WriteContext::local());
        session
            .update(&RecordIdentity::new("lists", "1"), row(&[("title", json!("trip"))]))
            .unwrap();
        assert!(!session.captured());
    }
}
