//! Application-facing database handle

use std::sync::Arc;

use tokio::sync::Notify;

use super::database::LocalDatabase;
use super::errors::WriteResult;
use super::session::WriteSession;
use crate::capture::WriteContext;
use crate::metadata::{PendingChange, SyncMetadata};
use crate::record::{RecordIdentity, Row};
use crate::schema::SchemaRegistry;

/// Local database with change capture
///
/// Every write runs in its own transaction through a `WriteSession` under
/// a local `WriteContext`. When a write is captured, waiters on
/// `changes()` are woken so the engine can push.
#[derive(Debug, Clone)]
pub struct SyncedDatabase {
    db: Arc<LocalDatabase>,
    registry: Arc<SchemaRegistry>,
    changes: Arc<Notify>,
}

impl SyncedDatabase {
    /// Wrap a database and its registered tables
    pub fn new(db: Arc<LocalDatabase>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            db,
            registry,
            changes: Arc::new(Notify::new()),
        }
    }

    /// Insert a row
    pub fn insert(&self, table: &str, row: Row) -> WriteResult<RecordIdentity> {
        self.write(|s| s.insert(table, row))
    }

    /// Update columns of a row
    pub fn update(&self, identity: &RecordIdentity, changes: Row) -> WriteResult<RecordIdentity> {
        self.write(|s| s.update(identity, changes))
    }

    /// Insert or overwrite a row
    pub fn upsert(&self, table: &str, row: Row) -> WriteResult<RecordIdentity> {
        self.write(|s| s.upsert(table, row))
    }

    /// Delete a row
    pub fn delete(&self, identity: &RecordIdentity) -> WriteResult<()> {
        self.write(|s| s.delete(identity))
    }

    /// Run several writes in one transaction
    pub fn write<T, F>(&self, f: F) -> WriteResult<T>
    where
        F: FnOnce(&mut WriteSession<'_>) -> WriteResult<T>,
    {
        let registry = Arc::clone(&self.registry);
        let (value, captured) = self.db.transaction(|state| {
            let mut session = WriteSession::new(state, &registry, WriteContext::local());
            let value = f(&mut session)?;
            Ok::<_, super::errors::WriteError>((value, session.captured()))
        })?;
        if captured {
            self.changes.notify_one();
        }
        Ok(value)
    }

    /// Committed row
    pub fn get(&self, identity: &RecordIdentity) -> Option<Row> {
        self.db.read(|s| s.row(identity).cloned())
    }

    /// Committed rows of a table in primary key order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.db.read(|s| {
            s.table(table)
                .map(|t| t.iter().map(|(_, r)| r.clone()).collect())
                .unwrap_or_default()
        })
    }

    /// Pending changes in identity order
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.db.read(|s| s.sync.pending.iter().cloned().collect())
    }

    /// Sync metadata of a row
    pub fn metadata(&self, identity: &RecordIdentity) -> Option<SyncMetadata> {
        self.db.read(|s| s.sync.metadata.get(identity).cloned())
    }

    /// Signalled after every captured write
    pub fn changes(&self) -> Arc<Notify> {
        Arc::clone(&self.changes)
    }

    /// Underlying database
    pub fn local(&self) -> &Arc<LocalDatabase> {
        &self.db
    }

    /// Registered tables
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }
}
