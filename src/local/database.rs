//! Transactional local database
//!
//! A transaction works on a copy of the state. If the closure succeeds the
//! copy is persisted and then published; if it fails, or persisting fails,
//! the copy is dropped and nothing changes. Readers never see a partially
//! applied transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::errors::{StorageError, StorageResult};
use super::persistence::StateFile;
use super::state::DatabaseState;

/// Local database shared by the application and the sync engine
#[derive(Debug)]
pub struct LocalDatabase {
    state: Mutex<DatabaseState>,
    file: Option<StateFile>,
}

impl LocalDatabase {
    /// Volatile database, nothing survives the process
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(DatabaseState::new()),
            file: None,
        }
    }

    /// Durable database in `data_dir`, reloading the last commit
    pub fn open(data_dir: &Path) -> StorageResult<Self> {
        let file = StateFile::open(data_dir)?;
        let state = file.load()?;
        Ok(Self {
            state: Mutex::new(state),
            file: Some(file),
        })
    }

    /// Whether commits are written to disk
    pub fn is_durable(&self) -> bool {
        self.file.is_some()
    }

    // A panic inside a transaction only ever touches the private copy, so
    // the guarded state is still the last commit.
    fn lock(&self) -> MutexGuard<'_, DatabaseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` atomically against the state
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut DatabaseState) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut guard = self.lock();
        let mut working = guard.clone();
        let value = f(&mut working)?;
        if working != *guard {
            if let Some(file) = &self.file {
                file.store(&working)?;
            }
            *guard = working;
        }
        Ok(value)
    }

    /// Read the committed state
    pub fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&DatabaseState) -> T,
    {
        let guard = self.lock();
        f(&guard)
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> DatabaseState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordIdentity, Row};
    use serde_json::json;
    use tempfile::TempDir;

    fn row(id: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), json!(id));
        row
    }

    #[test]
    fn test_failed_transaction_leaves_state_untouched() {
        let db = LocalDatabase::in_memory();
        let id = RecordIdentity::new("lists", "1");
        let result: Result<(), StorageError> = db.transaction(|state| {
            state.put_row(&id, row(1));
            Err(StorageError::corrupted("abort"))
        });
        assert!(result.is_err());
        assert!(!db.read(|s| s.has_row(&id)));
    }

    #[test]
    fn test_commit_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = RecordIdentity::new("lists", "1");
        {
            let db = LocalDatabase::open(dir.path()).unwrap();
            db.transaction::<_, StorageError, _>(|state| {
                state.put_row(&id, row(1));
                Ok(())
            })
            .unwrap();
        }
        let reopened = LocalDatabase::open(dir.path()).unwrap();
        assert!(reopened.read(|s| s.has_row(&id)));
        assert!(reopened.is_durable());
    }
}
