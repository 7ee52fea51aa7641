//! Durable state file
//!
//! `<data_dir>/aerosync.state` holds the whole database image:
//!
//! ```text
//! | magic "ASYN" (4) | version u16 LE | payload len u64 LE | crc32 u32 LE | JSON payload |
//! ```
//!
//! Writes go to a temporary file, are fsynced, then renamed over the
//! previous file and the directory is fsynced. A reader therefore sees
//! either the previous commit or the new one. Every read verifies the
//! checksum; a mismatch is fatal.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;

use super::errors::{StorageError, StorageResult};
use super::state::DatabaseState;

/// State file name inside the data directory
pub const STATE_FILE_NAME: &str = "aerosync.state";

const MAGIC: &[u8; 4] = b"ASYN";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 8 + 4;

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Handle on the state file of a data directory
#[derive(Debug, Clone)]
pub struct StateFile {
    dir: PathBuf,
    path: PathBuf,
}

impl StateFile {
    /// State file of `data_dir`; creates the directory if missing
    pub fn open(data_dir: &Path) -> StorageResult<Self> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).map_err(|e| {
                StorageError::write_failed(
                    format!("Failed to create data directory: {}", data_dir.display()),
                    e,
                )
            })?;
        }
        Ok(Self {
            dir: data_dir.to_path_buf(),
            path: data_dir.join(STATE_FILE_NAME),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a committed state exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the last committed state, or an empty one if none exists
    pub fn load(&self) -> StorageResult<DatabaseState> {
        if !self.exists() {
            return Ok(DatabaseState::new());
        }

        let mut bytes = Vec::new();
        File::open(&self.path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| {
                StorageError::io_error(
                    format!("Failed to read state file: {}", self.path.display()),
                    e,
                )
            })?;

        decode(&bytes)
    }

    /// Durably replace the committed state
    pub fn store(&self, state: &DatabaseState) -> StorageResult<()> {
        let bytes = encode(state)?;
        let tmp = self.path.with_extension("state.tmp");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| {
                StorageError::write_failed(format!("Failed to open {}", tmp.display()), e)
            })?;
        file.write_all(&bytes)
            .map_err(|e| StorageError::write_failed("Failed to write state", e))?;
        file.sync_all()
            .map_err(|e| StorageError::write_failed("Failed to fsync state", e))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .map_err(|e| StorageError::write_failed("Failed to publish state", e))?;
        fsync_dir(&self.dir)
    }
}

fn fsync_dir(dir: &Path) -> StorageResult<()> {
    // Directory handles cannot be opened for sync on every platform
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

/// Encode a state image with header and checksum
pub fn encode(state: &DatabaseState) -> StorageResult<Vec<u8>> {
    let payload = serde_json::to_vec(state)
        .map_err(|e| StorageError::encode_failed(format!("Failed to encode state: {}", e)))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&compute_checksum(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode and verify a state image
pub fn decode(bytes: &[u8]) -> StorageResult<DatabaseState> {
    if bytes.len() < HEADER_LEN {
        return Err(StorageError::corrupted("state file shorter than header"));
    }
    if &bytes[0..4] != MAGIC {
        return Err(StorageError::corrupted("bad magic"));
    }

    let mut version = [0u8; 2];
    version.copy_from_slice(&bytes[4..6]);
    let version = u16::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(StorageError::corrupted(format!(
            "unsupported format version {}",
            version
        )));
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[6..14]);
    let len = u64::from_le_bytes(len) as usize;

    let mut crc = [0u8; 4];
    crc.copy_from_slice(&bytes[14..18]);
    let expected = u32::from_le_bytes(crc);

    let payload = &bytes[HEADER_LEN..];
    if payload.len() != len {
        return Err(StorageError::corrupted(format!(
            "payload length {} does not match header {}",
            payload.len(),
            len
        )));
    }
    if compute_checksum(payload) != expected {
        return Err(StorageError::corrupted("checksum mismatch"));
    }

    serde_json::from_slice(payload)
        .map_err(|e| StorageError::corrupted(format!("undecodable payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordIdentity;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_state() -> DatabaseState {
        let mut state = DatabaseState::new();
        let mut row = crate::record::Row::new();
        row.insert("id".into(), json!(1));
        row.insert("title".into(), json!("groceries"));
        state.put_row(&RecordIdentity::new("lists", "1"), row);
        state.sync.clock.tick(0);
        state
    }

    #[test]
    fn test_store_and_load() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::open(dir.path()).unwrap();
        assert!(!file.exists());
        assert_eq!(file.load().unwrap(), DatabaseState::new());

        let state = sample_state();
        file.store(&state).unwrap();
        assert!(file.exists());
        assert_eq!(file.load().unwrap(), state);
    }

    #[test]
    fn test_checksum_mismatch_is_fatal() {
        let mut bytes = encode(&sample_state()).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x20;
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_file_is_fatal() {
        let bytes = encode(&sample_state()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).unwrap_err().is_fatal());
        assert!(decode(&bytes[..5]).unwrap_err().is_fatal());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample_state()).unwrap();
        bytes[0] = b'X';
        assert_eq!(decode(&bytes).unwrap_err().message(), "bad magic");
    }
}
