//! Notifications the engine reacts to

use crate::record::{Partition, ShareMetadata, ZoneId};

/// Why the remote deleted a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneDeletionReason {
    /// The user deleted the zone on another device
    UserDeleted,
    /// The user purged their data
    Purged,
    /// Encrypted data was reset; the records must be uploaded again
    EncryptedDataReset,
}

impl ZoneDeletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneDeletionReason::UserDeleted => "user_deleted",
            ZoneDeletionReason::Purged => "purged",
            ZoneDeletionReason::EncryptedDataReset => "encrypted_data_reset",
        }
    }
}

/// Event delivered to `SyncEngine::handle`
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Local writes were captured
    LocalChangesPending,
    /// The remote reported new changes in a partition
    RemoteChangesAvailable { partition: Partition },
    /// The account signed in, out or changed
    AccountStatusChanged,
    /// A zone was deleted remotely
    ZoneDeleted {
        partition: Partition,
        zone: ZoneId,
        reason: ZoneDeletionReason,
    },
    /// The user accepted a share invitation
    ShareAccepted(ShareMetadata),
}
