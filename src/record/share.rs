//! Share handles
//!
//! A share is attached to a root record and covers its whole hierarchy.
//! The handle carries the current user's permission so local writes can be
//! checked without a remote round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::RecordIdentity;
use super::zone::ZoneId;

/// Permission the current user holds on a shared hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    /// Participant may read only
    ReadOnly,
    /// Owner, or participant with write access
    ReadWrite,
}

impl SharePermission {
    /// Whether writes are allowed
    pub fn allows_write(&self) -> bool {
        matches!(self, SharePermission::ReadWrite)
    }
}

/// Share attached to a root record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareHandle {
    /// Remote share identifier
    pub id: Uuid,
    /// Root record the share was created for
    pub root: RecordIdentity,
    /// Zone holding the shared hierarchy
    pub zone: ZoneId,
    /// Owner of the shared hierarchy
    pub owner: String,
    /// Permission of the current user
    pub permission: SharePermission,
    /// When the share was created
    pub created_at: DateTime<Utc>,
}

impl ShareHandle {
    /// Create a handle owned by the current user
    pub fn owned(root: RecordIdentity, zone: ZoneId) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: zone.owner.clone(),
            root,
            zone,
            permission: SharePermission::ReadWrite,
            created_at: Utc::now(),
        }
    }

    /// Whether the current user may write into the hierarchy
    pub fn allows_write(&self) -> bool {
        self.permission.allows_write()
    }
}

/// Invitation metadata used to accept a share from another user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMetadata {
    /// Remote share identifier
    pub share_id: Uuid,
    /// Root record of the shared hierarchy
    pub root: RecordIdentity,
    /// Zone holding the shared hierarchy
    pub zone: ZoneId,
    /// Permission granted to the current user
    pub permission: SharePermission,
}
