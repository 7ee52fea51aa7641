//! Zones and partitions
//!
//! The remote store is split into two databases: the private one, owned by
//! the current user, and the shared one, holding zones other users shared
//! with us. Each database is divided into zones.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Owner name used for zones the current user owns
pub const DEFAULT_OWNER: &str = "__default_owner__";

/// Name of the zone every private root record lives in
pub const DEFAULT_ZONE_NAME: &str = "aerosync";

/// Remote zone identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId {
    /// Zone name
    pub name: String,
    /// Owner of the zone
    pub owner: String,
}

impl ZoneId {
    /// Create a zone identifier
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// The private default zone
    pub fn default_zone() -> Self {
        Self::new(DEFAULT_ZONE_NAME, DEFAULT_OWNER)
    }

    /// Whether the current user owns this zone
    pub fn is_owned(&self) -> bool {
        self.owner == DEFAULT_OWNER
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::default_zone()
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Remote database a record is synchronized with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Records owned by the current user
    Private,
    /// Records in zones shared with the current user
    Shared,
}

impl Partition {
    /// Both partitions, private first
    pub const ALL: [Partition; 2] = [Partition::Private, Partition::Shared];

    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Private => "private",
            Partition::Shared => "shared",
        }
    }
}

impl Default for Partition {
    fn default() -> Self {
        Partition::Private
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
