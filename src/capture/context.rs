//! Write origin

/// Who is writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// The application
    Local,
    /// The sync engine applying remote state
    Remote,
}

/// Context every write runs under
///
/// Remote-origin writes are the engine replaying what the remote already
/// has: they are never captured and never permission-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteContext {
    origin: WriteOrigin,
}

impl WriteContext {
    /// Application write
    pub fn local() -> Self {
        Self {
            origin: WriteOrigin::Local,
        }
    }

    /// Engine write of remote state
    pub fn remote() -> Self {
        Self {
            origin: WriteOrigin::Remote,
        }
    }

    /// Origin of the write
    pub fn origin(&self) -> WriteOrigin {
        self.origin
    }

    /// Whether the write is recorded as a pending change
    pub fn captures(&self) -> bool {
        self.origin == WriteOrigin::Local
    }

    /// Whether share permissions are checked
    pub fn enforces_permissions(&self) -> bool {
        self.origin == WriteOrigin::Local
    }

    /// Whether the write replays remote state
    pub fn is_remote(&self) -> bool {
        self.origin == WriteOrigin::Remote
    }
}
