use std::sync::Arc;

use streamverse_protocol::{MemoryChannel, MemoryDirectory};

/// Central state for the relay process.
pub struct RelayState {
    /// Watch-party metadata and key rosters.
    pub directory: MemoryDirectory,
    /// Append-only message bundles per watch party.
    pub channel: MemoryChannel,
    /// Bearer token required on API routes; `None` disables auth.
    pub auth_token: Option<String>,
}

pub type SharedState = Arc<RelayState>;

impl RelayState {
    pub fn new(auth_token: Option<String>) -> Self {
        Self {
            directory: MemoryDirectory::new(),
            channel: MemoryChannel::new(),
            auth_token,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}
