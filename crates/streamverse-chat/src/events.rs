use serde::Serialize;

use crate::session::{HistoryEntry, SessionState, SessionWarning};

/// Events streamed from a chat session to its UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum ChatEvent {
    /// The full, ordered history after a snapshot was applied.
    HistoryUpdated {
        conversation_id: String,
        entries: Vec<HistoryEntry>,
    },
    /// A non-fatal problem; the session keeps running in degraded mode.
    Warning {
        conversation_id: String,
        warning: SessionWarning,
    },
    StateChanged {
        conversation_id: String,
        state: SessionState,
    },
}
