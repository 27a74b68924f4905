pub mod config;
pub mod error;
pub mod events;
pub mod keystore;
pub mod session;

pub use config::SessionConfig;
pub use error::ChatError;
pub use events::ChatEvent;
pub use keystore::FileKeychain;
pub use session::{ChatSession, HistoryEntry, SessionState, SessionWarning};
