//! HTTP relay for Streamverse watch-party chat.
//!
//! Serves the watch-party REST contract (metadata, key roster, message
//! bundles) over in-memory stores. The relay only ever sees ciphertext
//! envelopes and public keys.

pub mod auth;
pub mod error;
pub mod routes;
pub mod server_state;

pub use routes::{router, BASE_PATH};
pub use server_state::{RelayState, SharedState};
