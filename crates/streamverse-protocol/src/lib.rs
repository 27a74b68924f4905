pub mod channel;
pub mod directory;
pub mod error;
pub mod http;
pub mod messaging;
pub mod serde_b64;

pub use channel::{BundleCallback, MemoryChannel, MessageChannel, Subscription};
pub use directory::{MemoryDirectory, RecipientDirectory};
pub use error::ProtocolError;
pub use http::{StaticToken, TokenProvider, WatchPartyClient};
pub use messaging::{DecryptOutcome, Envelope, MessageBundle, PublishAck, RosterEntry, WatchParty};
