pub mod memory;

use async_trait::async_trait;
use streamverse_crypto::keypair::parse_public_key;

use crate::error::ProtocolError;
use crate::messaging::envelope::{RosterEntry, WatchParty};
use crate::serde_b64;

pub use memory::MemoryDirectory;

/// Remote roster of participant public keys, one entry per user per watch party.
///
/// Publishing is last-write-wins per user: each user owns exactly one entry
/// and re-publishes it every time they open the conversation.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Watch-party metadata (title, pinned movies).
    async fn fetch_metadata(&self, conversation_id: &str) -> Result<WatchParty, ProtocolError>;

    /// All currently registered public keys. Empty if nobody registered yet.
    async fn fetch_roster(&self, conversation_id: &str) -> Result<Vec<Vec<u8>>, ProtocolError>;

    /// Register or overwrite `user_id`'s public key for the conversation.
    async fn publish_key(
        &self,
        conversation_id: &str,
        user_id: &str,
        public_key: &[u8],
    ) -> Result<(), ProtocolError>;
}

/// Check that `key` is an X25519 public key that envelopes can be sealed to.
pub fn validate_public_key(key: &[u8]) -> Result<(), ProtocolError> {
    parse_public_key(key)?;
    Ok(())
}

/// Extract usable keys from roster entries, in roster order.
///
/// Entries without a key, with an undecodable key, or with a key that fails
/// [`validate_public_key`] are skipped, and duplicate keys are collapsed.
pub fn roster_keys(entries: &[RosterEntry]) -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(encoded) = entry.public_key.as_deref() else {
            continue;
        };
        let key = match serde_b64::decode(encoded) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(user = %entry.user_id, error = %e, "ignoring undecodable roster key");
                continue;
            }
        };
        if let Err(e) = validate_public_key(&key) {
            tracing::debug!(user = %entry.user_id, error = %e, "ignoring unusable roster key");
            continue;
        }
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
