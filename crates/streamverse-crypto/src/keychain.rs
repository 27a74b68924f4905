use std::collections::HashMap;

use parking_lot::Mutex;

use crate::CryptoError;

/// Trait for key storage — abstracts over the actual backend.
///
/// The chat client implements this with a file of base64 values; tests use
/// [`MemoryKeychain`]. Backends report I/O problems as
/// [`CryptoError::StorageUnavailable`].
pub trait Keychain: Send + Sync {
    /// Store a key under a vault/key pair.
    fn store_key(&self, vault: &str, key: &str, data: &[u8]) -> Result<(), CryptoError>;

    /// Retrieve a key from a vault/key pair.
    fn load_key(&self, vault: &str, key: &str) -> Result<Option<Vec<u8>>, CryptoError>;

    /// Delete a key from a vault/key pair.
    fn delete_key(&self, vault: &str, key: &str) -> Result<(), CryptoError>;

    /// Check if a key exists.
    fn key_exists(&self, vault: &str, key: &str) -> Result<bool, CryptoError> {
        Ok(self.load_key(vault, key)?.is_some())
    }
}

/// Vault for identity keys.
pub const VAULT_IDENTITY: &str = "identity";
/// X25519 public key published to watch-party rosters.
pub const KEY_X25519_PUBLIC: &str = "x25519_public";
/// X25519 private key used to open sealed message keys.
pub const KEY_X25519_PRIVATE: &str = "x25519_private";

/// Storage key used by flat key-value backends.
pub fn storage_key(vault: &str, key: &str) -> String {
    format!("{vault}/{key}")
}

/// In-memory keychain.
///
/// **WARNING**: Data is lost on process exit. Suitable for tests and for
/// ephemeral sessions only.
#[derive(Default)]
pub struct MemoryKeychain {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keychain for MemoryKeychain {
    fn store_key(&self, vault: &str, key: &str, data: &[u8]) -> Result<(), CryptoError> {
        self.entries
            .lock()
            .insert(storage_key(vault, key), data.to_vec());
        Ok(())
    }

    fn load_key(&self, vault: &str, key: &str) -> Result<Option<Vec<u8>>, CryptoError> {
        Ok(self.entries.lock().get(&storage_key(vault, key)).cloned())
    }

    fn delete_key(&self, vault: &str, key: &str) -> Result<(), CryptoError> {
        self.entries.lock().remove(&storage_key(vault, key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_load_delete() {
        let keychain = MemoryKeychain::new();
        assert!(!keychain.key_exists(VAULT_IDENTITY, KEY_X25519_PRIVATE).unwrap());

        keychain
            .store_key(VAULT_IDENTITY, KEY_X25519_PRIVATE, &[9u8; 32])
            .unwrap();
        assert_eq!(
            keychain.load_key(VAULT_IDENTITY, KEY_X25519_PRIVATE).unwrap(),
            Some(vec![9u8; 32])
        );

        keychain.delete_key(VAULT_IDENTITY, KEY_X25519_PRIVATE).unwrap();
        assert!(!keychain.key_exists(VAULT_IDENTITY, KEY_X25519_PRIVATE).unwrap());
    }

    #[test]
    fn vaults_are_separate() {
        let keychain = MemoryKeychain::new();
        keychain.store_key("a", "k", b"one").unwrap();
        keychain.store_key("b", "k", b"two").unwrap();
        assert_eq!(keychain.load_key("a", "k").unwrap(), Some(b"one".to_vec()));
        assert_eq!(keychain.load_key("b", "k").unwrap(), Some(b"two".to_vec()));
    }
}
