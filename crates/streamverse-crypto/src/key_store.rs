use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CryptoError;
use crate::keychain::{Keychain, KEY_X25519_PRIVATE, KEY_X25519_PUBLIC, VAULT_IDENTITY};
use crate::keypair::Keypair;

/// Owner of the device keypair.
///
/// Generates the keypair on first use, persists both halves through the
/// [`Keychain`], and hands out the same keypair on every later call. One
/// `KeyStore` is shared by every open conversation; after [`KeyStore::init`]
/// it is effectively read-only.
pub struct KeyStore {
    keychain: Arc<dyn Keychain>,
    cached: Mutex<Option<Keypair>>,
}

impl KeyStore {
    pub fn new(keychain: Arc<dyn Keychain>) -> Self {
        Self {
            keychain,
            cached: Mutex::new(None),
        }
    }

    /// Load or create the keypair and keep it cached for the store's lifetime.
    pub fn init(&self) -> Result<Keypair, CryptoError> {
        self.get_or_create_keypair()
    }

    /// Return the persisted keypair, generating and persisting one if absent.
    ///
    /// A stored keypair that is malformed or whose halves do not match is
    /// replaced. Keychain failures surface as
    /// [`CryptoError::StorageUnavailable`].
    pub fn get_or_create_keypair(&self) -> Result<Keypair, CryptoError> {
        let mut cached = self.cached.lock();
        if let Some(keypair) = cached.as_ref() {
            return Ok(keypair.clone());
        }

        let keypair = match self.load_persisted()? {
            Some(keypair) => {
                tracing::debug!(key = %keypair.fingerprint(), "loaded persisted keypair");
                keypair
            }
            None => {
                let keypair = Keypair::generate();
                self.persist(&keypair)?;
                tracing::info!(key = %keypair.fingerprint(), "generated new keypair");
                keypair
            }
        };

        *cached = Some(keypair.clone());
        Ok(keypair)
    }

    /// Drop the cached keypair. The persisted copy is untouched.
    pub fn dispose(&self) {
        *self.cached.lock() = None;
    }

    fn load_persisted(&self) -> Result<Option<Keypair>, CryptoError> {
        let public = self
            .keychain
            .load_key(VAULT_IDENTITY, KEY_X25519_PUBLIC)
            .map_err(into_storage_error)?;
        let secret = self
            .keychain
            .load_key(VAULT_IDENTITY, KEY_X25519_PRIVATE)
            .map_err(into_storage_error)?;

        let (Some(public), Some(secret)) = (public, secret) else {
            return Ok(None);
        };

        match Keypair::from_parts(&public, &secret) {
            Ok(keypair) => Ok(Some(keypair)),
            Err(e) => {
                tracing::warn!(error = %e, "persisted keypair is unusable, regenerating");
                Ok(None)
            }
        }
    }

    fn persist(&self, keypair: &Keypair) -> Result<(), CryptoError> {
        // Private half first: a crash in between leaves no public key, which
        // reads as "absent" and regenerates.
        self.keychain
            .store_key(VAULT_IDENTITY, KEY_X25519_PRIVATE, &keypair.secret_key_bytes())
            .map_err(into_storage_error)?;
        self.keychain
            .store_key(VAULT_IDENTITY, KEY_X25519_PUBLIC, &keypair.public_key_bytes())
            .map_err(into_storage_error)
    }
}

fn into_storage_error(e: CryptoError) -> CryptoError {
    match e {
        CryptoError::StorageUnavailable(_) => e,
        other => CryptoError::StorageUnavailable(other.to_string()),
    }
}
