use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;

use streamverse_crypto::keychain::storage_key;
use streamverse_crypto::{CryptoError, Keychain};

/// Keychain persisted as a JSON object of base64 strings.
///
/// Keys are stored flat as `"vault/key"`, e.g. `"identity/x25519_public"`.
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so a crash never leaves a half-written file behind.
pub struct FileKeychain {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileKeychain {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, CryptoError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(storage_error(&self.path, &e)),
        };
        serde_json::from_slice(&raw).map_err(|e| storage_error(&self.path, &e))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), CryptoError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(parent, &e))?;
        }
        let json = serde_json::to_vec_pretty(entries).map_err(|e| storage_error(&self.path, &e))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| storage_error(&tmp, &e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, &e))
    }
}

fn storage_error(path: &Path, e: &dyn std::fmt::Display) -> CryptoError {
    CryptoError::StorageUnavailable(format!("{}: {e}", path.display()))
}

impl Keychain for FileKeychain {
    fn store_key(&self, vault: &str, key: &str, data: &[u8]) -> Result<(), CryptoError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(storage_key(vault, key), STANDARD.encode(data));
        self.write_all(&entries)
    }

    fn load_key(&self, vault: &str, key: &str) -> Result<Option<Vec<u8>>, CryptoError> {
        let _guard = self.lock.lock();
        let entries = self.read_all()?;
        let Some(encoded) = entries.get(&storage_key(vault, key)) else {
            return Ok(None);
        };
        match STANDARD.decode(encoded) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                // Unreadable value: report it as absent so the key is regenerated.
                tracing::warn!(vault, key, error = %e, "stored key is not valid base64");
                Ok(None)
            }
        }
    }

    fn delete_key(&self, vault: &str, key: &str) -> Result<(), CryptoError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        if entries.remove(&storage_key(vault, key)).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}
