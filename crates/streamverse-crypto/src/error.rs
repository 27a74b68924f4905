use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionError(String),

    #[error("decryption failed: {0}")]
    DecryptionError(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The local key persistence layer could not be read or written.
    #[error("key storage unavailable: {0}")]
    StorageUnavailable(String),
}
