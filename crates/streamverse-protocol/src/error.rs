use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The directory rejected our bearer token; the caller should sign out.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("crypto error: {0}")]
    CryptoError(String),
}

impl From<streamverse_crypto::CryptoError> for ProtocolError {
    fn from(e: streamverse_crypto::CryptoError) -> Self {
        Self::CryptoError(e.to_string())
    }
}
