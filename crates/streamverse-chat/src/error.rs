use thiserror::Error;

use streamverse_crypto::CryptoError;
use streamverse_protocol::ProtocolError;

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The key store could not load or persist the keypair. Chat cannot run.
    #[error("key storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("could not subscribe to messages: {0}")]
    SubscribeFailed(#[source] ProtocolError),

    /// Nothing was added to the history; the send may be retried.
    #[error("failed to publish message: {0}")]
    PublishFailed(#[source] ProtocolError),

    #[error("failed to fetch roster: {0}")]
    RosterFetchFailed(#[source] ProtocolError),

    #[error("Please enter a message")]
    EmptyMessage,

    #[error("session is {0}")]
    InvalidState(SessionState),
}

impl From<CryptoError> for ChatError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::StorageUnavailable(msg) => Self::StorageUnavailable(msg),
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}
