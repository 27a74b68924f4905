use std::time::{SystemTime, UNIX_EPOCH};

use streamverse_crypto::keypair::{fingerprint, parse_public_key};
use streamverse_crypto::MessageKey;

use crate::error::ProtocolError;
use crate::messaging::envelope::Envelope;

/// The per-recipient part of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeFields {
    pub encrypted_payload: Vec<u8>,
    pub encrypted_symmetric_key: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Message-scoped encryption context.
///
/// Holds one symmetric key and nonce for a single logical message, with the
/// payload already encrypted under them. Each call to
/// [`OutgoingMessage::encrypt_for_recipient`] only seals the key to another
/// recipient, so every envelope of the bundle shares the same ciphertext.
pub struct OutgoingMessage {
    key: MessageKey,
    encrypted_payload: Vec<u8>,
}

impl OutgoingMessage {
    pub fn new(plaintext: &str) -> Result<Self, ProtocolError> {
        let key = MessageKey::generate();
        let encrypted_payload = key.encrypt(plaintext.as_bytes())?;
        Ok(Self {
            key,
            encrypted_payload,
        })
    }

    pub fn encrypt_for_recipient(
        &self,
        recipient_public_key: &[u8],
    ) -> Result<EnvelopeFields, ProtocolError> {
        let recipient = parse_public_key(recipient_public_key)?;
        Ok(EnvelopeFields {
            encrypted_payload: self.encrypted_payload.clone(),
            encrypted_symmetric_key: self.key.seal_for(&recipient)?,
            nonce: self.key.nonce().to_vec(),
        })
    }

    pub fn envelope_for(
        &self,
        recipient_public_key: &[u8],
        sender_id: &str,
        timestamp: u64,
    ) -> Result<Envelope, ProtocolError> {
        let fields = self.encrypt_for_recipient(recipient_public_key)?;
        Ok(Envelope {
            encrypted_payload: fields.encrypted_payload,
            encrypted_symmetric_key: fields.encrypted_symmetric_key,
            nonce: fields.nonce,
            recipient_public_key: recipient_public_key.to_vec(),
            sender_id: sender_id.to_string(),
            timestamp,
        })
    }
}

/// Encrypt `plaintext` once and produce one envelope per distinct recipient.
///
/// Recipient keys that cannot be sealed to (wrong length, low-order points)
/// are skipped so one bad roster entry never blocks the rest. Fails only if
/// no usable recipient remains.
pub fn build_bundle(
    plaintext: &str,
    recipients: &[Vec<u8>],
    sender_id: &str,
    timestamp: u64,
) -> Result<Vec<Envelope>, ProtocolError> {
    let message = OutgoingMessage::new(plaintext)?;
    let mut envelopes: Vec<Envelope> = Vec::with_capacity(recipients.len());

    for recipient in recipients {
        if envelopes.iter().any(|e| &e.recipient_public_key == recipient) {
            continue;
        }
        match message.envelope_for(recipient, sender_id, timestamp) {
            Ok(envelope) => envelopes.push(envelope),
            Err(ProtocolError::CryptoError(e)) => {
                tracing::warn!(
                    recipient = %fingerprint(recipient),
                    error = %e,
                    "skipping unusable recipient key"
                );
            }
            Err(e) => return Err(e),
        }
    }

    if envelopes.is_empty() {
        return Err(ProtocolError::InvalidBundle("no valid recipients".into()));
    }

    tracing::debug!(
        sender = sender_id,
        recipients = envelopes.len(),
        payload_len = message.encrypted_payload.len(),
        "bundle built"
    );
    Ok(envelopes)
}

/// Current Unix time in milliseconds.
pub fn timestamp_now() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}
