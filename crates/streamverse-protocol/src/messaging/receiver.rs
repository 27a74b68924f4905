use std::fmt;

use serde::{Deserialize, Serialize};
use streamverse_crypto::keypair::fingerprint;
use streamverse_crypto::{Keypair, MessageKey};

use crate::messaging::envelope::Envelope;

/// Result of decoding a bundle for the local user.
///
/// Neither sentinel is an error: bundles published before the user joined
/// carry no envelope for them, and a corrupt envelope must not stop the rest
/// of the conversation from rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "camelCase")]
pub enum DecryptOutcome {
    Plaintext(String),
    /// No envelope in the bundle is addressed to the local public key.
    NotForMe,
    /// An envelope was addressed to us but could not be opened.
    DecryptionFailed,
}

impl DecryptOutcome {
    pub fn is_plaintext(&self) -> bool {
        matches!(self, Self::Plaintext(_))
    }

    /// Text to render for this outcome.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Plaintext(text) => text,
            Self::NotForMe => "[No message for you]",
            Self::DecryptionFailed => "[Decryption failed]",
        }
    }
}

impl fmt::Display for DecryptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_text())
    }
}

/// Find the envelope of `bundle` addressed to `public_key`.
pub fn find_own_envelope<'a>(bundle: &'a [Envelope], public_key: &[u8]) -> Option<&'a Envelope> {
    bundle
        .iter()
        .find(|envelope| envelope.recipient_public_key == public_key)
}

/// Decrypt the local user's copy of a bundle.
///
/// 1. Find the envelope addressed to our public key
/// 2. Open the sealed message key with our keypair
/// 3. Decrypt the payload with the recovered key and the stored nonce
pub fn decrypt_own_envelope(bundle: &[Envelope], keypair: &Keypair) -> DecryptOutcome {
    let own_key = keypair.public_key_bytes();
    let Some(envelope) = find_own_envelope(bundle, &own_key) else {
        tracing::trace!(envelopes = bundle.len(), "bundle not addressed to us");
        return DecryptOutcome::NotForMe;
    };

    let key = match MessageKey::open(keypair, &envelope.encrypted_symmetric_key, &envelope.nonce)
    {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!(
                sender = %envelope.sender_id,
                recipient = %fingerprint(&own_key),
                error = %e,
                "could not open message key"
            );
            return DecryptOutcome::DecryptionFailed;
        }
    };

    let plaintext = match key.decrypt(&envelope.encrypted_payload) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::debug!(sender = %envelope.sender_id, error = %e, "payload decryption failed");
            return DecryptOutcome::DecryptionFailed;
        }
    };

    match String::from_utf8(plaintext) {
        Ok(text) => DecryptOutcome::Plaintext(text),
        Err(_) => {
            tracing::debug!(sender = %envelope.sender_id, "payload is not UTF-8");
            DecryptOutcome::DecryptionFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::sender::{build_bundle, OutgoingMessage};

    fn key_of(keypair: &Keypair) -> Vec<u8> {
        keypair.public_key_bytes().to_vec()
    }

    #[test]
    fn round_trip_single_recipient() {
        let bob = Keypair::generate();
        let envelope = OutgoingMessage::new("hello")
            .unwrap()
            .envelope_for(&key_of(&bob), "alice", 1)
            .unwrap();
        assert_eq!(
            decrypt_own_envelope(&[envelope], &bob),
            DecryptOutcome::Plaintext("hello".into())
        );
    }

    #[test]
    fn round_trip_unicode_and_empty() {
        let bob = Keypair::generate();
        for text in ["", "🍿 intermission — back in 5", "ünïcödé"] {
            let bundle = build_bundle(text, &[key_of(&bob)], "alice", 1).unwrap();
            assert_eq!(
                decrypt_own_envelope(&bundle, &bob),
                DecryptOutcome::Plaintext(text.into())
            );
        }
    }

    #[test]
    fn other_keypair_sees_not_for_me() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let bundle = build_bundle("for alice", &[key_of(&alice)], "alice", 1).unwrap();
        assert_eq!(decrypt_own_envelope(&bundle, &bob), DecryptOutcome::NotForMe);
    }

    #[test]
    fn fan_out_each_recipient_reads_same_text() {
        let roster: Vec<Keypair> = (0..4).map(|_| Keypair::generate()).collect();
        let keys: Vec<Vec<u8>> = roster.iter().map(key_of).collect();
        let bundle = build_bundle("movie starts now", &keys, "host", 5).unwrap();
        assert_eq!(bundle.len(), roster.len());

        for member in &roster {
            assert_eq!(
                decrypt_own_envelope(&bundle, member),
                DecryptOutcome::Plaintext("movie starts now".into())
            );
        }
    }

    #[test]
    fn envelope_only_opens_for_its_recipient() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let bundle = build_bundle("x", &[key_of(&alice), key_of(&bob)], "alice", 1).unwrap();

        // Re-address Alice's copy to Bob: Bob finds it but cannot open it.
        let mut forged = bundle[0].clone();
        forged.recipient_public_key = key_of(&bob);
        assert_eq!(
            decrypt_own_envelope(&[forged], &bob),
            DecryptOutcome::DecryptionFailed
        );
    }

    #[test]
    fn corrupted_payload_is_contained() {
        let bob = Keypair::generate();
        let mut bundle = build_bundle("hello", &[key_of(&bob)], "alice", 1).unwrap();
        bundle[0].encrypted_payload[0] ^= 0xff;
        assert_eq!(
            decrypt_own_envelope(&bundle, &bob),
            DecryptOutcome::DecryptionFailed
        );
    }

    #[test]
    fn wrong_nonce_is_contained() {
        let bob = Keypair::generate();
        let mut bundle = build_bundle("hello", &[key_of(&bob)], "alice", 1).unwrap();
        bundle[0].nonce = vec![0u8; 24];
        assert_eq!(
            decrypt_own_envelope(&bundle, &bob),
            DecryptOutcome::DecryptionFailed
        );

        bundle[0].nonce = vec![0u8; 3];
        assert_eq!(
            decrypt_own_envelope(&bundle, &bob),
            DecryptOutcome::DecryptionFailed
        );
    }

    #[test]
    fn empty_bundle_is_not_for_me() {
        let bob = Keypair::generate();
        assert_eq!(decrypt_own_envelope(&[], &bob), DecryptOutcome::NotForMe);
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(DecryptOutcome::Plaintext("hi".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "plaintext", "text": "hi"}));
        let json = serde_json::to_value(DecryptOutcome::NotForMe).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "notForMe"}));
    }

    #[test]
    fn placeholders() {
        assert_eq!(DecryptOutcome::NotForMe.to_string(), "[No message for you]");
        assert_eq!(DecryptOutcome::DecryptionFailed.to_string(), "[Decryption failed]");
        assert!(DecryptOutcome::Plaintext("x".into()).is_plaintext());
    }
}
