//! Anonymous sealed boxes.
//!
//! Encrypts a short secret to a recipient's X25519 public key without
//! authenticating the sender. Each seal uses a fresh ephemeral keypair:
//!
//! ```text
//! shared = X25519(ephemeral_secret, recipient_public)
//! okm    = HKDF-SHA256(ikm = shared, info = LABEL || ephemeral_pk || recipient_pk)
//! key    = okm[..32], nonce = okm[32..56]
//! output = ephemeral_pk (32) || XChaCha20-Poly1305(key, nonce, plaintext)
//! ```
//!
//! Binding both public keys into the HKDF info ties the derived key to this
//! exact (sender ephemeral, recipient) pair, so the nonce can be derived rather
//! than transmitted.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keypair::{Keypair, KEY_LEN};

const LABEL: &[u8] = b"streamverse-sealed-box-v1";
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Bytes a sealed box adds on top of its plaintext.
pub const SEAL_OVERHEAD: usize = KEY_LEN + TAG_LEN;

/// Seal `plaintext` so only the holder of `recipient`'s private key can open it.
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let (cipher, nonce) = derive(&shared, &ephemeral_public, recipient)
        .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

    let mut output = Vec::with_capacity(KEY_LEN + ciphertext.len());
    output.extend_from_slice(ephemeral_public.as_bytes());
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Open a box produced by [`seal`] with the recipient's keypair.
pub fn open(keypair: &Keypair, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(CryptoError::DecryptionError("sealed box too short".into()));
    }

    let (ephemeral_bytes, ciphertext) = sealed.split_at(KEY_LEN);
    let mut ephemeral = [0u8; KEY_LEN];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_public = PublicKey::from(ephemeral);

    let shared = keypair.secret().diffie_hellman(&ephemeral_public);
    let (cipher, nonce) = derive(&shared, &ephemeral_public, keypair.public_key())
        .map_err(|e| CryptoError::DecryptionError(e.to_string()))?;

    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|e| CryptoError::DecryptionError(e.to_string()))
}

fn derive(
    shared: &SharedSecret,
    ephemeral_public: &PublicKey,
    recipient: &PublicKey,
) -> Result<(XChaCha20Poly1305, XNonce), CryptoError> {
    // Low-order points yield an all-zero secret.
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("non-contributory key exchange".into()));
    }

    let mut info = Vec::with_capacity(LABEL.len() + 2 * KEY_LEN);
    info.extend_from_slice(LABEL);
    info.extend_from_slice(ephemeral_public.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = Zeroizing::new([0u8; KEY_LEN + NONCE_LEN]);
    hk.expand(&info, &mut okm[..])
        .map_err(|e| CryptoError::InvalidKey(format!("hkdf expand: {e}")))?;

    let cipher = XChaCha20Poly1305::new_from_slice(&okm[..KEY_LEN])
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let nonce = XNonce::clone_from_slice(&okm[KEY_LEN..]);
    Ok((cipher, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let recipient = Keypair::generate();
        let sealed = seal(recipient.public_key(), b"symmetric key bytes").unwrap();
        assert_eq!(sealed.len(), SEAL_OVERHEAD + b"symmetric key bytes".len());

        let opened = open(&recipient, &sealed).unwrap();
        assert_eq!(opened, b"symmetric key bytes");
    }

    #[test]
    fn seals_are_randomised() {
        let recipient = Keypair::generate();
        let a = seal(recipient.public_key(), &[7u8; 32]).unwrap();
        let b = seal(recipient.public_key(), &[7u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let alice = Keypair::generate();
        let mallory = Keypair::generate();
        let sealed = seal(alice.public_key(), b"for alice").unwrap();
        assert!(open(&mallory, &sealed).is_err());
    }

    #[test]
    fn tampered_box_rejected() {
        let recipient = Keypair::generate();
        let mut sealed = seal(recipient.public_key(), b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&recipient, &sealed).is_err());
    }

    #[test]
    fn short_box_rejected() {
        let recipient = Keypair::generate();
        assert!(open(&recipient, &[0u8; SEAL_OVERHEAD - 1]).is_err());
    }

    #[test]
    fn low_order_ephemeral_rejected() {
        let recipient = Keypair::generate();
        // The identity point as ephemeral key forces an all-zero shared secret.
        let forged = vec![0u8; SEAL_OVERHEAD + 4];
        assert!(matches!(
            open(&recipient, &forged),
            Err(CryptoError::DecryptionError(_))
        ));
    }
}
