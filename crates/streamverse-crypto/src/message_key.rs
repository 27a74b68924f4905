use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::PublicKey;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::keypair::Keypair;
use crate::sealed_box;

/// Symmetric key length (XChaCha20-Poly1305).
pub const KEY_LEN: usize = 32;
/// Nonce length (XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Per-message symmetric key and nonce.
///
/// One `MessageKey` is generated for each logical chat message. The payload is
/// encrypted once under it, and the key itself is sealed separately to every
/// recipient's public key, so all envelopes of a bundle decrypt to the same
/// bytes. The nonce travels in the clear next to the ciphertext.
#[derive(ZeroizeOnDrop)]
pub struct MessageKey {
    key: [u8; KEY_LEN],
    #[zeroize(skip)]
    nonce: [u8; NONCE_LEN],
}

impl MessageKey {
    /// Generate a fresh random key and nonce.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);
        Self { key, nonce }
    }

    /// Rebuild a key from a recovered key and the envelope's nonce.
    pub fn from_parts(key: &[u8], nonce: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("message key must be {KEY_LEN} bytes")))?;
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("nonce must be {NONCE_LEN} bytes")))?;
        Ok(Self { key, nonce })
    }

    /// Open a sealed message key addressed to `keypair` and pair it with `nonce`.
    pub fn open(keypair: &Keypair, sealed_key: &[u8], nonce: &[u8]) -> Result<Self, CryptoError> {
        let key = zeroize::Zeroizing::new(sealed_box::open(keypair, sealed_key)?);
        Self::from_parts(&key, nonce)
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Seal the raw key bytes to one recipient.
    pub fn seal_for(&self, recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        sealed_box::seal(recipient, &self.key)
    }

    /// Encrypt a payload. Returns `ciphertext || 16-byte tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;
        cipher
            .encrypt(XNonce::from_slice(&self.nonce), plaintext)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))
    }

    /// Decrypt a payload produced by [`MessageKey::encrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::DecryptionError(
                "ciphertext too short".to_string(),
            ));
        }
        let cipher = XChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))?;
        cipher
            .decrypt(XNonce::from_slice(&self.nonce), ciphertext)
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))
    }
}
