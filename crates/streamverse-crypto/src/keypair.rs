use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CryptoError;

/// Length of an X25519 public or private key in bytes.
pub const KEY_LEN: usize = 32;

/// A participant's X25519 keypair.
///
/// The public half is what other participants see in the watch-party roster
/// and what envelopes are addressed to. The private half never leaves the
/// local keychain. The secret is zeroized when the last copy is dropped.
#[derive(Clone)]
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a keypair from its 32-byte private key.
    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a keypair from persisted halves, checking that they belong together.
    pub fn from_parts(public: &[u8], secret: &[u8]) -> Result<Self, CryptoError> {
        let secret: [u8; KEY_LEN] = secret
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("private key must be {KEY_LEN} bytes")))?;
        let keypair = Self::from_secret_bytes(secret);
        if keypair.public_key_bytes().as_slice() != public {
            return Err(CryptoError::InvalidKey(
                "public key does not match private key".into(),
            ));
        }
        Ok(keypair)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the public key as raw bytes (this is what the roster stores).
    pub fn public_key_bytes(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }

    /// Get the private key bytes (for persistence in the keychain).
    ///
    /// # Security
    /// Handle with care — this is the private key material.
    pub fn secret_key_bytes(&self) -> [u8; KEY_LEN] {
        self.secret.to_bytes()
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Short hex fingerprint of the public key, for logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_key_bytes())
    }
}

/// Parse a peer's public key from raw bytes.
///
/// Low-order points are rejected: any exchange with them yields the all-zero
/// shared secret, so nothing could ever be sealed to them.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "public key must be {KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    let public = PublicKey::from(array);
    if is_low_order(&public) {
        return Err(CryptoError::InvalidKey("public key is a low-order point".into()));
    }
    Ok(public)
}

/// A clamped scalar is a multiple of the cofactor, so it sends every
/// low-order point to the identity.
fn is_low_order(public: &PublicKey) -> bool {
    let scalar = StaticSecret::from([0x5a; KEY_LEN]);
    !scalar.diffie_hellman(public).was_contributory()
}

/// First eight bytes of a public key in hex.
pub fn fingerprint(public_key: &[u8]) -> String {
    hex::encode(&public_key[..public_key.len().min(8)])
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}
