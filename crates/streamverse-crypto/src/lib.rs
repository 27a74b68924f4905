pub mod error;
pub mod key_store;
pub mod keychain;
pub mod keypair;
pub mod message_key;
pub mod sealed_box;

pub use error::CryptoError;
pub use key_store::KeyStore;
pub use keychain::{Keychain, MemoryKeychain};
pub use keypair::Keypair;
pub use message_key::MessageKey;
