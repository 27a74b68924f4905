use serde::{Deserialize, Serialize};

use crate::serde_b64;

/// One recipient's copy of a chat message.
///
/// Every envelope of a bundle carries the same `encrypted_payload` and
/// `nonce`; only `encrypted_symmetric_key` (the message key sealed to
/// `recipient_public_key`) differs. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// XChaCha20-Poly1305 ciphertext of the UTF-8 message.
    #[serde(with = "serde_b64", alias = "encryptedMessage")]
    pub encrypted_payload: Vec<u8>,
    /// The message key, sealed to `recipient_public_key`.
    #[serde(with = "serde_b64")]
    pub encrypted_symmetric_key: Vec<u8>,
    /// 24-byte payload nonce.
    #[serde(with = "serde_b64")]
    pub nonce: Vec<u8>,
    /// X25519 public key this copy is addressed to.
    #[serde(with = "serde_b64")]
    pub recipient_public_key: Vec<u8>,
    #[serde(alias = "userId")]
    pub sender_id: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// A stored message bundle: one logical message fanned out to every recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBundle {
    /// Store-assigned identifier.
    pub id: String,
    #[serde(alias = "watchPartyId")]
    pub conversation_id: String,
    #[serde(default)]
    pub messages: Vec<Envelope>,
}

impl MessageBundle {
    /// Ordering timestamp: the first envelope's, or 0 for an empty bundle.
    pub fn timestamp(&self) -> u64 {
        self.messages.first().map_or(0, |m| m.timestamp)
    }

    /// Sender of the bundle, taken from its first envelope.
    pub fn sender_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.sender_id.as_str())
    }
}

/// Body of `POST /watchparty/:id/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub messages: Vec<Envelope>,
}

/// Store acknowledgement for a published bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAck {
    pub id: String,
}

/// A roster entry as served by `GET /watchparty/:id/users`.
///
/// The key is kept as the base64 string from the wire; entries registered
/// before a participant generated keys may carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl RosterEntry {
    pub fn new(user_id: &str, public_key: &[u8]) -> Self {
        Self {
            user_id: user_id.to_string(),
            public_key: Some(serde_b64::encode(public_key)),
        }
    }
}

/// A scheduled watch party. Its id doubles as the chat conversation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchParty {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// ISO-8601 start time.
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub movie_ids: Vec<u64>,
    /// Movie details, when the server has them.
    #[serde(default)]
    pub movies: Vec<PinnedMovie>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub host_id: Option<String>,
    /// Users who joined; the host is always first.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub invited_user_ids: Vec<String>,
}

impl WatchParty {
    /// A bare party with only an id and a title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            date_time: None,
            movie_ids: Vec::new(),
            movies: Vec::new(),
            is_public: false,
            host_id: None,
            participants: Vec::new(),
            invited_user_ids: Vec::new(),
        }
    }

    /// Whether `user_id` may join: public parties are open, private ones
    /// need an invitation.
    pub fn admits(&self, user_id: &str) -> bool {
        self.is_public
            || self.host_id.as_deref() == Some(user_id)
            || self.invited_user_ids.iter().any(|u| u == user_id)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|u| u == user_id)
    }
}

/// A movie pinned to a watch party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedMovie {
    pub id: u64,
    pub title: String,
    #[serde(default, alias = "poster_path")]
    pub poster_path: Option<String>,
    /// Runtime in minutes.
    #[serde(default)]
    pub runtime: Option<u32>,
}

/// Body of `POST /watchparty/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartyRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub movie_ids: Vec<u64>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub invited_user_ids: Vec<String>,
}

/// An entry of `GET /watchparty/notifications`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyNotification {
    pub id: String,
    /// `watchPartyInvite` for invitations.
    #[serde(rename = "type")]
    pub kind: String,
    pub watch_party_id: String,
    pub message: String,
}
