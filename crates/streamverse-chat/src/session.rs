//! Chat session controller.
//!
//! One [`ChatSession`] drives one open watch-party conversation:
//!
//! ```text
//! Uninitialized ──mount()──▶ Loading ──▶ Active ──unmount()──▶ Unmounted
//!        ▲                      │
//!        └── key store or ──────┘
//!            subscribe failure
//! ```
//!
//! Mounting loads the device keypair, then fetches metadata and the roster,
//! publishes our own key, and opens the message subscription concurrently.
//! Every snapshot from the channel replaces the rendered history. Sent
//! messages are never added locally; they show up when the channel echoes
//! them back.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;

use streamverse_crypto::{KeyStore, Keypair};
use streamverse_protocol::messaging::{build_bundle, decrypt_own_envelope, timestamp_now};
use streamverse_protocol::{
    BundleCallback, DecryptOutcome, MessageBundle, MessageChannel, ProtocolError, PublishAck,
    RecipientDirectory, Subscription, WatchParty,
};

use crate::config::SessionConfig;
use crate::error::ChatError;
use crate::events::ChatEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Uninitialized,
    Loading,
    Active,
    Unmounted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Unmounted => "unmounted",
        })
    }
}

/// Non-fatal mount problems. The session still becomes active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase", tag = "kind", content = "message")]
pub enum SessionWarning {
    /// Sends go to ourselves only until the roster can be fetched.
    #[error("could not fetch roster: {0}")]
    RosterFetchFailed(String),

    /// Others cannot address messages to us until our key is published.
    #[error("could not publish public key: {0}")]
    KeyPublishFailed(String),

    #[error("watch party details unavailable: {0}")]
    MetadataUnavailable(String),
}

/// One decoded bundle as shown in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub bundle_id: String,
    pub sender_id: String,
    pub timestamp: u64,
    /// Sent by the local user.
    pub is_own: bool,
    pub body: DecryptOutcome,
}

impl HistoryEntry {
    pub fn text(&self) -> &str {
        self.body.display_text()
    }
}

/// State shared with the subscription callback.
struct SessionInner {
    conversation_id: String,
    user_id: String,
    state: RwLock<SessionState>,
    keypair: RwLock<Option<Keypair>>,
    /// Decoded entries by bundle id; bundles are immutable, so decode once.
    decoded: Mutex<HashMap<String, HistoryEntry>>,
    history: RwLock<Vec<HistoryEntry>>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl SessionInner {
    fn emit(&self, event: ChatEvent) {
        // The UI may have gone away; the session keeps working without it.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: SessionState) {
        {
            let mut current = self.state.write();
            if *current == state {
                return;
            }
            *current = state;
        }
        tracing::debug!(conversation = %self.conversation_id, state = %state, "session state changed");
        self.emit(ChatEvent::StateChanged {
            conversation_id: self.conversation_id.clone(),
            state,
        });
    }

    fn warn(&self, warning: SessionWarning) {
        tracing::warn!(conversation = %self.conversation_id, warning = %warning, "degraded session");
        self.emit(ChatEvent::Warning {
            conversation_id: self.conversation_id.clone(),
            warning,
        });
    }

    fn decode(&self, bundle: &MessageBundle, keypair: &Keypair) -> HistoryEntry {
        let sender_id = bundle.sender_id().unwrap_or_default().to_string();
        HistoryEntry {
            bundle_id: bundle.id.clone(),
            is_own: sender_id == self.user_id,
            sender_id,
            timestamp: bundle.timestamp(),
            body: decrypt_own_envelope(&bundle.messages, keypair),
        }
    }

    /// Replace the history with the decoded snapshot.
    fn apply_snapshot(&self, snapshot: &[MessageBundle]) {
        if *self.state.read() == SessionState::Unmounted {
            return;
        }
        let Some(keypair) = self.keypair.read().clone() else {
            return;
        };

        let mut entries: Vec<HistoryEntry> = {
            let mut decoded = self.decoded.lock();
            snapshot
                .iter()
                .map(|bundle| {
                    decoded
                        .entry(bundle.id.clone())
                        .or_insert_with(|| self.decode(bundle, &keypair))
                        .clone()
                })
                .collect()
        };
        entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.bundle_id.cmp(&b.bundle_id))
        });

        tracing::trace!(
            conversation = %self.conversation_id,
            bundles = entries.len(),
            "history updated"
        );
        self.history.write().clone_from(&entries);
        self.emit(ChatEvent::HistoryUpdated {
            conversation_id: self.conversation_id.clone(),
            entries,
        });
    }
}

/// Controller for one open watch-party conversation.
pub struct ChatSession {
    inner: Arc<SessionInner>,
    config: SessionConfig,
    key_store: Arc<KeyStore>,
    directory: Arc<dyn RecipientDirectory>,
    channel: Arc<dyn MessageChannel>,
    roster: RwLock<Vec<Vec<u8>>>,
    metadata: RwLock<Option<WatchParty>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ChatSession {
    /// Create an unmounted session and the receiver for its UI events.
    pub fn new(
        config: SessionConfig,
        conversation_id: &str,
        user_id: &str,
        key_store: Arc<KeyStore>,
        directory: Arc<dyn RecipientDirectory>,
        channel: Arc<dyn MessageChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            state: RwLock::new(SessionState::Uninitialized),
            keypair: RwLock::new(None),
            decoded: Mutex::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            events,
        });

        let session = Self {
            inner,
            config,
            key_store,
            directory,
            channel,
            roster: RwLock::new(Vec::new()),
            metadata: RwLock::new(None),
            subscription: Mutex::new(None),
        };
        (session, rx)
    }

    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Current ordered history.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.read().clone()
    }

    /// Last successfully fetched roster keys.
    pub fn roster(&self) -> Vec<Vec<u8>> {
        self.roster.read().clone()
    }

    pub fn metadata(&self) -> Option<WatchParty> {
        self.metadata.read().clone()
    }

    /// Our public key, once mounted.
    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.inner
            .keypair
            .read()
            .as_ref()
            .map(Keypair::public_key_bytes)
    }

    /// Open the conversation.
    ///
    /// Fails only when the keypair cannot be loaded or the subscription
    /// cannot be opened; both leave the session `Uninitialized` so mount can
    /// be retried. Roster, key publish, and metadata failures are returned
    /// as warnings (and emitted as events) with the session active.
    pub async fn mount(&self) -> Result<Vec<SessionWarning>, ChatError> {
        let state = self.state();
        if state != SessionState::Uninitialized {
            return Err(ChatError::InvalidState(state));
        }
        self.inner.set_state(SessionState::Loading);

        let keypair = match self.key_store.get_or_create_keypair() {
            Ok(keypair) => keypair,
            Err(e) => {
                tracing::error!(conversation = %self.conversation_id(), error = %e, "key store unavailable");
                self.inner.set_state(SessionState::Uninitialized);
                return Err(e.into());
            }
        };
        let public_key = keypair.public_key_bytes();
        *self.inner.keypair.write() = Some(keypair);

        let inner = Arc::clone(&self.inner);
        let on_bundle: BundleCallback =
            Arc::new(move |snapshot: Vec<MessageBundle>| inner.apply_snapshot(&snapshot));

        let conversation_id = self.conversation_id();
        let limit = self.config.request_timeout;
        let (metadata, roster, published, subscription) = tokio::join!(
            bounded(limit, "metadata", self.directory.fetch_metadata(conversation_id)),
            bounded(limit, "roster", self.directory.fetch_roster(conversation_id)),
            bounded(
                limit,
                "publish key",
                self.directory
                    .publish_key(conversation_id, self.user_id(), &public_key)
            ),
            bounded(
                limit,
                "subscribe",
                self.channel.subscribe(conversation_id, on_bundle)
            ),
        );

        let subscription = match subscription {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(conversation = %conversation_id, error = %e, "subscription failed");
                let _slot = self.subscription.lock();
                if self.state() != SessionState::Unmounted {
                    self.inner.set_state(SessionState::Uninitialized);
                }
                return Err(ChatError::SubscribeFailed(e));
            }
        };

        let mut warnings = Vec::new();
        match metadata {
            Ok(party) => *self.metadata.write() = Some(party),
            Err(e) => warnings.push(SessionWarning::MetadataUnavailable(e.to_string())),
        }
        match roster {
            Ok(keys) => *self.roster.write() = keys,
            Err(e) => warnings.push(SessionWarning::RosterFetchFailed(e.to_string())),
        }
        if let Err(e) = published {
            warnings.push(SessionWarning::KeyPublishFailed(e.to_string()));
        }
        // Held across the check and the transition so a concurrent unmount()
        // either runs first and is seen here, or runs after and finds the
        // subscription to cancel.
        {
            let mut slot = self.subscription.lock();
            if self.state() == SessionState::Unmounted {
                subscription.unsubscribe();
                return Err(ChatError::InvalidState(SessionState::Unmounted));
            }
            *slot = Some(subscription);
            for warning in &warnings {
                self.inner.warn(warning.clone());
            }
            self.inner.set_state(SessionState::Active);
        }
        tracing::info!(
            conversation = %conversation_id,
            user = %self.user_id(),
            roster = self.roster.read().len(),
            warnings = warnings.len(),
            "chat session active"
        );
        Ok(warnings)
    }

    /// Re-fetch the roster. On failure the cached roster is kept.
    pub async fn refresh_roster(&self) -> Result<Vec<Vec<u8>>, ChatError> {
        self.require_active()?;
        let keys = bounded(
            self.config.request_timeout,
            "roster",
            self.directory.fetch_roster(self.conversation_id()),
        )
        .await
        .map_err(ChatError::RosterFetchFailed)?;

        self.roster.write().clone_from(&keys);
        Ok(keys)
    }

    /// Encrypt `text` for every roster member plus ourselves and publish it.
    ///
    /// The message is not added to the history here; it appears once the
    /// channel delivers it back.
    pub async fn send(&self, text: &str) -> Result<PublishAck, ChatError> {
        self.require_active()?;
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        if self.config.refresh_roster_on_send {
            if let Err(e) = self.refresh_roster().await {
                tracing::warn!(
                    conversation = %self.conversation_id(),
                    error = %e,
                    "roster refresh failed, sending to cached roster"
                );
            }
        }

        let Some(keypair) = self.inner.keypair.read().clone() else {
            return Err(ChatError::InvalidState(self.state()));
        };
        let own_key = keypair.public_key_bytes().to_vec();
        let mut recipients = self.roster();
        if !recipients.contains(&own_key) {
            recipients.push(own_key);
        }

        let bundle = build_bundle(text, &recipients, self.user_id(), timestamp_now())
            .map_err(ChatError::PublishFailed)?;
        let envelopes = bundle.len();

        let ack = bounded(
            self.config.request_timeout,
            "publish",
            self.channel.publish(self.conversation_id(), bundle),
        )
        .await
        .map_err(|e| {
            tracing::warn!(conversation = %self.conversation_id(), error = %e, "publish failed");
            ChatError::PublishFailed(e)
        })?;

        tracing::debug!(
            conversation = %self.conversation_id(),
            bundle = %ack.id,
            envelopes,
            "message published"
        );
        Ok(ack)
    }

    /// Close the conversation. Terminal and idempotent.
    pub fn unmount(&self) {
        {
            let mut slot = self.subscription.lock();
            if self.state() == SessionState::Unmounted {
                return;
            }
            if let Some(subscription) = slot.take() {
                subscription.unsubscribe();
            }
            self.inner.set_state(SessionState::Unmounted);
        }
        tracing::info!(conversation = %self.conversation_id(), "chat session closed");
    }

    fn require_active(&self) -> Result<(), ChatError> {
        match self.state() {
            SessionState::Active => Ok(()),
            other => Err(ChatError::InvalidState(other)),
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Run a network call under `limit`; elapsing counts as that call failing.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, ProtocolError>>,
) -> Result<T, ProtocolError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(ProtocolError::Timeout(format!("{what} after {limit:?}"))))
}

#[cfg(test)]
mod tests {
    use streamverse_crypto::MemoryKeychain;
    use streamverse_protocol::{MemoryChannel, MemoryDirectory};

    use super::*;

    fn session(user: &str) -> (ChatSession, mpsc::UnboundedReceiver<ChatEvent>) {
        ChatSession::new(
            SessionConfig::default(),
            "cv1",
            user,
            Arc::new(KeyStore::new(Arc::new(MemoryKeychain::new()))),
            Arc::new(MemoryDirectory::new()),
            Arc::new(MemoryChannel::new()),
        )
    }

    #[tokio::test]
    async fn send_requires_active_session() {
        let (session, _rx) = session("alice");
        assert!(matches!(
            session.send("hi").await,
            Err(ChatError::InvalidState(SessionState::Uninitialized))
        ));
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let (session, _rx) = session("alice");
        session.mount().await.unwrap();
        for text in ["", "   ", "\n\t"] {
            assert!(matches!(session.send(text).await, Err(ChatError::EmptyMessage)));
        }
        assert_eq!(ChatError::EmptyMessage.to_string(), "Please enter a message");
    }

    #[tokio::test]
    async fn mount_twice_is_rejected() {
        let (session, _rx) = session("alice");
        session.mount().await.unwrap();
        assert!(matches!(
            session.mount().await,
            Err(ChatError::InvalidState(SessionState::Active))
        ));
    }

    #[tokio::test]
    async fn state_events_follow_lifecycle() {
        let (session, mut rx) = session("alice");
        session.mount().await.unwrap();
        session.unmount();
        session.unmount();

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::StateChanged { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            [
                SessionState::Loading,
                SessionState::Active,
                SessionState::Unmounted
            ]
        );
    }

    #[tokio::test]
    async fn missing_metadata_is_a_warning() {
        let (session, _rx) = session("alice");
        let warnings = session.mount().await.unwrap();
        assert!(matches!(
            warnings.as_slice(),
            [SessionWarning::MetadataUnavailable(_)]
        ));
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.metadata().is_none());
    }

    /// Channel whose subscribe takes a while to complete.
    struct SlowChannel(MemoryChannel);

    #[async_trait::async_trait]
    impl MessageChannel for SlowChannel {
        async fn subscribe(
            &self,
            conversation_id: &str,
            on_bundle: BundleCallback,
        ) -> Result<Subscription, ProtocolError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.subscribe(conversation_id, on_bundle).await
        }

        async fn publish(
            &self,
            conversation_id: &str,
            bundle: Vec<streamverse_protocol::Envelope>,
        ) -> Result<PublishAck, ProtocolError> {
            self.0.publish(conversation_id, bundle).await
        }
    }

    #[tokio::test]
    async fn unmount_during_mount_stays_unmounted() {
        let (session, _rx) = ChatSession::new(
            SessionConfig::default(),
            "cv1",
            "alice",
            Arc::new(KeyStore::new(Arc::new(MemoryKeychain::new()))),
            Arc::new(MemoryDirectory::new()),
            Arc::new(SlowChannel(MemoryChannel::new())),
        );

        let (mounted, ()) = tokio::join!(session.mount(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.unmount();
        });

        assert!(matches!(
            mounted,
            Err(ChatError::InvalidState(SessionState::Unmounted))
        ));
        assert_eq!(session.state(), SessionState::Unmounted);
        assert!(session.subscription.lock().is_none());
    }

    #[tokio::test]
    async fn bounded_maps_elapsed_to_timeout() {
        let result: Result<(), ProtocolError> = bounded(
            Duration::from_millis(10),
            "roster",
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
    }
}
