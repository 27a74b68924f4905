use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::channel::{sort_bundles, BundleCallback, MessageChannel, Subscription};
use crate::error::ProtocolError;
use crate::messaging::envelope::{Envelope, MessageBundle, PublishAck};

type Log = Arc<watch::Sender<Vec<MessageBundle>>>;

/// In-process message store with live snapshot subscriptions.
///
/// Each conversation is an append-only log held in a `watch` cell; every
/// publish wakes all subscribers, who then read the whole log. Used by the
/// relay service as its store and by tests as a stand-in for it.
#[derive(Default)]
pub struct MemoryChannel {
    conversations: RwLock<HashMap<String, Log>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, conversation_id: &str) -> Log {
        if let Some(log) = self.conversations.read().get(conversation_id) {
            return Arc::clone(log);
        }
        let mut conversations = self.conversations.write();
        Arc::clone(
            conversations
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(watch::channel(Vec::new()).0)),
        )
    }

    /// Current sorted snapshot of a conversation.
    pub fn snapshot(&self, conversation_id: &str) -> Vec<MessageBundle> {
        let Some(log) = self.conversations.read().get(conversation_id).cloned() else {
            return Vec::new();
        };
        let mut bundles = log.borrow().clone();
        sort_bundles(&mut bundles);
        bundles
    }

    /// Append a bundle and return its stored form.
    pub fn append(
        &self,
        conversation_id: &str,
        messages: Vec<Envelope>,
    ) -> Result<MessageBundle, ProtocolError> {
        if messages.is_empty() {
            return Err(ProtocolError::InvalidBundle("bundle has no envelopes".into()));
        }
        let bundle = MessageBundle {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            messages,
        };
        let stored = bundle.clone();
        self.log(conversation_id).send_modify(|log| log.push(bundle));

        tracing::debug!(
            conversation = %conversation_id,
            bundle = %stored.id,
            envelopes = stored.messages.len(),
            "bundle appended"
        );
        Ok(stored)
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn subscribe(
        &self,
        conversation_id: &str,
        on_bundle: BundleCallback,
    ) -> Result<Subscription, ProtocolError> {
        let mut rx = self.log(conversation_id).subscribe();
        let task = tokio::spawn(async move {
            loop {
                let mut snapshot = rx.borrow_and_update().clone();
                sort_bundles(&mut snapshot);
                on_bundle(snapshot);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        tracing::debug!(conversation = %conversation_id, "subscribed (memory)");
        Ok(Subscription::new(conversation_id, task))
    }

    async fn publish(
        &self,
        conversation_id: &str,
        bundle: Vec<Envelope>,
    ) -> Result<PublishAck, ProtocolError> {
        let stored = self.append(conversation_id, bundle)?;
        Ok(PublishAck { id: stored.id })
    }
}
