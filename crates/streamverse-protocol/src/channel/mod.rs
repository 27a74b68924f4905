pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::ProtocolError;
use crate::messaging::envelope::{Envelope, MessageBundle, PublishAck};

pub use memory::MemoryChannel;

/// Receives the complete, sorted set of bundles each time it changes.
pub type BundleCallback = Arc<dyn Fn(Vec<MessageBundle>) + Send + Sync>;

/// Real-time, snapshot-ordered delivery of message bundles.
///
/// Subscribers get the whole conversation on every change rather than
/// incremental diffs; the data is append-only, so a snapshot is always a
/// superset of the previous one.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Open a live subscription. `on_bundle` first receives the current
    /// snapshot, then every later one, sorted with [`sort_bundles`].
    async fn subscribe(
        &self,
        conversation_id: &str,
        on_bundle: BundleCallback,
    ) -> Result<Subscription, ProtocolError>;

    /// Append one bundle to the conversation.
    async fn publish(
        &self,
        conversation_id: &str,
        bundle: Vec<Envelope>,
    ) -> Result<PublishAck, ProtocolError>;
}

/// Handle to a live subscription task.
///
/// [`Subscription::unsubscribe`] stops delivery and is safe to call any
/// number of times. Dropping the handle unsubscribes as well.
pub struct Subscription {
    conversation_id: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    pub fn new(conversation_id: &str, task: JoinHandle<()>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn unsubscribe(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::debug!(conversation = %self.conversation_id, "unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Sort bundles by timestamp ascending, ties broken by bundle id.
pub fn sort_bundles(bundles: &mut [MessageBundle]) {
    bundles.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| a.id.cmp(&b.id))
    });
}
