use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::time::MissedTickBehavior;

use crate::channel::{sort_bundles, BundleCallback, MessageChannel, Subscription};
use crate::directory::{roster_keys, RecipientDirectory};
use crate::error::ProtocolError;
use crate::http::{TokenProvider, USER_HEADER};
use crate::messaging::envelope::{
    CreatePartyRequest, Envelope, MessageBundle, PartyNotification, PublishAck, PublishRequest,
    RosterEntry, WatchParty,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// REST client for the watch-party directory and message store.
///
/// Cheap to clone; clones share the connection pool and token provider.
#[derive(Clone)]
pub struct WatchPartyClient {
    http: Client,
    base_url: Url,
    token: Option<Arc<dyn TokenProvider>>,
    user_id: Option<String>,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl WatchPartyClient {
    pub fn new(base_url: &str) -> Result<Self, ProtocolError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ProtocolError::Network(e.to_string()))?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ProtocolError::Network(format!("invalid base URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProtocolError::Network(format!(
                "invalid base URL {base_url}: cannot carry a path"
            )));
        }
        tracing::info!(base_url = %base_url, "watch-party client configured");

        Ok(Self {
            http,
            base_url,
            token: None,
            user_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token = Some(provider);
        self
    }

    /// Identify the caller to party endpoints (create, join, listings).
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Upper bound on each request, including reading the body.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Interval between message-list polls of a live subscription.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL extended by `segments`, each percent-encoded as one segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Create a watch party hosted by the configured user.
    pub async fn create_party(&self, req: &CreatePartyRequest) -> Result<WatchParty, ProtocolError> {
        let request = self.http.post(self.url(&["create"])).json(req);
        self.request_json(request, "create watch party").await
    }

    /// Join a public party, or a private one the configured user is invited to.
    pub async fn join_party(&self, conversation_id: &str) -> Result<WatchParty, ProtocolError> {
        let request = self.http.post(self.url(&["join", conversation_id]));
        self.request_json(request, "join watch party").await
    }

    /// Parties the configured user hosts or joined.
    pub async fn my_parties(&self) -> Result<Vec<WatchParty>, ProtocolError> {
        let request = self.http.get(self.url(&["user"]));
        self.request_json(request, "user watch parties").await
    }

    pub async fn public_parties(&self) -> Result<Vec<WatchParty>, ProtocolError> {
        let request = self.http.get(self.url(&["public"]));
        self.request_json(request, "public watch parties").await
    }

    /// Pending invitations for the configured user.
    pub async fn notifications(&self) -> Result<Vec<PartyNotification>, ProtocolError> {
        let request = self.http.get(self.url(&["notifications"]));
        self.request_json(request, "notifications").await
    }

    /// Roster entries as stored, including users without a key.
    pub async fn fetch_roster_entries(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<RosterEntry>, ProtocolError> {
        let request = self.http.get(self.url(&[conversation_id, "users"]));
        self.request_json(request, "roster").await
    }

    /// Sorted snapshot of every bundle stored for the conversation.
    pub async fn fetch_bundles(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MessageBundle>, ProtocolError> {
        let request = self.http.get(self.url(&[conversation_id, "messages"]));
        let mut bundles: Vec<MessageBundle> = self.request_json(request, "messages").await?;
        sort_bundles(&mut bundles);
        Ok(bundles)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ProtocolError> {
        self.timed(what, async {
            let response = self.send(request, what).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| ProtocolError::Deserialization(format!("{what}: {e}")))
        })
        .await
    }

    async fn request_empty(&self, request: RequestBuilder, what: &str) -> Result<(), ProtocolError> {
        self.timed(what, async {
            self.send(request, what).await?;
            Ok(())
        })
        .await
    }

    async fn timed<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, ProtocolError>>,
    ) -> Result<T, ProtocolError> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ProtocolError::Timeout(what.to_string()))?
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, ProtocolError> {
        let request = match &self.token {
            Some(provider) => match provider.token().await {
                Some(token) => request.bearer_auth(token),
                None => request,
            },
            None => request,
        };
        let request = match &self.user_id {
            Some(user_id) => request.header(USER_HEADER, user_id),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProtocolError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, what, body))
    }
}

/// Map a non-success status to the error taxonomy.
fn status_error(status: StatusCode, what: &str, body: String) -> ProtocolError {
    match status {
        StatusCode::UNAUTHORIZED => ProtocolError::Unauthorized,
        StatusCode::NOT_FOUND => ProtocolError::NotFound(what.to_string()),
        StatusCode::FORBIDDEN => ProtocolError::Forbidden(if body.is_empty() {
            what.to_string()
        } else {
            body
        }),
        _ => ProtocolError::Status {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                body
            },
        },
    }
}

fn bundle_ids(bundles: &[MessageBundle]) -> HashSet<String> {
    bundles.iter().map(|b| b.id.clone()).collect()
}

#[async_trait]
impl RecipientDirectory for WatchPartyClient {
    async fn fetch_metadata(&self, conversation_id: &str) -> Result<WatchParty, ProtocolError> {
        let request = self.http.get(self.url(&[conversation_id]));
        self.request_json(request, "watch party").await
    }

    async fn fetch_roster(&self, conversation_id: &str) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let entries = self.fetch_roster_entries(conversation_id).await?;
        Ok(roster_keys(&entries))
    }

    async fn publish_key(
        &self,
        conversation_id: &str,
        user_id: &str,
        public_key: &[u8],
    ) -> Result<(), ProtocolError> {
        let request = self
            .http
            .post(self.url(&[conversation_id, "users"]))
            .json(&RosterEntry::new(user_id, public_key));
        self.request_empty(request, "publish key").await?;
        tracing::debug!(conversation = %conversation_id, user = %user_id, "public key published");
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for WatchPartyClient {
    /// Fetches the current snapshot up front, so an unreachable store fails
    /// the subscribe call instead of the background task.
    async fn subscribe(
        &self,
        conversation_id: &str,
        on_bundle: BundleCallback,
    ) -> Result<Subscription, ProtocolError> {
        let initial = self.fetch_bundles(conversation_id).await?;
        let client = self.clone();
        let conversation = conversation_id.to_string();

        let task = tokio::spawn(async move {
            let mut seen = bundle_ids(&initial);
            on_bundle(initial);

            let mut ticker = tokio::time::interval(client.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match client.fetch_bundles(&conversation).await {
                    Ok(snapshot) => {
                        let ids = bundle_ids(&snapshot);
                        if ids != seen {
                            seen = ids;
                            on_bundle(snapshot);
                        }
                    }
                    Err(ProtocolError::Unauthorized) => {
                        tracing::warn!(conversation = %conversation, "poll rejected, stopping subscription");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(conversation = %conversation, error = %e, "message poll failed");
                    }
                }
            }
        });

        tracing::debug!(
            conversation = %conversation_id,
            interval = ?self.poll_interval,
            "subscribed (polling)"
        );
        Ok(Subscription::new(conversation_id, task))
    }

    async fn publish(
        &self,
        conversation_id: &str,
        bundle: Vec<Envelope>,
    ) -> Result<PublishAck, ProtocolError> {
        if bundle.is_empty() {
            return Err(ProtocolError::InvalidBundle("bundle has no envelopes".into()));
        }
        let request = self
            .http
            .post(self.url(&[conversation_id, "message"]))
            .json(&PublishRequest { messages: bundle });
        self.request_json(request, "publish bundle").await
    }
}
