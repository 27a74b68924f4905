//! HTTP transport for the watch-party service.
//!
//! [`WatchPartyClient`] talks to the REST contract served under
//! `/api/tools/watchparty` and implements both [`RecipientDirectory`] and
//! [`MessageChannel`]. Real-time delivery is emulated by polling the
//! conversation's message list.
//!
//! [`RecipientDirectory`]: crate::directory::RecipientDirectory
//! [`MessageChannel`]: crate::channel::MessageChannel

pub mod client;

use async_trait::async_trait;

pub use client::WatchPartyClient;

/// Default base URL of the watch-party service for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:4004/api/tools/watchparty";

/// Header naming the calling user on party endpoints. The bearer token is
/// shared by every client, so it cannot identify the caller on its own.
pub const USER_HEADER: &str = "x-streamverse-user";

/// Supplies the bearer token attached to every request.
///
/// Called once per request so a provider can refresh tokens behind the
/// scenes. `None` sends the request unauthenticated.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Option<String>;
}

/// A fixed bearer token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
