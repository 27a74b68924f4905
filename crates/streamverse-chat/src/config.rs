use std::time::Duration;

/// Tunables for a chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on each directory or channel call.
    pub request_timeout: Duration,
    /// Re-fetch the roster before every send so late joiners are included.
    /// On failure the cached roster is used.
    pub refresh_roster_on_send: bool,
    /// Poll interval for polling channel transports.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
            refresh_roster_on_send: true,
            poll_interval: Duration::from_secs(2),
        }
    }
}
