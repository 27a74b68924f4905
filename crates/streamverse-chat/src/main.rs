use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use streamverse_chat::{ChatError, ChatEvent, ChatSession, FileKeychain, SessionConfig};
use streamverse_crypto::KeyStore;
use streamverse_protocol::http::DEFAULT_BASE_URL;
use streamverse_protocol::{StaticToken, WatchPartyClient};

/// Terminal client for end-to-end encrypted watch-party chat.
///
/// Type a line to send it. `/refresh` re-fetches the roster, `/quit` leaves.
#[derive(Parser, Debug)]
#[command(name = "streamverse-chat", version)]
struct Args {
    /// Watch party to join.
    party: String,

    /// Your user id.
    #[arg(long, env = "STREAMVERSE_USER_ID")]
    user: String,

    /// Base URL of the watch-party API.
    #[arg(long, env = "STREAMVERSE_WATCHPARTY_API_URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Bearer token sent with every request.
    #[arg(long, env = "STREAMVERSE_TOKEN")]
    token: Option<String>,

    /// Where the device keypair is kept.
    #[arg(long, env = "STREAMVERSE_KEY_FILE", default_value = "streamverse-keys.json")]
    key_file: PathBuf,

    /// Join the party before opening the chat (public parties or invitations).
    #[arg(long)]
    join: bool,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 8)]
    timeout_secs: u64,

    /// Message poll interval in milliseconds.
    #[arg(long, default_value_t = 2000)]
    poll_ms: u64,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_millis(self.poll_ms),
            ..SessionConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.session_config();

    let mut client = WatchPartyClient::new(&args.api_url)
        .context("failed to build HTTP client")?
        .with_request_timeout(config.request_timeout)
        .with_poll_interval(config.poll_interval)
        .with_user_id(&args.user);
    if let Some(token) = &args.token {
        client = client.with_token_provider(Arc::new(StaticToken::new(token.clone())));
    }
    if args.join {
        let party = client
            .join_party(&args.party)
            .await
            .with_context(|| format!("could not join watch party {}", args.party))?;
        tracing::info!(party = %party.id, participants = party.participants.len(), "joined");
    }
    let client = Arc::new(client);

    let key_store = Arc::new(KeyStore::new(Arc::new(FileKeychain::new(&args.key_file))));
    let (session, events) = ChatSession::new(
        config,
        &args.party,
        &args.user,
        Arc::clone(&key_store),
        client.clone(),
        client,
    );

    let printer = tokio::spawn(print_events(events));

    session
        .mount()
        .await
        .with_context(|| format!("could not open watch party {}", args.party))?;
    if let Some(party) = session.metadata() {
        println!("== {} ==", party.title);
        if let Some(when) = &party.date_time {
            println!("   starts: {when}");
        }
        for movie in &party.movies {
            println!("   pinned: {}", movie.title);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match line.trim() {
            "/quit" => break,
            "/refresh" => match session.refresh_roster().await {
                Ok(keys) => println!("-- {} participant key(s)", keys.len()),
                Err(e) => println!("!! {e}"),
            },
            _ => match session.send(&line).await {
                Ok(_) | Err(ChatError::EmptyMessage) => {}
                Err(e) => println!("!! {e} (try again)"),
            },
        }
    }

    session.unmount();
    key_store.dispose();
    drop(session);
    printer.await.context("event printer panicked")?;
    Ok(())
}

/// Print history entries the first time they appear.
async fn print_events(mut events: mpsc::UnboundedReceiver<ChatEvent>) {
    let mut shown: HashSet<String> = HashSet::new();
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::HistoryUpdated { entries, .. } => {
                for entry in entries {
                    if shown.insert(entry.bundle_id.clone()) {
                        let who = if entry.is_own { "you" } else { entry.sender_id.as_str() };
                        println!("[{who}] {}", entry.text());
                    }
                }
            }
            ChatEvent::Warning { warning, .. } => println!("!! {warning}"),
            ChatEvent::StateChanged { state, .. } => tracing::debug!(state = %state, "session"),
        }
    }
}
