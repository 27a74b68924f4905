use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;

use streamverse_protocol::WatchParty;
use streamverse_relay::{router, RelayState, BASE_PATH};

/// Watch-party directory and encrypted message relay.
#[derive(Parser, Debug)]
#[command(name = "streamverse-relay", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "STREAMVERSE_RELAY_BIND", default_value = "127.0.0.1:4004")]
    bind: SocketAddr,

    /// Require this bearer token on API requests.
    #[arg(long, env = "STREAMVERSE_RELAY_TOKEN")]
    auth_token: Option<String>,

    /// Pre-register a public watch party as `ID=TITLE`. Repeatable.
    #[arg(long = "party", value_parser = parse_party)]
    parties: Vec<WatchParty>,
}

fn parse_party(raw: &str) -> Result<WatchParty, String> {
    let (id, title) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=TITLE, got {raw:?}"))?;
    if id.is_empty() {
        return Err("watch party id is empty".into());
    }
    let mut party = WatchParty::new(id, title);
    party.is_public = true;
    Ok(party)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let state = RelayState::new(args.auth_token).shared();
    for party in args.parties {
        state.directory.insert_party(party);
    }
    if state.auth_token.is_none() {
        tracing::warn!("no auth token configured, API is open");
    }

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, base = BASE_PATH, "streamverse-relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("streamverse-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
