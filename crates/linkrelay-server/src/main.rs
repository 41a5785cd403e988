//! linkrelay pairing server: entry point.
//!
//! Accepts WebSocket connections from controller and companion devices,
//! pairs them through short linking codes, and relays application messages
//! between linked pairs.
//!
//! # Usage
//!
//! ```text
//! linkrelay-server [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>              Listener IP address [default: 0.0.0.0]
//!   --port <PORT>              Listener port [default: 443]
//!   --database-url <URL>       MySQL URL of the token table
//!   --relaxed-auth             Link even when the access token is invalid
//!   --ping-interval <SECS>     Liveness ping interval, 0 disables [default: 30]
//!   --max-missed-pongs <N>     Unanswered pings before closing [default: 3]
//!   --outbound-buffer <N>      Per-connection outbound queue [default: 256]
//! ```
//!
//! Every option can also be set through its environment variable; CLI
//! arguments take precedence.  Log verbosity follows `RUST_LOG`.

use std::net::{IpAddr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use linkrelay_server::application::{RelayEngine, TokenStore};
use linkrelay_server::domain::{AuthMode, ServerConfig};
use linkrelay_server::infrastructure::{run_server, SqlTokenStore, UnconfiguredTokenStore};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// linkrelay pairing and relay server.
#[derive(Debug, Parser)]
#[command(
    name = "linkrelay-server",
    about = "Pairs controller and companion devices and relays messages between them",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket listener to.
    #[arg(long, default_value = "0.0.0.0", env = "LINKRELAY_BIND")]
    bind: String,

    /// TCP port for the WebSocket listener.
    #[arg(long, default_value_t = 443, env = "LINKRELAY_PORT")]
    port: u16,

    /// MySQL URL of the database holding `personal_access_tokens`.
    ///
    /// Without it every token lookup fails and strict mode rejects all links.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Accept `REQUEST_LINK` even when the access token does not validate.
    #[arg(long, env = "LINKRELAY_RELAXED_AUTH")]
    relaxed_auth: bool,

    /// Seconds between liveness pings.  `0` disables the sweep.
    #[arg(long, default_value_t = 30, env = "LINKRELAY_PING_INTERVAL")]
    ping_interval: u64,

    /// Unanswered pings after which a connection is dropped.
    #[arg(long, default_value_t = 3, env = "LINKRELAY_MAX_MISSED_PONGS")]
    max_missed_pongs: u32,

    /// Frames queued per connection before sends start failing.
    #[arg(long, default_value_t = 256, env = "LINKRELAY_OUTBOUND_BUFFER")]
    outbound_buffer: usize,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let ip: IpAddr = self
            .bind
            .trim()
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;
        let bind_addr = SocketAddr::new(ip, self.port);

        Ok(ServerConfig {
            bind_addr,
            database_url: self.database_url.filter(|url| !url.trim().is_empty()),
            auth_mode: if self.relaxed_auth {
                AuthMode::Relaxed
            } else {
                AuthMode::Strict
            },
            ping_interval: (self.ping_interval > 0)
                .then(|| Duration::from_secs(self.ping_interval)),
            max_missed_pongs: self.max_missed_pongs.max(1),
            outbound_buffer: self.outbound_buffer.max(1),
        })
    }
}

fn token_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn TokenStore>> {
    match &config.database_url {
        Some(url) => {
            let store = SqlTokenStore::connect_lazy(url).context("invalid --database-url")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("no database configured; access tokens cannot be validated");
            Ok(Arc::new(UnconfiguredTokenStore))
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    if config.auth_mode == AuthMode::Relaxed {
        warn!("relaxed auth enabled: invalid access tokens will not block linking");
    }

    let store = token_store(&config)?;
    let engine = Arc::new(RelayEngine::new(
        store,
        config.auth_mode,
        config.max_missed_pongs,
    ));

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, engine, running).await?;

    info!("linkrelay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
