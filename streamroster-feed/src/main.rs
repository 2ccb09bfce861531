//! `Streamroster` feed server — development stand-in for the production
//! ingestion server.
//!
//! Serves the push WebSocket and the HTTP control surface on one port.
//! Chat events are injected by the embedding process or tests; this binary
//! is mainly useful for running the client against a live socket.
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin streamroster-feed
//!
//! # Run on custom address
//! cargo run --bin streamroster-feed -- --bind 127.0.0.1:9000
//!
//! # Or via environment variable
//! FEED_ADDR=127.0.0.1:9000 cargo run --bin streamroster-feed
//! ```

use std::sync::Arc;

use clap::Parser;
use streamroster_feed::config::{FeedCliArgs, FeedConfig};
use streamroster_feed::feed::{self, FeedState};

#[tokio::main]
async fn main() {
    let cli = FeedCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match FeedConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting streamroster feed server");

    let state = Arc::new(FeedState::with_heartbeat(config.heartbeat_interval));

    match feed::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, _state, handle)) => {
            tracing::info!(addr = %bound_addr, "feed server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "feed server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start feed server");
            std::process::exit(1);
        }
    }
}
