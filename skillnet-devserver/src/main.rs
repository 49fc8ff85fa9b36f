//! `SkillNet` dev server -- in-memory API for local development.
//!
//! Serves the auth, chat, and gig endpoints plus the chat WebSocket, all
//! backed by process memory. Data is lost on restart.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8000
//! cargo run --bin skillnet-devserver
//!
//! # Run on custom address
//! cargo run --bin skillnet-devserver -- --bind 127.0.0.1:8080
//! ```

use std::sync::Arc;

use clap::Parser;

use skillnet_devserver::config::{DevCliArgs, DevConfig};
use skillnet_devserver::server::{self, DevState};

#[tokio::main]
async fn main() {
    let cli = DevCliArgs::parse();

    let config = match DevConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting skillnet dev server");

    let state = Arc::new(DevState::new(&config));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "dev server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dev server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start dev server");
            std::process::exit(1);
        }
    }
}
