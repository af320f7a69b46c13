use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::debug;

use beadloom::config::AppConfig;
use beadloom::server::{serve, AppState};
use beadloom::state::StateStore;
use beadloom::telegram::TelegramClient;

/// Runs the Telegram webhook server.
#[derive(Debug, clap::Parser, Clone)]
struct Args {
    /// address to bind, overriding HOST
    #[clap(long)]
    host: Option<String>,

    /// port to bind, overriding PORT
    #[clap(long)]
    port: Option<u16>,

    /// state database path, overriding STATE_DB
    #[clap(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    debug!("args: {args:?}");

    let mut config = AppConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let store = Arc::new(StateStore::open(&config.db_path)?);
    let messenger = Arc::new(TelegramClient::new(config.api_url.clone())?);
    let state = AppState {
        store,
        messenger,
        policy: config.gateway_policy(),
    };
    serve(&config, state).await?;
    Ok(())
}
