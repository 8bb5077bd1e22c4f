//! Battleship Match Server
//!
//! Authoritative server for two-player Battleship: authenticates users,
//! relays challenges, and referees matches over a line-oriented TCP protocol.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use battleship::network::auth::CredentialStore;
use battleship::network::server::{GameServer, ServerConfig};
use battleship::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; RUST_LOG overrides the default level.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!("Battleship Server v{}", VERSION);

    let credentials = Arc::new(CredentialStore::load(&config.users_file)?);
    let server = GameServer::bind(config, credentials).await?;
    server.run().await?;

    Ok(())
}
