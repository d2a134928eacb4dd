//! Serve command: runs the relay in the foreground.
//!
//! Loads the catalog and user directory, installs the signal handler and
//! serves until SIGTERM/SIGINT. Sessions still open at that point are
//! closed with 1001.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use consultrelay_core::{StaticCatalog, StaticUserDirectory};
use consultrelay_server::{RelayContext, RelayServer, SignalHandler};

use crate::config::RelayConfig;
use crate::error::CliResult;

/// Loads the appointment catalog and user directory named by `config`.
pub fn load_sources(config: &RelayConfig) -> CliResult<(StaticCatalog, StaticUserDirectory)> {
    let catalog_path = config.catalog_path();
    let catalog = StaticCatalog::load(&catalog_path)?;
    info!(
        path = %catalog_path.display(),
        appointments = catalog.len(),
        "Appointment catalog loaded"
    );

    let users_path = config.users_path();
    let users = StaticUserDirectory::load(&users_path)?;
    info!(path = %users_path.display(), users = users.len(), "User directory loaded");

    Ok((catalog, users))
}

/// Starts the relay and blocks until a shutdown signal arrives.
pub async fn run(config: &RelayConfig, listen: Option<SocketAddr>) -> CliResult<()> {
    let mut server_config = config.to_server_config()?;
    if let Some(addr) = listen {
        server_config.listen_addr = addr;
    }

    let (catalog, users) = load_sources(config)?;

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let server = RelayServer::bind(server_config.clone()).await?;
    let ctx = RelayContext::new(Arc::new(catalog), Arc::new(users), server_config)
        .with_shutdown(signal_handler.shutdown_handle())
        .into_shared();

    server.serve(ctx).await?;

    info!("Shutdown complete");
    Ok(())
}
