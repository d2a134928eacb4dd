//! TCP listener and accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{ServerError, ServerResult};
use crate::handler::{SharedContext, make_connection_handler};

/// Relay server accepting WebSocket and login connections.
pub struct RelayServer {
    config: ServerConfig,
    listener: TcpListener,
    /// Limits concurrent connections.
    connection_semaphore: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl RelayServer {
    /// Binds to `config.listen_addr`.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        if config.max_connections == 0 {
            return Err(ServerError::config("max_connections must be at least 1"));
        }

        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| ServerError::bind(config.listen_addr, e))?;
        info!(addr = %listener.local_addr()?, "Relay server listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
            next_id: AtomicU64::new(1),
        })
    }

    /// The bound address; differs from the configured one when binding
    /// port 0.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts a single connection, waiting for a free slot first.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, peer_addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = id, peer = %peer_addr, "Accepted new connection");

        Ok(Connection::new(id, stream, peer_addr, Some(permit)))
    }

    /// Runs the accept loop, spawning `handler` for each connection.
    ///
    /// Runs until the task is dropped; accept errors are logged and skipped.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.run_until_shutdown(handler, std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then waits up to
    /// `shutdown_grace` for the spawned connections to finish.
    ///
    /// Connections still running after the grace period are aborted.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                accepted = self.accept() => match accepted {
                    Ok(connection) => {
                        sessions.spawn(handler(connection));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    log_join(finished);
                }
            }
        }

        self.drain(sessions).await;
        Ok(())
    }

    async fn drain(&self, mut sessions: JoinSet<()>) {
        if sessions.is_empty() {
            return;
        }
        info!(open = sessions.len(), "Waiting for open connections to finish");

        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(finished) = sessions.join_next().await {
                log_join(finished);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = sessions.len(),
                grace_ms = grace.as_millis() as u64,
                "Connections still open after grace period; aborting"
            );
            sessions.shutdown().await;
        }
    }

    /// Serves relay connections until `ctx.shutdown` fires. Live sessions
    /// see the same flag and close with 1001; once they are gone all room
    /// membership is dropped.
    pub async fn serve(&self, ctx: SharedContext) -> ServerResult<()> {
        let shutdown = ctx.shutdown.signal();
        let result = self
            .run_until_shutdown(make_connection_handler(Arc::clone(&ctx)), shutdown.wait())
            .await;
        ctx.registry.clear();
        info!("Relay server stopped");
        result
    }
}

fn log_join(finished: Result<(), JoinError>) {
    if let Err(e) = finished
        && e.is_panic()
    {
        error!(error = %e, "Connection task panicked");
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("config", &self.config)
            .field("local_addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}
