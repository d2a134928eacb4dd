//! Relay daemon: connection handling, session gate, room registry.
//!
//! This crate runs the signaling relay for video consultations:
//! - TCP listener with a connection limit
//! - WebSocket upgrade, `POST /api/login` and `GET /api/appointments` on
//!   the same port
//! - Join admission against the appointment catalog
//! - Room-scoped broadcast of signaling messages
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use consultrelay_core::{StaticCatalog, StaticUserDirectory};
//! use consultrelay_server::{RelayContext, RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = StaticCatalog::load("appointments.json")?;
//!     let users = StaticUserDirectory::load("users.json")?;
//!     let config = ServerConfig::default();
//!
//!     let server = RelayServer::bind(config.clone()).await?;
//!     let ctx = RelayContext::new(Arc::new(catalog), Arc::new(users), config).into_shared();
//!     server.serve(ctx).await?;
//!     Ok(())
//! }
//! ```

mod appointments;
mod config;
mod connection;
mod error;
mod gate;
mod handler;
mod login;
mod registry;
mod signals;
mod socket;

pub use appointments::{APPOINTMENTS_PATH, handle_appointments, query_param};
pub use config::{DEFAULT_LISTEN_ADDR, ServerConfig, default_listen_addr};
pub use connection::{Connection, ConnectionGuard, RequestHead};
pub use error::{ServerError, ServerResult};
pub use gate::{JoinRejection, SessionGate};
pub use handler::{RelayContext, RelayHandler, SharedContext, make_connection_handler};
pub use login::{HttpReply, LOGIN_PATH, LOGIN_PATHS, MAX_LOGIN_BODY, handle_login};
pub use registry::{ConnectionId, Peer, RoomRegistry};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::RelayServer;
