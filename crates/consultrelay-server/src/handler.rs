//! Per-connection dispatch.
//!
//! Every accepted connection first sends an HTTP request. A WebSocket
//! upgrade turns it into a relay session. `POST /api/login` and
//! `GET /api/appointments` are answered and closed. Anything else gets a 404.
//!
//! A relay session moves through these states:
//!
//! ```text
//!  AwaitingJoin ──join accepted──▶ InRoom ──EOF / Close / error──▶ closed
//!       │                                                           ▲
//!       └──── join rejected / join timeout / shutdown ──────────────┘
//! ```
//!
//! Before a join is accepted, other messages are ignored. In a room, every
//! message except `join` is broadcast verbatim to the other members.

use std::sync::Arc;
use std::{future::Future, pin::Pin};

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Duration, Instant};
use tracing::{Instrument, debug, info, info_span, warn};

use consultrelay_core::{AppointmentCatalog, Authenticator};
use consultrelay_protocol::{
    FrameAccumulator, Inbound, JoinRequest, Message, MessageAssembler, Opcode, Outbound,
    ProtocolResult, close_code, encode_close, encode_frame,
};

use crate::appointments::{APPOINTMENTS_PATH, handle_appointments};
use crate::config::ServerConfig;
use crate::connection::{Connection, RequestHead};
use crate::error::{ServerError, ServerResult};
use crate::gate::SessionGate;
use crate::login::{HttpReply, LOGIN_PATHS, MAX_LOGIN_BODY, handle_login};
use crate::registry::{ConnectionId, Peer, RoomRegistry};
use crate::signals::ShutdownHandle;

const READ_BUFFER: usize = 8 * 1024;

/// Everything a connection needs, shared by all of them.
pub struct RelayContext {
    pub registry: Arc<RoomRegistry>,
    pub catalog: Arc<dyn AppointmentCatalog>,
    pub gate: SessionGate,
    pub authenticator: Arc<dyn Authenticator>,
    pub config: ServerConfig,
    pub shutdown: ShutdownHandle,
}

/// Shared relay context.
pub type SharedContext = Arc<RelayContext>;

impl RelayContext {
    /// Creates a context with an empty registry and its own shutdown flag.
    pub fn new(
        catalog: Arc<dyn AppointmentCatalog>,
        authenticator: Arc<dyn Authenticator>,
        config: ServerConfig,
    ) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            gate: SessionGate::new(Arc::clone(&catalog)),
            catalog,
            authenticator,
            config,
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_registry(mut self, registry: Arc<RoomRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn into_shared(self) -> SharedContext {
        Arc::new(self)
    }
}

impl std::fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayContext")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    AwaitingJoin,
    InRoom { room_id: String, username: String },
}

impl SessionState {
    fn room_id(&self) -> Option<&str> {
        match self {
            Self::AwaitingJoin => None,
            Self::InRoom { room_id, .. } => Some(room_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Per-connection relay state.
struct Session {
    peer: Arc<Peer>,
    frames: FrameAccumulator,
    assembler: MessageAssembler,
    state: SessionState,
}

impl Session {
    fn new(peer: Arc<Peer>, max_frame_size: u64) -> Self {
        Self {
            peer,
            frames: FrameAccumulator::new(max_frame_size).requiring_mask(),
            assembler: MessageAssembler::new(max_frame_size),
            state: SessionState::AwaitingJoin,
        }
    }

    /// Queues an `error` message followed by a policy-violation Close.
    fn reject(&self, message: &str) -> ProtocolResult<()> {
        self.peer.send_text(&Outbound::error(message).to_json()?);
        self.peer
            .send(encode_close(close_code::POLICY_VIOLATION, message));
        Ok(())
    }
}

/// Handles connections against a shared [`RelayContext`].
#[derive(Debug, Clone)]
pub struct RelayHandler {
    ctx: SharedContext,
}

impl RelayHandler {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Serves one connection until it closes.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        let Some(RequestHead { request, leftover }) =
            conn.read_head(self.ctx.config.handshake_timeout).await?
        else {
            debug!("Client closed before sending a request");
            return Ok(());
        };

        if request.is_websocket_upgrade() {
            if request.websocket_key().is_none() {
                return send_reply(&mut conn, HttpReply::bad_request("missing Sec-WebSocket-Key"))
                    .await;
            }
            conn.accept_upgrade(&request).await?;
            return self.relay(conn, leftover).await;
        }

        let (path, query) = request.path.split_once('?').unwrap_or((request.path.as_str(), ""));
        let reply = match (request.method.as_str(), path) {
            ("POST", path) if LOGIN_PATHS.contains(&path) => {
                let len = request.content_length();
                if len > MAX_LOGIN_BODY {
                    HttpReply::bad_request("request body too large")
                } else {
                    let body = conn
                        .read_body(leftover, len, self.ctx.config.handshake_timeout)
                        .await?;
                    handle_login(self.ctx.authenticator.as_ref(), &body)?
                }
            }
            ("GET", APPOINTMENTS_PATH) => {
                handle_appointments(self.ctx.catalog.as_ref(), query)?
            }
            (method, path) => {
                debug!(method = %method, path = %path, "No route");
                HttpReply::not_found()
            }
        };
        send_reply(&mut conn, reply).await
    }

    async fn relay(&self, conn: Connection, leftover: Vec<u8>) -> ServerResult<()> {
        let conn_id = conn.id();
        let (mut reader, writer, _guard) = conn.into_split();

        let (outbox, queue) = mpsc::unbounded_channel();
        let peer = Arc::new(Peer::new(conn_id, outbox));
        let writer_task = tokio::spawn(
            write_loop(conn_id, writer, queue, self.ctx.config.write_timeout).in_current_span(),
        );

        let mut session = Session::new(Arc::clone(&peer), self.ctx.config.max_frame_size);
        session.frames.extend(&leftover);

        let result = self.read_loop(&mut session, &mut reader).await;

        // Closed: leave the room, then let the writer flush and exit once
        // the last sender is gone.
        self.ctx.registry.remove(&peer);
        drop(session);
        drop(peer);
        if let Err(e) = writer_task.await {
            warn!(error = %e, "Writer task failed");
        }
        debug!("Session closed");
        result
    }

    async fn read_loop(
        &self,
        session: &mut Session,
        reader: &mut OwnedReadHalf,
    ) -> ServerResult<()> {
        let join_deadline = Instant::now() + self.ctx.config.join_timeout;
        let mut buf = vec![0u8; READ_BUFFER];

        loop {
            match self.process_frames(session) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => return Ok(()),
                Err(e) => {
                    session.peer.send(encode_close(e.close_code(), &e.to_string()));
                    return Err(e.into());
                }
            }

            let awaiting_join = session.state == SessionState::AwaitingJoin;
            tokio::select! {
                read = reader.read(&mut buf) => match read? {
                    0 => {
                        debug!("Peer closed the connection");
                        return Ok(());
                    }
                    n => session.frames.extend(&buf[..n]),
                },
                _ = tokio::time::sleep_until(join_deadline), if awaiting_join => {
                    info!("No join before timeout");
                    session.reject("join timeout")?;
                    return Ok(());
                }
                _ = self.ctx.shutdown.signal().wait() => {
                    session
                        .peer
                        .send(encode_close(close_code::GOING_AWAY, "server shutting down"));
                    return Err(ServerError::Shutdown);
                }
            }
        }
    }

    /// Handles every complete message currently buffered.
    fn process_frames(&self, session: &mut Session) -> ProtocolResult<Flow> {
        while let Some(frame) = session.frames.next_frame()? {
            let Some(message) = session.assembler.push(frame)? else {
                continue;
            };

            let flow = match message {
                Message::Text(text) => self.dispatch(session, &text)?,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => self.dispatch(session, &text)?,
                    Err(_) => {
                        warn!("Dropping non-UTF-8 binary message");
                        Flow::Continue
                    }
                },
                Message::Ping(payload) => {
                    session.peer.send(encode_frame(Opcode::Pong, &payload));
                    Flow::Continue
                }
                Message::Pong(_) => Flow::Continue,
                Message::Close(close) => {
                    debug!(code = ?close.as_ref().map(|c| c.code), "Close received");
                    let echo = match close {
                        Some(frame) => encode_close(frame.code, ""),
                        None => encode_frame(Opcode::Close, &[]),
                    };
                    session.peer.send(echo);
                    Flow::Close
                }
            };

            if flow == Flow::Close {
                return Ok(Flow::Close);
            }
        }
        Ok(Flow::Continue)
    }

    fn dispatch(&self, session: &mut Session, text: &str) -> ProtocolResult<Flow> {
        let inbound = match Inbound::parse(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable message");
                return Ok(Flow::Continue);
            }
        };

        match inbound {
            Inbound::Join(join) => match session.state {
                SessionState::AwaitingJoin => self.join(session, join),
                SessionState::InRoom { ref room_id, .. } => {
                    debug!(room_id = %room_id, requested = %join.room_id, "Ignoring join while in a room");
                    Ok(Flow::Continue)
                }
            },
            Inbound::Relay(message) => {
                match session.state.room_id() {
                    Some(room_id) => {
                        let delivered = self.ctx.registry.broadcast_except(
                            room_id,
                            session.peer.id(),
                            &message.text,
                        );
                        debug!(room_id = %room_id, kind = %message.kind, delivered, "Relayed message");
                    }
                    None => debug!(kind = %message.kind, "Ignoring message before join"),
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn join(&self, session: &mut Session, join: JoinRequest) -> ProtocolResult<Flow> {
        let JoinRequest { room_id, username } = join;

        let appointment = match self.ctx.gate.validate_join(&room_id, &username, Utc::now()) {
            Ok(appointment) => appointment,
            Err(rejection) => {
                warn!(room_id = %room_id, username = %username, reason = ?rejection, "Join rejected");
                session.reject(&rejection.to_string())?;
                return Ok(Flow::Close);
            }
        };

        if !self.ctx.registry.admit(&room_id, &session.peer) {
            warn!(room_id = %room_id, "Peer already bound to another room");
            return Ok(Flow::Continue);
        }

        let notice = Outbound::user_joined(username.as_str()).to_json()?;
        let notified = self
            .ctx
            .registry
            .broadcast_except(&room_id, session.peer.id(), &notice);
        info!(
            room_id = %room_id,
            username = %username,
            role = ?appointment.party_of(&username),
            notified,
            "Joined room"
        );

        session.state = SessionState::InRoom { room_id, username };
        Ok(Flow::Continue)
    }
}

async fn send_reply(conn: &mut Connection, reply: HttpReply) -> ServerResult<()> {
    conn.respond(reply.status, reply.reason, reply.content_type, &reply.body)
        .await
}

/// Drains a peer's outbound queue into its socket.
///
/// Exits when every sender is gone (after flushing) or on the first failed
/// write. Either way the queue closes, so later broadcasts skip this peer.
async fn write_loop(
    conn_id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut queue: UnboundedReceiver<Vec<u8>>,
    timeout: Duration,
) {
    while let Some(frame) = queue.recv().await {
        match tokio::time::timeout(timeout, writer.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(conn_id, error = %e, "Write failed");
                return;
            }
            Err(_) => {
                warn!(conn_id, "Write timed out");
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}

/// Creates a connection handler for [`RelayServer::run`](crate::RelayServer::run).
pub fn make_connection_handler(
    ctx: SharedContext,
) -> impl Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    move |conn| {
        let handler = RelayHandler::new(ctx.clone());
        let span = info_span!("connection", conn_id = conn.id(), peer = %conn.peer_addr());
        Box::pin(
            async move {
                if let Err(e) = handler.handle_connection(conn).await
                    && !matches!(e, ServerError::Shutdown)
                {
                    warn!(error = %e, "Connection handler error");
                }
            }
            .instrument(span),
        )
    }
}
