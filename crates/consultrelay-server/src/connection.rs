//! Accepted TCP connections and the HTTP exchange that precedes framing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

use consultrelay_protocol::{
    HttpRequest, ProtocolError, accept_key, http_response, parse_request, switching_protocols,
};

use crate::error::ServerResult;
use crate::registry::ConnectionId;

const READ_CHUNK: usize = 4096;

/// A client connection, holding one slot of the server's connection limit
/// for as long as it lives.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: TcpStream,
    permit: Option<OwnedSemaphorePermit>,
}

/// Request head plus whatever arrived after it in the same reads.
#[derive(Debug)]
pub struct RequestHead {
    pub request: HttpRequest,
    pub leftover: Vec<u8>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            stream,
            permit,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Reads until a full HTTP request head is buffered.
    ///
    /// Returns `Ok(None)` if the client closes before sending anything.
    pub async fn read_head(&mut self, timeout: Duration) -> ServerResult<Option<RequestHead>> {
        tokio::time::timeout(timeout, self.read_head_inner())
            .await
            .map_err(|_| ProtocolError::timeout("read request head"))?
    }

    async fn read_head_inner(&mut self) -> ServerResult<Option<RequestHead>> {
        let mut buf = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                if buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::invalid_handshake("connection closed mid-request").into());
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(request) = parse_request(&buf)? {
                let leftover = buf.split_off(request.head_len);
                return Ok(Some(RequestHead { request, leftover }));
            }
        }
    }

    /// Reads a request body of `len` bytes, starting from bytes already
    /// buffered with the head.
    pub async fn read_body(
        &mut self,
        mut body: Vec<u8>,
        len: usize,
        timeout: Duration,
    ) -> ServerResult<Vec<u8>> {
        if body.len() >= len {
            body.truncate(len);
            return Ok(body);
        }

        let have = body.len();
        body.resize(len, 0);
        tokio::time::timeout(timeout, self.stream.read_exact(&mut body[have..]))
            .await
            .map_err(|_| ProtocolError::timeout("read request body"))??;
        Ok(body)
    }

    /// Completes the WebSocket handshake for `request`.
    pub async fn accept_upgrade(&mut self, request: &HttpRequest) -> ServerResult<()> {
        let key = request
            .websocket_key()
            .ok_or_else(|| ProtocolError::invalid_handshake("missing Sec-WebSocket-Key"))?;
        let response = switching_protocols(&accept_key(key));
        self.stream.write_all(response.as_bytes()).await?;
        debug!(conn_id = self.id, path = %request.path, "WebSocket upgrade accepted");
        Ok(())
    }

    /// Writes a plain HTTP response and shuts the write side down.
    pub async fn respond(
        &mut self,
        status: u16,
        reason: &str,
        content_type: &str,
        body: &str,
    ) -> ServerResult<()> {
        let response = http_response(status, reason, content_type, body);
        self.stream.write_all(response.as_bytes()).await?;
        self.stream.shutdown().await?;
        debug!(conn_id = self.id, status, "HTTP response sent");
        Ok(())
    }

    /// Splits into read and write halves for the relay session. The permit
    /// travels with the returned guard.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf, ConnectionGuard) {
        let (reader, writer) = self.stream.into_split();
        let guard = ConnectionGuard {
            _permit: self.permit,
        };
        (reader, writer, guard)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// Keeps the connection slot reserved until dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    _permit: Option<OwnedSemaphorePermit>,
}
