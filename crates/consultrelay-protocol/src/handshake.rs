//! HTTP/1.1 upgrade handshake.
//!
//! The client opens with a plain HTTP request carrying `Upgrade: websocket`
//! and a random `Sec-WebSocket-Key`. The server proves it understood by
//! answering `101 Switching Protocols` with
//! `Sec-WebSocket-Accept = base64(SHA1(key + GUID))`. Every byte after the
//! blank line that ends the request head belongs to the framed stream.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha1::{Digest, Sha1};

use crate::error::{ProtocolError, ProtocolResult};

/// Fixed GUID appended to the client key (RFC 6455, section 1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest request head accepted before the handshake is abandoned.
pub const MAX_HEAD_SIZE: usize = 8 * 1024;

const MAX_HEADERS: usize = 64;

/// Computes the `Sec-WebSocket-Accept` value for a client key.
///
/// # Example
///
/// ```rust
/// use consultrelay_protocol::accept_key;
///
/// assert_eq!(
///     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Parsed HTTP request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
    /// Length of the head including the terminating blank line.
    pub head_len: usize,
}

impl HttpRequest {
    /// Looks up a header value, ignoring case in the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the request asks to switch to the WebSocket
    /// protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("Upgrade")
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("websocket")))
    }

    /// The client's `Sec-WebSocket-Key`, if present and non-empty.
    pub fn websocket_key(&self) -> Option<&str> {
        self.header("Sec-WebSocket-Key")
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Declared body length; zero when absent or unparsable.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Parses the request head at the front of `buf`.
///
/// Returns `Ok(None)` while the head is still incomplete. Fails when the
/// bytes are not HTTP or the head grows past [`MAX_HEAD_SIZE`].
pub fn parse_request(buf: &[u8]) -> ProtocolResult<Option<HttpRequest>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    let head_len = match request.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            if buf.len() > MAX_HEAD_SIZE {
                return Err(ProtocolError::invalid_handshake("request head too large"));
            }
            return Ok(None);
        }
        Err(e) => return Err(ProtocolError::invalid_handshake(e.to_string())),
    };

    let headers = request
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    Ok(Some(HttpRequest {
        method: request.method.unwrap_or_default().to_string(),
        path: request.path.unwrap_or_default().to_string(),
        headers,
        head_len,
    }))
}

/// The `101 Switching Protocols` response completing the handshake.
pub fn switching_protocols(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

/// A plain HTTP response that closes the connection afterwards.
pub fn http_response(status: u16, reason: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n\
         {body}",
        body.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPGRADE: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: localhost:8080\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn rfc_sample_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn parses_upgrade_request() {
        let request = parse_request(UPGRADE).unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/chat");
        assert!(request.is_websocket_upgrade());
        assert_eq!(request.websocket_key(), Some("dGhlIHNhbXBsZSBub25jZQ=="));
        assert_eq!(request.head_len, UPGRADE.len());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let raw = b"GET / HTTP/1.1\r\nupgrade: WebSocket\r\nsec-websocket-key: abc\r\n\r\n";
        let request = parse_request(raw).unwrap().unwrap();
        assert!(request.is_websocket_upgrade());
        assert_eq!(request.header("SEC-WEBSOCKET-KEY"), Some("abc"));
    }

    #[test]
    fn head_len_excludes_trailing_frame_bytes() {
        let mut raw = UPGRADE.to_vec();
        raw.extend_from_slice(&[0x81, 0x80]);
        let request = parse_request(&raw).unwrap().unwrap();
        assert_eq!(&raw[request.head_len..], &[0x81, 0x80]);
    }

    #[test]
    fn partial_head_needs_more_bytes() {
        assert!(parse_request(&UPGRADE[..20]).unwrap().is_none());
    }

    #[test]
    fn oversized_partial_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_HEAD_SIZE));
        assert!(matches!(
            parse_request(&raw),
            Err(ProtocolError::InvalidHandshake(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_request(b"\x16\x03\x01\x00\x00\r\n\r\n").is_err());
    }

    #[test]
    fn plain_request_is_not_upgrade() {
        let raw = b"POST /login HTTP/1.1\r\nContent-Length: 12\r\n\r\n";
        let request = parse_request(raw).unwrap().unwrap();
        assert!(!request.is_websocket_upgrade());
        assert!(request.websocket_key().is_none());
        assert_eq!(request.content_length(), 12);
    }

    #[test]
    fn switching_protocols_is_byte_exact() {
        let response = switching_protocols("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(
            response,
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
    }

    #[test]
    fn http_response_sets_length() {
        let response = http_response(404, "Not Found", "text/plain", "nope");
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.contains("Content-Length: 4\r\n"));
        assert!(response.ends_with("\r\n\r\nnope"));
    }
}
