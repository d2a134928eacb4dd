//! `POST /api/login` on the relay's listener.
//!
//! Clients log in over plain HTTP first and then present the returned
//! username in their `join` message. `/login` is kept as an alias.

use serde::Serialize;
use tracing::{debug, info};

use consultrelay_core::{AuthOutcome, AuthenticatedUser, Authenticator, Credentials};
use consultrelay_protocol::ProtocolError;

use crate::error::ServerResult;

pub const LOGIN_PATH: &str = "/api/login";

/// Paths answered by [`handle_login`].
pub const LOGIN_PATHS: [&str; 2] = [LOGIN_PATH, "/login"];

/// Largest accepted login body.
pub const MAX_LOGIN_BODY: usize = 16 * 1024;

/// A plain HTTP response, before serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpReply {
    pub fn text(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    pub(crate) fn json(status: u16, reason: &'static str, body: String) -> Self {
        Self {
            status,
            reason,
            content_type: "application/json",
            body,
        }
    }

    pub fn not_found() -> Self {
        Self::text(404, "Not Found", "not found")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::text(400, "Bad Request", message)
    }
}

#[derive(Serialize)]
struct LoginReply<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a AuthenticatedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl LoginReply<'_> {
    fn into_reply(self, status: u16, reason: &'static str) -> ServerResult<HttpReply> {
        let body = serde_json::to_string(&self).map_err(ProtocolError::from)?;
        Ok(HttpReply::json(status, reason, body))
    }
}

/// Authenticates a login body and builds the response.
///
/// - 200 with `{"success":true,"user":{...}}` on success,
/// - 401 with `{"success":false,"message":...}` on bad credentials,
/// - 400 when the body is not `{username, password}` JSON.
pub fn handle_login(authenticator: &dyn Authenticator, body: &[u8]) -> ServerResult<HttpReply> {
    let credentials: Credentials = match serde_json::from_slice(body) {
        Ok(credentials) => credentials,
        Err(e) => {
            debug!(error = %e, "Malformed login body");
            return LoginReply {
                success: false,
                user: None,
                message: Some("malformed login request"),
            }
            .into_reply(400, "Bad Request");
        }
    };

    match authenticator.authenticate(&credentials) {
        AuthOutcome::Success(user) => {
            info!(username = %user.username, role = %user.role, "Login succeeded");
            LoginReply {
                success: true,
                user: Some(&user),
                message: None,
            }
            .into_reply(200, "OK")
        }
        AuthOutcome::Failure { message } => {
            info!(username = %credentials.username, "Login failed");
            LoginReply {
                success: false,
                user: None,
                message: Some(&message),
            }
            .into_reply(401, "Unauthorized")
        }
    }
}
