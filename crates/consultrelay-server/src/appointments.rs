//! `GET /api/appointments?username=<u>` on the relay's listener.
//!
//! Lists the consultations a logged-in user takes part in so the client can
//! pick a room to join.

use tracing::debug;

use consultrelay_core::AppointmentCatalog;
use consultrelay_protocol::ProtocolError;

use crate::error::ServerResult;
use crate::login::HttpReply;

pub const APPOINTMENTS_PATH: &str = "/api/appointments";

/// Looks up `key` in a URL query string, percent-decoding its value.
pub fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name != key {
            return None;
        }
        let value = value.replace('+', " ");
        urlencoding::decode(&value).ok().map(|v| v.into_owned())
    })
}

/// Answers an appointments query.
///
/// - 200 with a JSON array of the user's appointments, ordered by start,
/// - 400 when `username` is missing or empty.
///
/// Unknown users get an empty array.
pub fn handle_appointments(
    catalog: &dyn AppointmentCatalog,
    query: &str,
) -> ServerResult<HttpReply> {
    let Some(username) = query_param(query, "username").filter(|u| !u.is_empty()) else {
        return Ok(HttpReply::bad_request("missing username"));
    };

    let appointments = catalog.list_for_user(&username);
    debug!(username = %username, count = appointments.len(), "Listed appointments");

    let body = serde_json::to_string(&appointments).map_err(ProtocolError::from)?;
    Ok(HttpReply::json(200, "OK", body))
}
