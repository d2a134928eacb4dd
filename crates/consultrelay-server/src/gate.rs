//! Join admission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use consultrelay_core::{Appointment, AppointmentCatalog};

/// Why a join was refused. The display text is what the client receives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRejection {
    #[error("appointment not found")]
    UnknownRoom { room_id: String },

    #[error("not a participant of this appointment")]
    Forbidden { room_id: String, username: String },

    #[error("appointment is not active")]
    NotActive {
        room_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Decides whether a user may enter an appointment's room.
///
/// Holds no membership state; admission itself is the registry's job.
#[derive(Clone)]
pub struct SessionGate {
    catalog: Arc<dyn AppointmentCatalog>,
}

impl SessionGate {
    pub fn new(catalog: Arc<dyn AppointmentCatalog>) -> Self {
        Self { catalog }
    }

    /// Checks, in order: the appointment exists, `username` is its doctor
    /// or patient, and `now` falls inside `[start, end]`.
    pub fn validate_join(
        &self,
        room_id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Appointment, JoinRejection> {
        let appointment = self
            .catalog
            .find(room_id)
            .ok_or_else(|| JoinRejection::UnknownRoom {
                room_id: room_id.to_string(),
            })?;

        if !appointment.is_party(username) {
            return Err(JoinRejection::Forbidden {
                room_id: room_id.to_string(),
                username: username.to_string(),
            });
        }

        if !appointment.is_active_at(now) {
            return Err(JoinRejection::NotActive {
                room_id: room_id.to_string(),
                start: appointment.start(),
                end: appointment.end(),
            });
        }

        Ok(appointment)
    }
}

impl std::fmt::Debug for SessionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGate").finish_non_exhaustive()
    }
}
