//! Appointment model.
//!
//! An [`Appointment`] is one scheduled consultation between a doctor and a
//! patient. Its identifier doubles as the signaling room identifier, and its
//! `[start, end]` window bounds when either party may join that room.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The side of a consultation a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Doctor,
    Patient,
}

impl Party {
    /// Returns the lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog record shape, as found in the appointments JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A validated, immutable consultation appointment.
///
/// Construction enforces `start < end`, so every `Appointment` value has a
/// non-empty time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "AppointmentRecord")]
pub struct Appointment {
    id: String,
    doctor_id: String,
    patient_id: String,
    description: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Appointment {
    /// Creates a new appointment.
    ///
    /// Fails with [`CoreError::InvalidAppointment`] if the id is empty or the
    /// window is not strictly increasing.
    pub fn new(
        id: impl Into<String>,
        doctor_id: impl Into<String>,
        patient_id: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::invalid_appointment(id, "empty id"));
        }
        if start >= end {
            return Err(CoreError::invalid_appointment(
                id,
                format!("start ({start}) must be before end ({end})"),
            ));
        }

        Ok(Self {
            id,
            doctor_id: doctor_id.into(),
            patient_id: patient_id.into(),
            description: description.into(),
            start,
            end,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn doctor_id(&self) -> &str {
        &self.doctor_id
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the consultation window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns which party `username` is, if any.
    pub fn party_of(&self, username: &str) -> Option<Party> {
        if username == self.doctor_id {
            Some(Party::Doctor)
        } else if username == self.patient_id {
            Some(Party::Patient)
        } else {
            None
        }
    }

    /// Returns `true` if `username` is the doctor or the patient.
    pub fn is_party(&self, username: &str) -> bool {
        self.party_of(username).is_some()
    }

    /// Returns the other participant's identity for a given party member.
    pub fn counterpart_of(&self, username: &str) -> Option<&str> {
        match self.party_of(username)? {
            Party::Doctor => Some(&self.patient_id),
            Party::Patient => Some(&self.doctor_id),
        }
    }

    /// Returns `true` if `now` falls inside `[start, end]` (both inclusive).
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }

    /// Returns `true` if the window has not opened yet at `now`.
    pub fn is_upcoming_at(&self, now: DateTime<Utc>) -> bool {
        now < self.start
    }

    /// Returns `true` if the window has already closed at `now`.
    pub fn has_ended_at(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }
}

impl TryFrom<AppointmentRecord> for Appointment {
    type Error = CoreError;

    fn try_from(record: AppointmentRecord) -> CoreResult<Self> {
        Self::new(
            record.id,
            record.doctor_id,
            record.patient_id,
            record.description,
            record.start,
            record.end,
        )
    }
}

impl From<Appointment> for AppointmentRecord {
    fn from(appointment: Appointment) -> Self {
        Self {
            id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            description: appointment.description,
            start: appointment.start,
            end: appointment.end,
        }
    }
}
