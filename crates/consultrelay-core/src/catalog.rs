//! Appointment catalog.
//!
//! The relay never owns appointment storage; it only asks a catalog two
//! questions: "which appointment has this id" and "which appointments does
//! this user take part in". [`StaticCatalog`] answers them from a list
//! loaded once at startup.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::appointment::{Appointment, AppointmentRecord};
use crate::error::{CoreError, CoreResult};

/// Read-only source of appointments.
pub trait AppointmentCatalog: Send + Sync {
    /// Finds an appointment by identifier.
    fn find(&self, id: &str) -> Option<Appointment>;

    /// Lists the appointments in which `username` is the doctor or the
    /// patient, ordered by start time.
    fn list_for_user(&self, username: &str) -> Vec<Appointment>;
}

/// In-memory catalog built from a fixed list of appointments.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    appointments: Vec<Appointment>,
}

impl StaticCatalog {
    /// Creates a catalog, rejecting duplicate identifiers.
    pub fn new(appointments: Vec<Appointment>) -> CoreResult<Self> {
        let mut seen = HashSet::with_capacity(appointments.len());
        for appointment in &appointments {
            if !seen.insert(appointment.id()) {
                return Err(CoreError::DuplicateAppointment {
                    id: appointment.id().to_string(),
                });
            }
        }
        Ok(Self { appointments })
    }

    /// Validates raw records and builds a catalog from them.
    pub fn from_records(records: Vec<AppointmentRecord>) -> CoreResult<Self> {
        let appointments = records
            .into_iter()
            .map(Appointment::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(appointments)
    }

    /// Parses a JSON array of catalog records.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let records: Vec<AppointmentRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Loads a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let catalog = Self::from_json(&content)?;
        debug!(
            path = %path.display(),
            count = catalog.len(),
            "Loaded appointment catalog"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    /// Iterates appointments in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter()
    }
}

impl AppointmentCatalog for StaticCatalog {
    fn find(&self, id: &str) -> Option<Appointment> {
        self.appointments.iter().find(|a| a.id() == id).cloned()
    }

    fn list_for_user(&self, username: &str) -> Vec<Appointment> {
        let mut matching: Vec<_> = self
            .appointments
            .iter()
            .filter(|a| a.is_party(username))
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.start());
        matching
    }
}
