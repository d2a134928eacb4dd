//! Appointments command: lists a user's consultations.

use chrono::{DateTime, Utc};

use consultrelay_core::{Appointment, AppointmentCatalog, StaticCatalog};

use crate::config::RelayConfig;
use crate::error::CliResult;

/// Prints the appointments `user` takes part in.
pub fn list(config: &RelayConfig, user: &str) -> CliResult<()> {
    let catalog = StaticCatalog::load(config.catalog_path())?;
    print!("{}", render(&catalog, user, Utc::now()));
    Ok(())
}

/// Renders one line per appointment, in start order.
pub fn render(catalog: &dyn AppointmentCatalog, user: &str, now: DateTime<Utc>) -> String {
    let appointments = catalog.list_for_user(user);
    if appointments.is_empty() {
        return format!("No appointments for {}.\n", user);
    }

    let mut out = String::new();
    for appointment in &appointments {
        let role = appointment
            .party_of(user)
            .map(|party| party.as_str())
            .unwrap_or("-");
        let with = appointment.counterpart_of(user).unwrap_or("-");
        out.push_str(&format!(
            "{:<12} {:<9} {} - {}  {:<8} with {}",
            appointment.id(),
            status(appointment, now),
            appointment.start().format("%Y-%m-%d %H:%M"),
            appointment.end().format("%H:%M"),
            role,
            with,
        ));
        if !appointment.description().is_empty() {
            out.push_str(&format!("  ({})", appointment.description()));
        }
        out.push('\n');
    }
    out
}

fn status(appointment: &Appointment, now: DateTime<Utc>) -> &'static str {
    if appointment.is_active_at(now) {
        "active"
    } else if appointment.is_upcoming_at(now) {
        "upcoming"
    } else {
        "ended"
    }
}
