//! Core types: appointments, the appointment catalog, credentials and
//! tracing setup.

pub mod appointment;
pub mod catalog;
pub mod credentials;
pub mod error;
pub mod tracing;

pub use appointment::{Appointment, AppointmentRecord, Party};
pub use catalog::{AppointmentCatalog, StaticCatalog};
pub use credentials::{
    AuthOutcome, AuthenticatedUser, Authenticator, Credentials, DEFAULT_HASH_COST,
    StaticUserDirectory, UserRecord, hash_password,
};
pub use error::{CoreError, CoreResult};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
