//! Error types for service operations.
//!
//! Every caller-facing operation returns [`ServiceError`]. Domain conflicts
//! and not-found lookups are reported here and never emit an event.

use disa_bus::{BusError, ReactionError};

/// Errors returned by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No row with this id.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity looked up.
        entity: &'static str,
        /// The id that was asked for.
        id: String,
    },

    /// The operation contradicts the entity's current state, e.g. completing
    /// an assessment twice.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The entity is not in a state that allows this operation yet.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Not enough stock or capacity.
    #[error("insufficient {what}: requested {requested}, available {available}")]
    Insufficient {
        /// What ran short.
        what: &'static str,
        /// Amount asked for.
        requested: u32,
        /// Amount on hand.
        available: u32,
    },

    /// Input failed validation.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Task-to-person matching could not produce a candidate.
    #[error("matcher error: {0}")]
    Matcher(String),
}

impl ServiceError {
    /// Shorthand for [`ServiceError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<ServiceError> for ReactionError {
    fn from(err: ServiceError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Errors raised while starting the platform.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// A queue could not be declared on the bus.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// A service could not be built from its settings.
    #[error("service setup failed: {0}")]
    Service(#[from] ServiceError),
}
