//! Event choreography contract for the DISA platform.
//!
//! Producers publish an [`EventEnvelope`] under its [`RoutingKey`] on the
//! shared topic exchange; each consumer service reads its own durable
//! queues, listed by [`Service::bindings`]. Nothing in this crate performs
//! I/O: the bus implementations live in `disa-bus`.
//!
//! # Modules
//!
//! - [`contract`] -- Exchange, routing keys, queue names and per-service bindings
//! - [`payload`] -- Payload struct per routing key
//! - [`envelope`] -- The [`Event`] sum type and the JSON envelope codec
//! - [`topic`] -- Topic pattern matching (`*` and `#` wildcards)
//! - [`error`] -- Codec errors

pub mod contract;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod topic;

pub use contract::{
    DEAD_LETTER_PREFIX, EXCHANGE_NAME, QueueBinding, RoutingKey, Service, dead_letter_key,
};
pub use envelope::{Event, EventEnvelope};
pub use error::CodecError;
pub use payload::{
    AssessmentCompleted, IncidentCreated, IncidentEscalated, PersonnelStatusChanged,
    ResourceCriticalLow, TaskAssigned, required,
};
pub use topic::matches;

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for payload shapes.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::payload::IncidentCreated::export_all();
        let _ = crate::payload::IncidentEscalated::export_all();
        let _ = crate::payload::AssessmentCompleted::export_all();
        let _ = crate::payload::ResourceCriticalLow::export_all();
        let _ = crate::payload::TaskAssigned::export_all();
        let _ = crate::payload::PersonnelStatusChanged::export_all();
    }
}
