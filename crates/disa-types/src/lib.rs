//! Shared type definitions for the DISA disaster-response platform.
//!
//! Every service owns its own entities, but the shapes are defined once here
//! so that producers, consumers and the operator dashboard agree. Types flow
//! downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe numeric wrappers for all entity identifiers
//! - [`enums`] -- Severity, status and category enumerations
//! - [`structs`] -- Entity structs, one group per owning service

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AssessmentStatus, DamageSeverity, IncidentStatus, IncidentType, MissionStatus, MissionType,
    Priority, ResourceType, Severity, ShelterStatus, TaskStatus, TaskType,
};
pub use ids::{AssessmentId, IncidentId, MissionId, PersonnelId, ResourceId, ShelterId, TaskId};
pub use structs::{Assessment, Incident, Mission, Person, Resource, Shelter, Skill, Task};
