//! The participating services of the DISA disaster-response platform.
//!
//! Each service owns its own store and talks to the others only through
//! events on the bus. Producers emit after their local commit; consumers
//! react from their own durable queues.
//!
//! ```text
//! incident ----incident.created----> mission, shelter
//!          ---incident.escalated---> mission
//! assessment -assessment.completed-> task
//! resource ---resource.critical_low-> mission
//! task ---------task.assigned------> personnel
//! personnel -personnel.status.changed-> personnel.status.queue (outside readers)
//! ```
//!
//! # Modules
//!
//! - [`incident`] -- Incident reporting and one-step escalation
//! - [`assessment`] -- Damage assessments and one-time completion
//! - [`resource`] -- Stock levels and low-stock alerts
//! - [`task`] -- Field tasks, assignment, and generation from assessments
//! - [`mission`] -- Logistics missions created in reaction to events
//! - [`shelter`] -- Shelter capacity and staged activation ([`ProximityMetric`])
//! - [`personnel`] -- Responder roster, status announcements and task matching
//! - [`matcher`] -- LLM-backed task-to-person selection with fallback
//! - [`platform`] -- Bus, services and listeners wired together ([`Platform`])
//! - [`store`] -- In-memory repository owned by one service
//! - [`error`] -- Service and platform errors ([`ServiceError`])

pub mod assessment;
pub mod error;
pub mod incident;
pub mod matcher;
pub mod mission;
pub mod personnel;
pub mod platform;
pub mod resource;
pub mod shelter;
pub mod store;
pub mod task;

pub use assessment::{AssessmentService, AssessmentUpdate, NewAssessment};
pub use error::{PlatformError, ServiceError};
pub use incident::{Escalation, IncidentService, IncidentUpdate, NewIncident};
pub use matcher::{LlmMatcher, MatchResult, MatcherConfig, TaskMatcher};
pub use mission::{MissionService, NewMission};
pub use personnel::{NewPerson, PersonnelService};
pub use platform::{Platform, PlatformConfig};
pub use resource::{NewResource, ResourceService, ResourceUpdate};
pub use shelter::{NewShelter, ProximityMetric, ShelterService, ShelterSettings};
pub use store::Store;
pub use task::{NewTask, TaskService, TaskSettings, TaskUpdate};
