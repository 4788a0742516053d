//! The choreography contract shared by every producer and consumer.
//!
//! One topic exchange, six routing keys, and one durable queue per
//! (consumer service, routing key) pair. Producers and consumers both import
//! these names instead of repeating string literals, so the wiring cannot
//! drift between services.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Name of the single shared topic exchange.
pub const EXCHANGE_NAME: &str = "disaster.topic.exchange";

/// Routing-key prefix for messages a consumer gave up on.
pub const DEAD_LETTER_PREFIX: &str = "deadletter";

/// Queue: mission service reacting to new incidents.
pub const MISSION_INCIDENT_CREATED_QUEUE: &str = "mission.incident.created.queue";
/// Queue: mission service reacting to escalations.
pub const MISSION_INCIDENT_ESCALATED_QUEUE: &str = "mission.incident.escalated.queue";
/// Queue: mission service reacting to low stock.
pub const MISSION_RESOURCE_CRITICAL_LOW_QUEUE: &str = "mission.resource.critical_low.queue";
/// Queue: task service reacting to completed assessments.
pub const TASK_ASSESSMENT_COMPLETED_QUEUE: &str = "task.assessment.completed.queue";
/// Queue: shelter service reacting to new incidents.
pub const SHELTER_INCIDENT_CREATED_QUEUE: &str = "shelter.incident.created.queue";
/// Queue: personnel service reacting to task assignment.
pub const PERSONNEL_TASK_ASSIGNED_QUEUE: &str = "personnel.task.assigned.queue";
/// Queue: roster changes kept for readers outside the platform.
pub const PERSONNEL_STATUS_QUEUE: &str = "personnel.status.queue";

/// The routing key of the dead-letter route for `queue`.
pub fn dead_letter_key(queue: &str) -> String {
    format!("{DEAD_LETTER_PREFIX}.{queue}")
}

// ---------------------------------------------------------------------------
// Routing keys
// ---------------------------------------------------------------------------

/// A routing key defined by the contract.
///
/// The same string doubles as the envelope's `eventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoutingKey {
    /// `incident.created`
    IncidentCreated,
    /// `incident.escalated`
    IncidentEscalated,
    /// `assessment.completed`
    AssessmentCompleted,
    /// `resource.critical_low`
    ResourceCriticalLow,
    /// `task.assigned`
    TaskAssigned,
    /// `personnel.status.changed`
    PersonnelStatusChanged,
}

impl RoutingKey {
    /// Every routing key in the contract.
    pub const ALL: [Self; 6] = [
        Self::IncidentCreated,
        Self::IncidentEscalated,
        Self::AssessmentCompleted,
        Self::ResourceCriticalLow,
        Self::TaskAssigned,
        Self::PersonnelStatusChanged,
    ];

    /// The dotted routing key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IncidentCreated => "incident.created",
            Self::IncidentEscalated => "incident.escalated",
            Self::AssessmentCompleted => "assessment.completed",
            Self::ResourceCriticalLow => "resource.critical_low",
            Self::TaskAssigned => "task.assigned",
            Self::PersonnelStatusChanged => "personnel.status.changed",
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingKey {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| CodecError::UnknownEventType(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Queue bindings
// ---------------------------------------------------------------------------

/// A queue bound to the exchange with a routing pattern.
///
/// Patterns follow topic-exchange rules: `*` matches exactly one word and
/// `#` matches zero or more. Every contract binding uses an exact key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    /// Queue name, unique per consumer service.
    pub queue: String,
    /// Routing pattern.
    pub pattern: String,
    /// Whether the queue survives broker restarts.
    pub durable: bool,
}

impl QueueBinding {
    /// A durable queue bound with `pattern`.
    pub fn durable(queue: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            pattern: pattern.into(),
            durable: true,
        }
    }

    /// The dead-letter queue collecting failures from `queue`. The queue
    /// is named after its own routing key.
    pub fn dead_letter(queue: &str) -> Self {
        let key = dead_letter_key(queue);
        Self::durable(key.clone(), key)
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// A participant in the choreography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Incident reporting. Producer only.
    Incident,
    /// Damage assessment. Producer only.
    Assessment,
    /// Logistics missions. Consumer only.
    Mission,
    /// Field tasks. Producer and consumer.
    Task,
    /// Resource stock. Producer only.
    Resource,
    /// Shelters. Consumer only.
    Shelter,
    /// Personnel. Producer and consumer.
    Personnel,
}

impl Service {
    /// Every service in the platform.
    pub const ALL: [Self; 7] = [
        Self::Incident,
        Self::Assessment,
        Self::Mission,
        Self::Task,
        Self::Resource,
        Self::Shelter,
        Self::Personnel,
    ];

    /// Lower-case service name used in config and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::Assessment => "assessment",
            Self::Mission => "mission",
            Self::Task => "task",
            Self::Resource => "resource",
            Self::Shelter => "shelter",
            Self::Personnel => "personnel",
        }
    }

    /// Routing keys this service publishes.
    pub const fn produces(self) -> &'static [RoutingKey] {
        match self {
            Self::Incident => &[RoutingKey::IncidentCreated, RoutingKey::IncidentEscalated],
            Self::Assessment => &[RoutingKey::AssessmentCompleted],
            Self::Resource => &[RoutingKey::ResourceCriticalLow],
            Self::Task => &[RoutingKey::TaskAssigned],
            Self::Personnel => &[RoutingKey::PersonnelStatusChanged],
            Self::Mission | Self::Shelter => &[],
        }
    }

    /// Queues this service consumes, with their bindings.
    pub fn bindings(self) -> Vec<QueueBinding> {
        let pairs: &[(&str, RoutingKey)] = match self {
            Self::Mission => &[
                (MISSION_INCIDENT_CREATED_QUEUE, RoutingKey::IncidentCreated),
                (MISSION_INCIDENT_ESCALATED_QUEUE, RoutingKey::IncidentEscalated),
                (MISSION_RESOURCE_CRITICAL_LOW_QUEUE, RoutingKey::ResourceCriticalLow),
            ],
            Self::Task => &[(TASK_ASSESSMENT_COMPLETED_QUEUE, RoutingKey::AssessmentCompleted)],
            Self::Shelter => &[(SHELTER_INCIDENT_CREATED_QUEUE, RoutingKey::IncidentCreated)],
            Self::Personnel => &[(PERSONNEL_TASK_ASSIGNED_QUEUE, RoutingKey::TaskAssigned)],
            Self::Incident | Self::Assessment | Self::Resource => &[],
        };
        pairs
            .iter()
            .map(|(queue, key)| QueueBinding::durable(*queue, key.as_str()))
            .collect()
    }

    /// Durable queues this service declares for its own events so that
    /// readers outside the platform can drain them. Nothing in the platform
    /// listens on them.
    pub fn published_queues(self) -> Vec<QueueBinding> {
        match self {
            Self::Personnel => vec![QueueBinding::durable(
                PERSONNEL_STATUS_QUEUE,
                RoutingKey::PersonnelStatusChanged.as_str(),
            )],
            Self::Incident
            | Self::Assessment
            | Self::Mission
            | Self::Task
            | Self::Resource
            | Self::Shelter => Vec::new(),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|svc| svc.as_str() == lowered)
            .ok_or_else(|| format!("unknown service: {s}"))
    }
}
