//! Core entity structs, one per owning service.
//!
//! Each entity is exclusively owned by its service's store. Other services
//! learn about it only through events on the topic bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    AssessmentStatus, DamageSeverity, IncidentStatus, IncidentType, MissionStatus, MissionType,
    Priority, ResourceType, Severity, ShelterStatus, TaskStatus, TaskType,
};
use crate::ids::{
    AssessmentId, IncidentId, MissionId, PersonnelId, ResourceId, ShelterId, TaskId,
};

// ---------------------------------------------------------------------------
// Incident service
// ---------------------------------------------------------------------------

/// A reported disaster incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Incident {
    /// Store-assigned id.
    pub id: IncidentId,
    /// Human-readable code, e.g. `INC-001`.
    pub incident_code: String,
    /// Kind of disaster.
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    /// Current severity. Only ever escalates.
    pub severity: Severity,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Free-text description.
    pub description: String,
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Street address used as the delivery destination.
    pub address: Option<String>,
    /// When the incident was reported.
    pub reported_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Assessment service
// ---------------------------------------------------------------------------

/// A field damage assessment for an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Assessment {
    /// Store-assigned id.
    pub id: AssessmentId,
    /// Human-readable code, e.g. `ASS-00001`.
    pub assessment_code: String,
    /// Incident under assessment.
    pub incident_id: IncidentId,
    /// Assessor's personnel id, if known.
    pub assessor_id: Option<PersonnelId>,
    /// Assessor's display name.
    pub assessor_name: Option<String>,
    /// Assessed damage severity.
    pub severity: DamageSeverity,
    /// Observations.
    pub findings: Option<String>,
    /// Recommendations.
    pub recommendations: Option<String>,
    /// Ordered list of actions; each becomes one task on completion.
    pub required_actions: Vec<String>,
    /// Where the assessment took place.
    pub location: Option<String>,
    /// Estimated casualty count.
    pub estimated_casualties: Option<u32>,
    /// Estimated displaced-person count.
    pub estimated_displaced: Option<u32>,
    /// Lifecycle status.
    pub status: AssessmentStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on completion.
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Mission service
// ---------------------------------------------------------------------------

/// A logistics mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Mission {
    /// Store-assigned id.
    pub id: MissionId,
    /// Human-readable code, e.g. `MIS-001`.
    pub mission_code: String,
    /// Kind of mission.
    #[serde(rename = "type")]
    pub mission_type: MissionType,
    /// Lifecycle status.
    pub status: MissionStatus,
    /// Where the mission departs from.
    pub origin: String,
    /// Where the mission goes. Unset for escalation rescues.
    pub destination: Option<String>,
    /// Free-text description.
    pub description: String,
    /// What is being carried.
    pub cargo_details: Option<String>,
    /// Vehicle class, e.g. `TRUCK` or `AMBULANCE`.
    pub vehicle_type: Option<String>,
    /// Assigned vehicle.
    pub vehicle_id: Option<String>,
    /// Assigned driver's name.
    pub driver_name: Option<String>,
    /// Triggering incident, when created from an incident event.
    pub incident_id: Option<IncidentId>,
    /// Triggering resource, when created from a low-stock event.
    pub resource_id: Option<ResourceId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// First transition into `IN_PROGRESS`.
    pub started_at: Option<DateTime<Utc>>,
    /// Transition into `COMPLETED`.
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Task service
// ---------------------------------------------------------------------------

/// A unit of field work assignable to one person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Task {
    /// Store-assigned id.
    pub id: TaskId,
    /// Human-readable code, e.g. `TSK-001`.
    pub task_code: String,
    /// Kind of task.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Short title. For generated tasks this is the action text verbatim.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Urgency.
    pub priority: Priority,
    /// Related incident.
    pub incident_id: Option<IncidentId>,
    /// Person doing the work.
    pub assigned_to: Option<PersonnelId>,
    /// Where the work happens.
    pub location: Option<String>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Resource service
// ---------------------------------------------------------------------------

/// A stocked relief resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Resource {
    /// Store-assigned id.
    pub id: ResourceId,
    /// Human-readable code, e.g. `RES-001`.
    pub resource_code: String,
    /// Category.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Units on hand.
    pub current_stock: u32,
    /// Stock strictly below this level is critically low.
    pub threshold: u32,
    /// Unit of measure (kg, liters, boxes).
    pub unit: Option<String>,
    /// Warehouse or storage location.
    pub location: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Whether stock sits strictly below the alert threshold.
    pub const fn is_critically_low(&self) -> bool {
        self.current_stock < self.threshold
    }
}

// ---------------------------------------------------------------------------
// Shelter service
// ---------------------------------------------------------------------------

/// An evacuation shelter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Shelter {
    /// Store-assigned id.
    pub id: ShelterId,
    /// Human-readable code, e.g. `SHE-001`.
    pub shelter_code: String,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: Option<String>,
    /// Latitude in decimal degrees. Shelters without coordinates are never
    /// activated by incidents.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Maximum occupancy.
    pub total_capacity: u32,
    /// People currently checked in.
    pub current_occupancy: u32,
    /// Lifecycle status.
    pub status: ShelterStatus,
    /// Contact person.
    pub contact_person: Option<String>,
    /// Contact phone number.
    pub contact_number: Option<String>,
    /// Available facilities (medical, food, water).
    pub facilities: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Shelter {
    /// Free places left.
    pub const fn available_capacity(&self) -> u32 {
        self.total_capacity.saturating_sub(self.current_occupancy)
    }

    /// Whether occupancy has reached capacity.
    pub const fn is_full(&self) -> bool {
        self.current_occupancy >= self.total_capacity
    }
}

// ---------------------------------------------------------------------------
// Personnel service
// ---------------------------------------------------------------------------

/// A skill held by a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Skill {
    /// Skill or profession name.
    pub skill_name: String,
    /// Proficiency level, free text.
    pub proficiency_level: String,
}

/// A person who can be assigned tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Person {
    /// Store-assigned id. Its code form is `PER-NNN`.
    pub id: PersonnelId,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Role, e.g. paramedic.
    pub role: Option<String>,
    /// Department.
    pub department: Option<String>,
    /// Rank.
    pub rank: Option<String>,
    /// Organization.
    pub organization: Option<String>,
    /// Skills.
    pub skills: Vec<Skill>,
    /// Free-text availability status, e.g. `Available` or `On Leave`.
    pub status: String,
    /// Whether the person carries a medical condition.
    pub has_medical_condition: bool,
    /// Shift start.
    pub shift_start: Option<DateTime<Utc>>,
    /// Shift end.
    pub shift_end: Option<DateTime<Utc>>,
    /// Disabled records are never matched.
    pub enabled: bool,
}

impl Person {
    /// Enabled and with a status mentioning "available" (any case).
    pub fn is_available(&self) -> bool {
        self.enabled && self.status.to_lowercase().contains("available")
    }

    /// `first last`.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shelter(total: u32, occupied: u32) -> Shelter {
        let now = Utc::now();
        Shelter {
            id: ShelterId::new(1),
            shelter_code: "SHE-001".to_owned(),
            name: "Town Hall".to_owned(),
            address: None,
            latitude: Some(6.9),
            longitude: Some(79.8),
            total_capacity: total,
            current_occupancy: occupied,
            status: ShelterStatus::Operational,
            contact_person: None,
            contact_number: None,
            facilities: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn shelter_capacity() {
        let s = shelter(10, 4);
        assert_eq!(s.available_capacity(), 6);
        assert!(!s.is_full());
        assert!(shelter(10, 10).is_full());
        assert_eq!(shelter(10, 12).available_capacity(), 0);
    }

    #[test]
    fn resource_low_stock_is_strict() {
        let now = Utc::now();
        let mut r = Resource {
            id: ResourceId::new(1),
            resource_code: "RES-001".to_owned(),
            resource_type: ResourceType::Water,
            name: "Bottled water".to_owned(),
            description: None,
            current_stock: 50,
            threshold: 50,
            unit: Some("liters".to_owned()),
            location: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!r.is_critically_low());
        r.current_stock = 49;
        assert!(r.is_critically_low());
    }

    #[test]
    fn person_availability_is_case_insensitive() {
        let mut p = Person {
            id: PersonnelId::new(301),
            first_name: "Nimal".to_owned(),
            last_name: "Perera".to_owned(),
            role: None,
            department: None,
            rank: None,
            organization: None,
            skills: Vec::new(),
            status: "AVAILABLE".to_owned(),
            has_medical_condition: false,
            shift_start: None,
            shift_end: None,
            enabled: true,
        };
        assert!(p.is_available());
        p.status = "Unavailable".to_owned();
        // substring match, so "Unavailable" still counts
        assert!(p.is_available());
        p.status = "On Leave".to_owned();
        assert!(!p.is_available());
        p.status = "available".to_owned();
        p.enabled = false;
        assert!(!p.is_available());
    }

    #[test]
    fn entity_uses_camel_case_and_type_key() {
        let now = Utc::now();
        let task = Task {
            id: TaskId::new(3),
            task_code: "TSK-003".to_owned(),
            task_type: TaskType::MedicalAid,
            title: "Provide medical aid".to_owned(),
            description: None,
            priority: Priority::High,
            incident_id: Some(IncidentId::new(1)),
            assigned_to: None,
            location: None,
            status: TaskStatus::Pending,
            created_at: now,
            completed_at: None,
        };
        let json = serde_json::to_value(&task).unwrap_or_default();
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("MEDICAL_AID"));
        assert_eq!(json.get("taskCode").and_then(|v| v.as_str()), Some("TSK-003"));
        assert!(json.get("assignedTo").is_some());
    }
}
