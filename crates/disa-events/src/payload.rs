//! Event payloads, one struct per routing key.
//!
//! Every field is optional on the wire: consumers ignore unknown fields and
//! check only the fields their own reaction needs (see [`required`]). A
//! payload missing a field one consumer needs still decodes, so a consumer
//! that does not need it keeps working. Enum fields decode leniently: a value
//! outside the known set (a newer producer's `"type": "VOLCANO"`) reads as
//! `None` instead of failing the whole message.

use disa_types::{
    AssessmentId, DamageSeverity, IncidentId, IncidentType, PersonnelId, Priority, ResourceId,
    ResourceType, Severity, TaskType,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::error::CodecError;

/// Unwrap a payload field a reaction cannot do without.
///
/// # Errors
///
/// Returns [`CodecError::MissingField`] naming `field` when it is absent.
pub const fn required<'a, T>(
    value: Option<&'a T>,
    field: &'static str,
) -> Result<&'a T, CodecError> {
    match value {
        Some(v) => Ok(v),
        None => Err(CodecError::MissingField(field)),
    }
}

/// Decode an optional enum field, reading unrecognised values as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

/// Payload of `incident.created`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct IncidentCreated {
    /// Incident id.
    pub incident_id: Option<IncidentId>,
    /// Incident code, e.g. `INC-001`.
    pub incident_code: Option<String>,
    /// Kind of disaster.
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub incident_type: Option<IncidentType>,
    /// Severity at creation.
    #[serde(default, deserialize_with = "lenient")]
    pub severity: Option<Severity>,
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Street address.
    pub address: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
}

/// Payload of `incident.escalated`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct IncidentEscalated {
    /// Incident id.
    pub incident_id: Option<IncidentId>,
    /// Incident code.
    pub incident_code: Option<String>,
    /// Severity before the escalation.
    #[serde(default, deserialize_with = "lenient")]
    pub previous_severity: Option<Severity>,
    /// Severity after the escalation, exactly one step higher.
    #[serde(default, deserialize_with = "lenient")]
    pub new_severity: Option<Severity>,
    /// Why the incident was escalated.
    pub reason: Option<String>,
}

/// Payload of `assessment.completed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct AssessmentCompleted {
    /// Assessment id.
    pub assessment_id: Option<AssessmentId>,
    /// Assessment code, e.g. `ASS-00001`.
    pub assessment_code: Option<String>,
    /// Assessed incident.
    pub incident_id: Option<IncidentId>,
    /// Who assessed it.
    pub assessor_id: Option<PersonnelId>,
    /// Damage severity.
    #[serde(default, deserialize_with = "lenient")]
    pub severity: Option<DamageSeverity>,
    /// Observations.
    pub findings: Option<String>,
    /// Ordered actions; each becomes one task.
    pub required_actions: Option<Vec<String>>,
    /// Where the work is needed.
    pub location: Option<String>,
}

/// Payload of `resource.critical_low`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ResourceCriticalLow {
    /// Resource id.
    pub resource_id: Option<ResourceId>,
    /// Resource code, e.g. `RES-001`.
    pub resource_code: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Category.
    #[serde(default, deserialize_with = "lenient")]
    pub resource_type: Option<ResourceType>,
    /// Stock after the mutation.
    pub current_stock: Option<u32>,
    /// Alert threshold.
    pub threshold: Option<u32>,
    /// Storage location, used as the restock destination.
    pub location: Option<String>,
}

/// Payload of `task.assigned`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TaskAssigned {
    /// Task code (not the numeric id), e.g. `TSK-004`.
    pub task_id: Option<String>,
    /// Personnel code, e.g. `PER-301`.
    pub assigned_to: Option<String>,
    /// Kind of task.
    #[serde(default, deserialize_with = "lenient")]
    pub task_type: Option<TaskType>,
    /// Urgency.
    #[serde(default, deserialize_with = "lenient")]
    pub priority: Option<Priority>,
    /// Where the work happens.
    pub location: Option<String>,
}

/// Payload of `personnel.status.changed`, emitted on every roster change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct PersonnelStatusChanged {
    /// Person id.
    pub personnel_id: Option<PersonnelId>,
    /// Personnel code, e.g. `PER-301`.
    pub personnel_code: Option<String>,
    /// First and last name.
    pub full_name: Option<String>,
    /// `AVAILABLE` or `UNAVAILABLE`.
    pub status: Option<String>,
    /// Role, `UNKNOWN` when unset.
    pub role: Option<String>,
    /// Skill names joined with `, `.
    pub skills: Option<String>,
    /// Whether the person can take tasks.
    pub is_available: Option<bool>,
    /// What happened, e.g. `Personnel created`.
    pub notes: Option<String>,
}
