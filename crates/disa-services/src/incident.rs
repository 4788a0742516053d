//! Incident service: records reported disasters and escalates them.
//!
//! Produces `incident.created` on every creation and `incident.escalated`
//! when an escalation actually raises the severity. Escalation moves exactly
//! one level; escalating a `CRITICAL` incident changes nothing and emits
//! nothing.

use chrono::Utc;
use disa_bus::{Bus, EventPublisher};
use disa_events::{IncidentCreated, IncidentEscalated, Service};
use disa_types::{Incident, IncidentId, IncidentStatus, IncidentType, Severity};
use serde::Deserialize;
use tracing::info;

use crate::error::ServiceError;
use crate::store::Store;

/// Reason recorded when the caller gives none.
pub const DEFAULT_ESCALATION_REASON: &str = "Manual escalation";

/// Fields supplied when reporting an incident.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    /// Kind of disaster.
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    /// Initial severity.
    pub severity: Severity,
    /// Free-text description.
    pub description: String,
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Street address.
    pub address: Option<String>,
}

/// Editable incident fields. Severity is absent: it only changes through
/// escalation, so every severity change is announced.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentUpdate {
    /// New kind of disaster.
    #[serde(rename = "type")]
    pub incident_type: Option<IncidentType>,
    /// New description.
    pub description: Option<String>,
    /// New latitude.
    pub latitude: Option<f64>,
    /// New longitude.
    pub longitude: Option<f64>,
    /// New address.
    pub address: Option<String>,
}

/// Result of an escalation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Escalation {
    /// Severity moved up one level and `incident.escalated` was emitted.
    Escalated {
        /// Severity before.
        previous: Severity,
        /// The updated incident.
        incident: Incident,
    },
    /// Already `CRITICAL`; nothing changed.
    AlreadyCritical(Incident),
}

impl Escalation {
    /// The incident after the request.
    pub const fn incident(&self) -> &Incident {
        match self {
            Self::Escalated { incident, .. } | Self::AlreadyCritical(incident) => incident,
        }
    }
}

/// Owns incidents and announces their creation and escalation.
#[derive(Debug, Clone)]
pub struct IncidentService {
    store: Store<Incident>,
    publisher: EventPublisher,
}

impl IncidentService {
    /// A service publishing inline on `bus`.
    pub fn new(bus: Bus) -> Self {
        Self::with_publisher(EventPublisher::best_effort(bus, Service::Incident))
    }

    /// A service using a prepared publisher.
    pub fn with_publisher(publisher: EventPublisher) -> Self {
        Self {
            store: Store::new(),
            publisher,
        }
    }

    /// Report a new incident with status `REPORTED` and announce it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Invalid`] for out-of-range coordinates.
    pub async fn create(&self, input: NewIncident) -> Result<Incident, ServiceError> {
        validate_coordinates(input.latitude, input.longitude)?;
        let now = Utc::now();
        let incident = self
            .store
            .insert_with(|id| Incident {
                id: IncidentId::new(id),
                incident_code: format!("INC-{id:03}"),
                incident_type: input.incident_type,
                severity: input.severity,
                status: IncidentStatus::Reported,
                description: input.description,
                latitude: input.latitude,
                longitude: input.longitude,
                address: input.address,
                reported_at: now,
                updated_at: now,
            })
            .await;

        info!(
            incident_id = %incident.id,
            incident_code = incident.incident_code,
            severity = %incident.severity,
            "incident reported"
        );
        self.publisher
            .emit(IncidentCreated {
                incident_id: Some(incident.id),
                incident_code: Some(incident.incident_code.clone()),
                incident_type: Some(incident.incident_type),
                severity: Some(incident.severity),
                latitude: incident.latitude,
                longitude: incident.longitude,
                address: incident.address.clone(),
                description: Some(incident.description.clone()),
            })
            .await;
        Ok(incident)
    }

    /// Look up one incident.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn get(&self, id: IncidentId) -> Result<Incident, ServiceError> {
        self.store
            .get(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("incident", id))
    }

    /// Every incident.
    pub async fn list(&self) -> Vec<Incident> {
        self.store.list().await
    }

    /// Incidents with `status`.
    pub async fn list_by_status(&self, status: IncidentStatus) -> Vec<Incident> {
        self.store.filter(|i| i.status == status).await
    }

    /// Edit descriptive fields. Emits nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] or [`ServiceError::Invalid`].
    pub async fn update(
        &self,
        id: IncidentId,
        changes: IncidentUpdate,
    ) -> Result<Incident, ServiceError> {
        validate_coordinates(changes.latitude, changes.longitude)?;
        self.store
            .update(id.into_inner(), |incident| {
                if let Some(t) = changes.incident_type {
                    incident.incident_type = t;
                }
                if let Some(d) = changes.description {
                    incident.description = d;
                }
                if changes.latitude.is_some() {
                    incident.latitude = changes.latitude;
                }
                if changes.longitude.is_some() {
                    incident.longitude = changes.longitude;
                }
                if changes.address.is_some() {
                    incident.address = changes.address;
                }
                incident.updated_at = Utc::now();
                incident.clone()
            })
            .await
            .ok_or_else(|| ServiceError::not_found("incident", id))
    }

    /// Set the lifecycle status. Any status may follow any other.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn update_status(
        &self,
        id: IncidentId,
        status: IncidentStatus,
    ) -> Result<Incident, ServiceError> {
        self.store
            .update(id.into_inner(), |incident| {
                incident.status = status;
                incident.updated_at = Utc::now();
                incident.clone()
            })
            .await
            .ok_or_else(|| ServiceError::not_found("incident", id))
    }

    /// Escalate one severity level with the default reason.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn escalate(&self, id: IncidentId) -> Result<Escalation, ServiceError> {
        self.escalate_with_reason(id, DEFAULT_ESCALATION_REASON).await
    }

    /// Escalate one severity level, announcing the change with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn escalate_with_reason(
        &self,
        id: IncidentId,
        reason: &str,
    ) -> Result<Escalation, ServiceError> {
        let outcome = self
            .store
            .update(id.into_inner(), |incident| {
                let previous = incident.severity;
                match previous.next() {
                    Some(next) => {
                        incident.severity = next;
                        incident.updated_at = Utc::now();
                        Escalation::Escalated {
                            previous,
                            incident: incident.clone(),
                        }
                    }
                    None => Escalation::AlreadyCritical(incident.clone()),
                }
            })
            .await
            .ok_or_else(|| ServiceError::not_found("incident", id))?;

        match &outcome {
            Escalation::Escalated { previous, incident } => {
                info!(
                    incident_id = %incident.id,
                    from = %previous,
                    to = %incident.severity,
                    "incident escalated"
                );
                self.publisher
                    .emit(IncidentEscalated {
                        incident_id: Some(incident.id),
                        incident_code: Some(incident.incident_code.clone()),
                        previous_severity: Some(*previous),
                        new_severity: Some(incident.severity),
                        reason: Some(reason.to_owned()),
                    })
                    .await;
            }
            Escalation::AlreadyCritical(incident) => {
                info!(incident_id = %incident.id, "incident already critical, escalation ignored");
            }
        }
        Ok(outcome)
    }

    /// Delete an incident. Emits nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn delete(&self, id: IncidentId) -> Result<(), ServiceError> {
        self.store
            .remove(id.into_inner())
            .await
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("incident", id))
    }
}

fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), ServiceError> {
    if let Some(lat) = latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        return Err(ServiceError::Invalid(format!("latitude out of range: {lat}")));
    }
    if let Some(lon) = longitude
        && !(-180.0..=180.0).contains(&lon)
    {
        return Err(ServiceError::Invalid(format!("longitude out of range: {lon}")));
    }
    Ok(())
}
