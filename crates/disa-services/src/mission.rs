//! Mission service: logistics missions, mostly created by reaction.
//!
//! Consumes `incident.created`, `incident.escalated` and
//! `resource.critical_low`, creating one `PENDING` mission per event. There
//! is no de-duplication: two events for the same incident create two
//! missions.

use chrono::Utc;
use disa_bus::{Reaction, ReactionError};
use disa_events::{Event, IncidentCreated, IncidentEscalated, ResourceCriticalLow, required};
use disa_types::{IncidentId, Mission, MissionId, MissionStatus, MissionType, ResourceId};
use serde::Deserialize;
use tracing::info;

use crate::error::ServiceError;
use crate::store::Store;

/// Where supply deliveries depart from.
pub const CENTRAL_WAREHOUSE: &str = "Central Warehouse";
/// Where rescue missions depart from.
pub const FIRE_STATION_HQ: &str = "Fire Station HQ";
/// Cargo of an incident supply delivery.
pub const EMERGENCY_CARGO: &str = "Food, Water, Medical Supplies";
/// Vehicle class for deliveries.
pub const TRUCK: &str = "TRUCK";
/// Vehicle class for rescues.
pub const AMBULANCE: &str = "AMBULANCE";

/// Fields supplied when planning a mission by hand.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMission {
    /// Kind of mission.
    #[serde(rename = "type")]
    pub mission_type: MissionType,
    /// Departure point.
    pub origin: String,
    /// Destination.
    #[serde(default)]
    pub destination: Option<String>,
    /// Free-text description.
    pub description: String,
    /// Cargo.
    #[serde(default)]
    pub cargo_details: Option<String>,
    /// Vehicle class.
    #[serde(default)]
    pub vehicle_type: Option<String>,
    /// Related incident.
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
    /// Related resource.
    #[serde(default)]
    pub resource_id: Option<ResourceId>,
}

/// Owns missions.
#[derive(Debug, Clone, Default)]
pub struct MissionService {
    store: Store<Mission>,
}

impl MissionService {
    /// An empty mission service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `PENDING` mission.
    pub async fn create(&self, input: NewMission) -> Mission {
        let mission = self
            .store
            .insert_with(|id| Mission {
                id: MissionId::new(id),
                mission_code: format!("MIS-{id:03}"),
                mission_type: input.mission_type,
                status: MissionStatus::Pending,
                origin: input.origin,
                destination: input.destination,
                description: input.description,
                cargo_details: input.cargo_details,
                vehicle_type: input.vehicle_type,
                vehicle_id: None,
                driver_name: None,
                incident_id: input.incident_id,
                resource_id: input.resource_id,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
            })
            .await;
        info!(
            mission_code = mission.mission_code,
            mission_type = %mission.mission_type,
            destination = mission.destination.as_deref().unwrap_or("-"),
            "mission created"
        );
        mission
    }

    /// Look up one mission.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn get(&self, id: MissionId) -> Result<Mission, ServiceError> {
        self.store
            .get(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("mission", id))
    }

    /// Every mission.
    pub async fn list(&self) -> Vec<Mission> {
        self.store.list().await
    }

    /// Missions with `status`.
    pub async fn by_status(&self, status: MissionStatus) -> Vec<Mission> {
        self.store.filter(|m| m.status == status).await
    }

    /// Missions of one kind.
    pub async fn by_type(&self, mission_type: MissionType) -> Vec<Mission> {
        self.store.filter(|m| m.mission_type == mission_type).await
    }

    /// Missions triggered by one incident.
    pub async fn by_incident(&self, incident_id: IncidentId) -> Vec<Mission> {
        self.store.filter(|m| m.incident_id == Some(incident_id)).await
    }

    /// Move a mission along its lifecycle. Entering `IN_PROGRESS` stamps
    /// `started_at` if unset; entering `COMPLETED` stamps `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::InvalidState`]
    /// for a transition the lifecycle does not allow.
    pub async fn update_status(
        &self,
        id: MissionId,
        status: MissionStatus,
    ) -> Result<Mission, ServiceError> {
        let mission = self
            .store
            .update(id.into_inner(), |m| {
                if !m.status.can_transition_to(status) {
                    return Err(ServiceError::InvalidState(format!(
                        "mission {} cannot move from {} to {status}",
                        m.mission_code, m.status
                    )));
                }
                let now = Utc::now();
                m.status = status;
                match status {
                    MissionStatus::InProgress => {
                        m.started_at.get_or_insert(now);
                    }
                    MissionStatus::Completed => m.completed_at = Some(now),
                    MissionStatus::Pending | MissionStatus::Cancelled => {}
                }
                Ok(m.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("mission", id))??;
        info!(mission_code = mission.mission_code, status = %mission.status, "mission status changed");
        Ok(mission)
    }

    /// Attach a vehicle and driver.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Conflict`] once
    /// the mission is completed or cancelled.
    pub async fn assign_vehicle(
        &self,
        id: MissionId,
        vehicle_id: &str,
        driver_name: &str,
    ) -> Result<Mission, ServiceError> {
        self.store
            .update(id.into_inner(), |m| {
                if m.status.is_terminal() {
                    return Err(ServiceError::Conflict(format!(
                        "mission {} is {}",
                        m.mission_code, m.status
                    )));
                }
                m.vehicle_id = Some(vehicle_id.to_owned());
                m.driver_name = Some(driver_name.to_owned());
                Ok(m.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("mission", id))?
    }

    /// Delete a mission.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn delete(&self, id: MissionId) -> Result<(), ServiceError> {
        self.store
            .remove(id.into_inner())
            .await
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("mission", id))
    }

    // -----------------------------------------------------------------------
    // Reactions
    // -----------------------------------------------------------------------

    /// Supply delivery to a newly reported incident.
    async fn on_incident_created(&self, p: &IncidentCreated) -> Result<Mission, ReactionError> {
        let address = required(p.address.as_ref(), "address")?;
        let severity = required(p.severity.as_ref(), "severity")?;
        Ok(self
            .create(NewMission {
                mission_type: MissionType::Delivery,
                origin: CENTRAL_WAREHOUSE.to_owned(),
                destination: Some(address.clone()),
                description: format!("Emergency supplies delivery. Severity: {severity}"),
                cargo_details: Some(EMERGENCY_CARGO.to_owned()),
                vehicle_type: Some(TRUCK.to_owned()),
                incident_id: p.incident_id,
                resource_id: None,
            })
            .await)
    }

    /// Rescue for an escalated incident. No destination is known here.
    async fn on_incident_escalated(&self, p: &IncidentEscalated) -> Result<Mission, ReactionError> {
        let incident_id = *required(p.incident_id.as_ref(), "incidentId")?;
        Ok(self
            .create(NewMission {
                mission_type: MissionType::Rescue,
                origin: FIRE_STATION_HQ.to_owned(),
                destination: None,
                description: "Urgent rescue operation - Escalated Incident".to_owned(),
                cargo_details: None,
                vehicle_type: Some(AMBULANCE.to_owned()),
                incident_id: Some(incident_id),
                resource_id: None,
            })
            .await)
    }

    /// Restock delivery to the resource's storage location.
    async fn on_resource_critical_low(
        &self,
        p: ResourceCriticalLow,
    ) -> Result<Mission, ReactionError> {
        let location = required(p.location.as_ref(), "location")?;
        let cargo = p
            .resource_type
            .map(|t| t.to_string())
            .or(p.name)
            .map(|what| format!("{what} supplies"));
        Ok(self
            .create(NewMission {
                mission_type: MissionType::Delivery,
                origin: CENTRAL_WAREHOUSE.to_owned(),
                destination: Some(location.clone()),
                description: "Critical resource delivery - Low Stock Alert".to_owned(),
                cargo_details: cargo,
                vehicle_type: Some(TRUCK.to_owned()),
                incident_id: None,
                resource_id: p.resource_id,
            })
            .await)
    }
}

impl Reaction for MissionService {
    fn name(&self) -> &'static str {
        "mission"
    }

    async fn react(&self, event: Event) -> Result<(), ReactionError> {
        match event {
            Event::IncidentCreated(p) => self.on_incident_created(&p).await.map(|_| ()),
            Event::IncidentEscalated(p) => self.on_incident_escalated(&p).await.map(|_| ()),
            Event::ResourceCriticalLow(p) => self.on_resource_critical_low(p).await.map(|_| ()),
            other => Err(ReactionError::Unexpected(other.routing_key().to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use disa_events::TaskAssigned;
    use disa_types::{ResourceType, Severity};

    use super::*;

    #[tokio::test]
    async fn incident_created_plans_a_delivery() {
        let service = MissionService::new();
        service
            .react(Event::IncidentCreated(IncidentCreated {
                incident_id: Some(IncidentId::new(1)),
                severity: Some(Severity::High),
                address: Some("12 Main St".to_owned()),
                ..IncidentCreated::default()
            }))
            .await
            .unwrap();

        let missions = service.list().await;
        assert_eq!(missions.len(), 1);
        let m = missions.first().unwrap();
        assert_eq!(m.mission_code, "MIS-001");
        assert_eq!(m.mission_type, MissionType::Delivery);
        assert_eq!(m.status, MissionStatus::Pending);
        assert_eq!(m.origin, CENTRAL_WAREHOUSE);
        assert_eq!(m.destination.as_deref(), Some("12 Main St"));
        assert_eq!(m.description, "Emergency supplies delivery. Severity: HIGH");
        assert_eq!(m.cargo_details.as_deref(), Some(EMERGENCY_CARGO));
        assert_eq!(m.vehicle_type.as_deref(), Some(TRUCK));
        assert_eq!(m.incident_id, Some(IncidentId::new(1)));
    }

    #[tokio::test]
    async fn escalation_plans_a_rescue_without_destination() {
        let service = MissionService::new();
        service
            .react(Event::IncidentEscalated(IncidentEscalated {
                incident_id: Some(IncidentId::new(4)),
                ..IncidentEscalated::default()
            }))
            .await
            .unwrap();
        let rescues = service.by_type(MissionType::Rescue).await;
        assert_eq!(rescues.len(), 1);
        let m = rescues.first().unwrap();
        assert_eq!(m.origin, FIRE_STATION_HQ);
        assert!(m.destination.is_none());
        assert_eq!(m.vehicle_type.as_deref(), Some(AMBULANCE));
        assert_eq!(service.by_incident(IncidentId::new(4)).await.len(), 1);
    }

    #[tokio::test]
    async fn low_stock_plans_a_restock() {
        let service = MissionService::new();
        service
            .react(Event::ResourceCriticalLow(ResourceCriticalLow {
                resource_id: Some(ResourceId::new(2)),
                resource_type: Some(ResourceType::Water),
                location: Some("Warehouse B".to_owned()),
                ..ResourceCriticalLow::default()
            }))
            .await
            .unwrap();
        let m = service.list().await.into_iter().next().unwrap();
        assert_eq!(m.description, "Critical resource delivery - Low Stock Alert");
        assert_eq!(m.cargo_details.as_deref(), Some("WATER supplies"));
        assert_eq!(m.destination.as_deref(), Some("Warehouse B"));
        assert_eq!(m.resource_id, Some(ResourceId::new(2)));
    }

    #[tokio::test]
    async fn missing_fields_fail_without_side_effects() {
        let service = MissionService::new();
        let no_address = service
            .react(Event::IncidentCreated(IncidentCreated {
                severity: Some(Severity::Low),
                ..IncidentCreated::default()
            }))
            .await;
        assert!(matches!(no_address, Err(ReactionError::MissingField("address"))));
        let no_location = service
            .react(Event::ResourceCriticalLow(ResourceCriticalLow::default()))
            .await;
        assert!(matches!(no_location, Err(ReactionError::MissingField("location"))));
        let wrong = service.react(Event::TaskAssigned(TaskAssigned::default())).await;
        assert!(matches!(wrong, Err(ReactionError::Unexpected(_))));
        assert!(service.list().await.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_is_enforced() {
        let service = MissionService::new();
        let m = service
            .create(NewMission {
                mission_type: MissionType::Evacuation,
                origin: "Depot".to_owned(),
                destination: Some("Shelter 3".to_owned()),
                description: "Evacuate riverside".to_owned(),
                cargo_details: None,
                vehicle_type: Some("BUS".to_owned()),
                incident_id: None,
                resource_id: None,
            })
            .await;

        let skip = service.update_status(m.id, MissionStatus::Completed).await;
        assert!(matches!(skip, Err(ServiceError::InvalidState(_))));

        let started = service.update_status(m.id, MissionStatus::InProgress).await.unwrap();
        assert!(started.started_at.is_some());
        service.assign_vehicle(m.id, "BUS-12", "A. Fernando").await.unwrap();

        let done = service.update_status(m.id, MissionStatus::Completed).await.unwrap();
        assert_eq!(done.started_at, started.started_at);
        assert!(done.completed_at.is_some());
        assert_eq!(done.driver_name.as_deref(), Some("A. Fernando"));

        let late = service.update_status(m.id, MissionStatus::Cancelled).await;
        assert!(matches!(late, Err(ServiceError::InvalidState(_))));
        assert!(matches!(
            service.assign_vehicle(m.id, "BUS-13", "B").await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(service.by_status(MissionStatus::Completed).await.len(), 1);
    }
}
