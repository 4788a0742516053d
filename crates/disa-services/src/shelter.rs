//! Shelter service: capacity tracking and staged activation.
//!
//! Consumes `incident.created`. Every shelter with coordinates inside the
//! activation radius moves one step along `CLOSED -> UNDER_PREPARATION ->
//! OPERATIONAL`; shelters already `OPERATIONAL` or `FULL` are left alone.
//! Occupancy drives `OPERATIONAL <-> FULL`.

use chrono::Utc;
use disa_bus::{Reaction, ReactionError};
use disa_events::{Event, IncidentCreated, required};
use disa_types::{Shelter, ShelterId, ShelterStatus};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::store::Store;

/// Kilometres per degree in the flat-grid approximation.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Mean Earth radius used by [`ProximityMetric::Haversine`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// How distance between an incident and a shelter is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityMetric {
    /// `sqrt(dlat^2 + dlon^2) * 111`. Overstates east-west distance away
    /// from the equator.
    #[default]
    EuclideanDegrees,
    /// Great-circle distance.
    Haversine,
}

impl ProximityMetric {
    /// Distance in kilometres between two points in decimal degrees.
    pub fn distance_km(self, from: (f64, f64), to: (f64, f64)) -> f64 {
        let (lat1, lon1) = from;
        let (lat2, lon2) = to;
        match self {
            Self::EuclideanDegrees => (lat2 - lat1).hypot(lon2 - lon1) * KM_PER_DEGREE,
            Self::Haversine => {
                let dlat = (lat2 - lat1).to_radians();
                let dlon = (lon2 - lon1).to_radians();
                let a = (lat1.to_radians().cos() * lat2.to_radians().cos())
                    .mul_add((dlon / 2.0).sin().powi(2), (dlat / 2.0).sin().powi(2));
                2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
            }
        }
    }
}

/// Activation settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShelterSettings {
    /// Shelters at or within this distance of an incident are activated.
    pub radius_km: f64,
    /// Distance measure.
    pub metric: ProximityMetric,
}

impl Default for ShelterSettings {
    fn default() -> Self {
        Self {
            radius_km: 50.0,
            metric: ProximityMetric::default(),
        }
    }
}

/// Fields supplied when registering a shelter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShelter {
    /// Display name.
    pub name: String,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Latitude.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Maximum occupancy.
    pub total_capacity: u32,
    /// Initial occupancy, zero if absent.
    #[serde(default)]
    pub current_occupancy: Option<u32>,
    /// Initial status, `OPERATIONAL` if absent.
    #[serde(default)]
    pub status: Option<ShelterStatus>,
    /// Contact person.
    #[serde(default)]
    pub contact_person: Option<String>,
    /// Contact phone number.
    #[serde(default)]
    pub contact_number: Option<String>,
    /// Available facilities.
    #[serde(default)]
    pub facilities: Option<String>,
}

/// Owns shelters and activates them near new incidents.
#[derive(Debug, Clone, Default)]
pub struct ShelterService {
    store: Store<Shelter>,
    settings: ShelterSettings,
}

impl ShelterService {
    /// A service with default activation settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// A service with explicit settings.
    pub fn with_settings(settings: ShelterSettings) -> Self {
        Self {
            store: Store::new(),
            settings,
        }
    }

    /// Register a shelter.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Invalid`] if occupancy exceeds capacity.
    pub async fn create(&self, input: NewShelter) -> Result<Shelter, ServiceError> {
        let occupancy = input.current_occupancy.unwrap_or(0);
        if occupancy > input.total_capacity {
            return Err(ServiceError::Invalid(format!(
                "occupancy {occupancy} exceeds capacity {}",
                input.total_capacity
            )));
        }
        let now = Utc::now();
        let shelter = self
            .store
            .insert_with(|id| Shelter {
                id: ShelterId::new(id),
                shelter_code: format!("SHE-{id:03}"),
                name: input.name,
                address: input.address,
                latitude: input.latitude,
                longitude: input.longitude,
                total_capacity: input.total_capacity,
                current_occupancy: occupancy,
                status: input.status.unwrap_or(ShelterStatus::Operational),
                contact_person: input.contact_person,
                contact_number: input.contact_number,
                facilities: input.facilities,
                created_at: now,
                updated_at: now,
            })
            .await;
        info!(shelter_code = shelter.shelter_code, status = %shelter.status, "shelter registered");
        Ok(shelter)
    }

    /// Look up one shelter.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn get(&self, id: ShelterId) -> Result<Shelter, ServiceError> {
        self.store
            .get(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("shelter", id))
    }

    /// Every shelter.
    pub async fn list(&self) -> Vec<Shelter> {
        self.store.list().await
    }

    /// Shelters that are `OPERATIONAL` or `UNDER_PREPARATION`.
    pub async fn available(&self) -> Vec<Shelter> {
        self.store.filter(|s| s.status.is_available()).await
    }

    /// Shelters within `radius_km` of a point, nearest first, with their
    /// distance under the configured metric.
    pub async fn nearby(&self, latitude: f64, longitude: f64, radius_km: f64) -> Vec<(Shelter, f64)> {
        let metric = self.settings.metric;
        let mut found: Vec<(Shelter, f64)> = self
            .store
            .list()
            .await
            .into_iter()
            .filter_map(|s| {
                let distance = metric.distance_km((latitude, longitude), coordinates(&s)?);
                (distance <= radius_km).then_some((s, distance))
            })
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found
    }

    /// Admit `people` evacuees. The shelter turns `FULL` when it reaches
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], [`ServiceError::InvalidState`]
    /// for a closed shelter, or [`ServiceError::Insufficient`] when there
    /// is not enough room. Nothing changes on error.
    pub async fn check_in(&self, id: ShelterId, people: u32) -> Result<Shelter, ServiceError> {
        let shelter = self
            .store
            .update(id.into_inner(), |s| {
                if s.status == ShelterStatus::Closed {
                    return Err(ServiceError::InvalidState(format!(
                        "shelter {} is closed",
                        s.shelter_code
                    )));
                }
                let room = s.available_capacity();
                if people > room {
                    return Err(ServiceError::Insufficient {
                        what: "capacity",
                        requested: people,
                        available: room,
                    });
                }
                s.current_occupancy = s.current_occupancy.saturating_add(people);
                if s.is_full() {
                    s.status = ShelterStatus::Full;
                }
                s.updated_at = Utc::now();
                Ok(s.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("shelter", id))??;
        info!(
            shelter_code = shelter.shelter_code,
            people,
            occupancy = shelter.current_occupancy,
            "evacuees checked in"
        );
        Ok(shelter)
    }

    /// Release `people` evacuees. A `FULL` shelter with room again returns
    /// to `OPERATIONAL`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Invalid`] when
    /// more people leave than are checked in.
    pub async fn check_out(&self, id: ShelterId, people: u32) -> Result<Shelter, ServiceError> {
        let shelter = self
            .store
            .update(id.into_inner(), |s| {
                s.current_occupancy = s.current_occupancy.checked_sub(people).ok_or_else(|| {
                    ServiceError::Invalid(format!(
                        "cannot check out {people}, occupancy is {}",
                        s.current_occupancy
                    ))
                })?;
                if s.status == ShelterStatus::Full && !s.is_full() {
                    s.status = ShelterStatus::Operational;
                }
                s.updated_at = Utc::now();
                Ok(s.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("shelter", id))??;
        info!(
            shelter_code = shelter.shelter_code,
            people,
            occupancy = shelter.current_occupancy,
            "evacuees checked out"
        );
        Ok(shelter)
    }

    /// Set the status directly.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn update_status(
        &self,
        id: ShelterId,
        status: ShelterStatus,
    ) -> Result<Shelter, ServiceError> {
        self.store
            .update(id.into_inner(), |s| {
                s.status = status;
                s.updated_at = Utc::now();
                s.clone()
            })
            .await
            .ok_or_else(|| ServiceError::not_found("shelter", id))
    }

    /// Delete a shelter.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn delete(&self, id: ShelterId) -> Result<(), ServiceError> {
        self.store
            .remove(id.into_inner())
            .await
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("shelter", id))
    }

    /// Advance every shelter near `(latitude, longitude)` one activation
    /// step. Returns the shelters that changed.
    pub async fn activate_near(&self, latitude: f64, longitude: f64) -> Vec<Shelter> {
        let ShelterSettings { radius_km, metric } = self.settings;
        self.store
            .update_all(|s| {
                let here = coordinates(s)?;
                let distance = metric.distance_km((latitude, longitude), here);
                if distance > radius_km {
                    return None;
                }
                let next = s.status.activated()?;
                debug!(
                    shelter_code = s.shelter_code,
                    from = %s.status,
                    to = %next,
                    distance_km = distance,
                    "shelter activation step"
                );
                s.status = next;
                s.updated_at = Utc::now();
                Some(s.clone())
            })
            .await
    }

    async fn on_incident_created(&self, p: &IncidentCreated) -> Result<(), ReactionError> {
        let latitude = *required(p.latitude.as_ref(), "latitude")?;
        let longitude = *required(p.longitude.as_ref(), "longitude")?;
        let changed = self.activate_near(latitude, longitude).await;
        info!(
            incident_code = p.incident_code.as_deref().unwrap_or("-"),
            activated = changed.len(),
            "shelters prepared for incident"
        );
        Ok(())
    }
}

const fn coordinates(shelter: &Shelter) -> Option<(f64, f64)> {
    match (shelter.latitude, shelter.longitude) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    }
}

impl Reaction for ShelterService {
    fn name(&self) -> &'static str {
        "shelter"
    }

    async fn react(&self, event: Event) -> Result<(), ReactionError> {
        match event {
            Event::IncidentCreated(p) => self.on_incident_created(&p).await,
            other => Err(ReactionError::Unexpected(other.routing_key().to_string())),
        }
    }
}
