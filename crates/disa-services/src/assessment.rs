//! Assessment service: damage assessments and their one-time completion.
//!
//! Completing an assessment emits `assessment.completed` exactly once. The
//! `DRAFT -> COMPLETED` check and the status write happen under one store
//! lock, so two racing completions cannot both succeed.

use chrono::Utc;
use disa_bus::{Bus, EventPublisher};
use disa_events::{AssessmentCompleted, Service};
use disa_types::{Assessment, AssessmentId, AssessmentStatus, DamageSeverity, IncidentId, PersonnelId};
use serde::Deserialize;
use tracing::info;

use crate::error::ServiceError;
use crate::store::Store;

/// Fields supplied when opening an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssessment {
    /// Incident being assessed.
    pub incident_id: IncidentId,
    /// Assessor's personnel id.
    #[serde(default)]
    pub assessor_id: Option<PersonnelId>,
    /// Assessor's display name.
    #[serde(default)]
    pub assessor_name: Option<String>,
    /// Damage severity.
    pub severity: DamageSeverity,
    /// Observations.
    #[serde(default)]
    pub findings: Option<String>,
    /// Recommendations.
    #[serde(default)]
    pub recommendations: Option<String>,
    /// Actions to turn into tasks on completion.
    #[serde(default)]
    pub required_actions: Vec<String>,
    /// Where the assessment took place.
    #[serde(default)]
    pub location: Option<String>,
    /// Estimated casualties.
    #[serde(default)]
    pub estimated_casualties: Option<u32>,
    /// Estimated displaced people.
    #[serde(default)]
    pub estimated_displaced: Option<u32>,
}

/// Editable assessment fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentUpdate {
    /// New assessor name.
    pub assessor_name: Option<String>,
    /// New severity.
    pub severity: Option<DamageSeverity>,
    /// New findings.
    pub findings: Option<String>,
    /// New recommendations.
    pub recommendations: Option<String>,
    /// Replacement action list.
    pub required_actions: Option<Vec<String>>,
    /// New location.
    pub location: Option<String>,
    /// New casualty estimate.
    pub estimated_casualties: Option<u32>,
    /// New displaced estimate.
    pub estimated_displaced: Option<u32>,
}

/// Owns assessments and announces their completion.
#[derive(Debug, Clone)]
pub struct AssessmentService {
    store: Store<Assessment>,
    publisher: EventPublisher,
}

impl AssessmentService {
    /// A service publishing inline on `bus`.
    pub fn new(bus: Bus) -> Self {
        Self::with_publisher(EventPublisher::best_effort(bus, Service::Assessment))
    }

    /// A service using a prepared publisher.
    pub fn with_publisher(publisher: EventPublisher) -> Self {
        Self {
            store: Store::new(),
            publisher,
        }
    }

    /// Open a `DRAFT` assessment. Emits nothing.
    pub async fn create(&self, input: NewAssessment) -> Assessment {
        let assessment = self
            .store
            .insert_with(|id| Assessment {
                id: AssessmentId::new(id),
                assessment_code: format!("ASS-{id:05}"),
                incident_id: input.incident_id,
                assessor_id: input.assessor_id,
                assessor_name: input.assessor_name,
                severity: input.severity,
                findings: input.findings,
                recommendations: input.recommendations,
                required_actions: input.required_actions,
                location: input.location,
                estimated_casualties: input.estimated_casualties,
                estimated_displaced: input.estimated_displaced,
                status: AssessmentStatus::Draft,
                created_at: Utc::now(),
                completed_at: None,
            })
            .await;
        info!(
            assessment_code = assessment.assessment_code,
            incident_id = %assessment.incident_id,
            "assessment created"
        );
        assessment
    }

    /// Look up one assessment.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn get(&self, id: AssessmentId) -> Result<Assessment, ServiceError> {
        self.store
            .get(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("assessment", id))
    }

    /// Every assessment.
    pub async fn list(&self) -> Vec<Assessment> {
        self.store.list().await
    }

    /// Assessments of one incident.
    pub async fn by_incident(&self, incident_id: IncidentId) -> Vec<Assessment> {
        self.store.filter(|a| a.incident_id == incident_id).await
    }

    /// Assessments written by one assessor.
    pub async fn by_assessor(&self, assessor_id: PersonnelId) -> Vec<Assessment> {
        self.store.filter(|a| a.assessor_id == Some(assessor_id)).await
    }

    /// Completed assessments.
    pub async fn completed(&self) -> Vec<Assessment> {
        self.store
            .filter(|a| a.status == AssessmentStatus::Completed)
            .await
    }

    /// Edit a draft.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Conflict`]
    /// once the assessment is completed.
    pub async fn update(
        &self,
        id: AssessmentId,
        changes: AssessmentUpdate,
    ) -> Result<Assessment, ServiceError> {
        self.store
            .update(id.into_inner(), |a| {
                if a.status == AssessmentStatus::Completed {
                    return Err(ServiceError::Conflict(format!(
                        "assessment {} is completed and can no longer change",
                        a.assessment_code
                    )));
                }
                if changes.assessor_name.is_some() {
                    a.assessor_name = changes.assessor_name;
                }
                if let Some(s) = changes.severity {
                    a.severity = s;
                }
                if changes.findings.is_some() {
                    a.findings = changes.findings;
                }
                if changes.recommendations.is_some() {
                    a.recommendations = changes.recommendations;
                }
                if let Some(actions) = changes.required_actions {
                    a.required_actions = actions;
                }
                if changes.location.is_some() {
                    a.location = changes.location;
                }
                if changes.estimated_casualties.is_some() {
                    a.estimated_casualties = changes.estimated_casualties;
                }
                if changes.estimated_displaced.is_some() {
                    a.estimated_displaced = changes.estimated_displaced;
                }
                Ok(a.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("assessment", id))?
    }

    /// Complete the assessment and emit `assessment.completed`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Conflict`] if
    /// it is already completed. No event is emitted on error.
    pub async fn complete(&self, id: AssessmentId) -> Result<Assessment, ServiceError> {
        let assessment = self
            .store
            .update(id.into_inner(), |a| {
                if a.status == AssessmentStatus::Completed {
                    return Err(ServiceError::Conflict(format!(
                        "assessment {} already completed",
                        a.assessment_code
                    )));
                }
                a.status = AssessmentStatus::Completed;
                a.completed_at = Some(Utc::now());
                Ok(a.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("assessment", id))??;

        info!(
            assessment_code = assessment.assessment_code,
            actions = assessment.required_actions.len(),
            "assessment completed"
        );
        self.publisher
            .emit(AssessmentCompleted {
                assessment_id: Some(assessment.id),
                assessment_code: Some(assessment.assessment_code.clone()),
                incident_id: Some(assessment.incident_id),
                assessor_id: assessment.assessor_id,
                severity: Some(assessment.severity),
                findings: assessment.findings.clone(),
                required_actions: Some(assessment.required_actions.clone()),
                location: assessment.location.clone(),
            })
            .await;
        Ok(assessment)
    }

    /// Delete an assessment.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn delete(&self, id: AssessmentId) -> Result<(), ServiceError> {
        self.store
            .remove(id.into_inner())
            .await
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("assessment", id))
    }
}
