//! Personnel service: responder roster and task matching.
//!
//! Produces `personnel.status.changed` whenever a person is registered,
//! changes status or is removed. Consumes `task.assigned` and only records
//! receipt; assignment is owned by the task service and the roster is not
//! changed by it.

use std::sync::Arc;

use disa_bus::{Bus, EventPublisher, Reaction, ReactionError};
use disa_events::{Event, PersonnelStatusChanged, Service, TaskAssigned, required};
use disa_types::{Person, PersonnelId, Skill, Task, TaskStatus};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::matcher::{MatchResult, TaskMatcher};
use crate::store::Store;

/// Fields supplied when registering a person.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPerson {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Role.
    #[serde(default)]
    pub role: Option<String>,
    /// Department.
    #[serde(default)]
    pub department: Option<String>,
    /// Rank.
    #[serde(default)]
    pub rank: Option<String>,
    /// Organization.
    #[serde(default)]
    pub organization: Option<String>,
    /// Skills.
    #[serde(default)]
    pub skills: Vec<Skill>,
    /// Availability status, `Available` if absent.
    #[serde(default)]
    pub status: Option<String>,
    /// Medical condition flag.
    #[serde(default)]
    pub has_medical_condition: bool,
    /// Shift start.
    #[serde(default)]
    pub shift_start: Option<chrono::DateTime<chrono::Utc>>,
    /// Shift end.
    #[serde(default)]
    pub shift_end: Option<chrono::DateTime<chrono::Utc>>,
}

/// Owns the roster, announces its changes and picks people for tasks.
#[derive(Debug, Clone)]
pub struct PersonnelService {
    store: Store<Person>,
    publisher: EventPublisher,
    matcher: Arc<TaskMatcher>,
}

impl PersonnelService {
    /// A service publishing inline on `bus` and matching first-available.
    pub fn new(bus: Bus) -> Self {
        Self::with_publisher(
            EventPublisher::best_effort(bus, Service::Personnel),
            TaskMatcher::FirstAvailable,
        )
    }

    /// A service using a prepared publisher and `matcher` for task assignment.
    pub fn with_publisher(publisher: EventPublisher, matcher: TaskMatcher) -> Self {
        Self {
            store: Store::new(),
            publisher,
            matcher: Arc::new(matcher),
        }
    }

    /// Register a person.
    pub async fn create_person(&self, input: NewPerson) -> Person {
        let person = self
            .store
            .insert_with(|id| Person {
                id: PersonnelId::new(id),
                first_name: input.first_name,
                last_name: input.last_name,
                role: input.role,
                department: input.department,
                rank: input.rank,
                organization: input.organization,
                skills: input.skills,
                status: input.status.unwrap_or_else(|| "Available".to_owned()),
                has_medical_condition: input.has_medical_condition,
                shift_start: input.shift_start,
                shift_end: input.shift_end,
                enabled: true,
            })
            .await;
        info!(personnel_code = person.id.code(), status = person.status, "person registered");
        self.announce(&person, "created").await;
        person
    }

    /// Look up one person.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if they are not registered.
    pub async fn get(&self, id: PersonnelId) -> Result<Person, ServiceError> {
        self.store
            .get(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("person", id.code()))
    }

    /// The whole roster.
    pub async fn list(&self) -> Vec<Person> {
        self.store.list().await
    }

    /// Enabled people whose status mentions "available".
    pub async fn available(&self) -> Vec<Person> {
        self.store.filter(Person::is_available).await
    }

    /// Change a person's free-text status.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if they are not registered.
    pub async fn set_status(&self, id: PersonnelId, status: &str) -> Result<Person, ServiceError> {
        let person = self
            .store
            .update(id.into_inner(), |p| {
                status.clone_into(&mut p.status);
                p.clone()
            })
            .await
            .ok_or_else(|| ServiceError::not_found("person", id.code()))?;
        info!(personnel_code = person.id.code(), status = person.status, "person status changed");
        self.announce(&person, "updated").await;
        Ok(person)
    }

    /// Remove a person from the roster.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if they are not registered.
    pub async fn delete(&self, id: PersonnelId) -> Result<(), ServiceError> {
        let person = self
            .store
            .remove(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("person", id.code()))?;
        info!(personnel_code = person.id.code(), "person removed");
        self.announce(&person, "deleted").await;
        Ok(())
    }

    async fn announce(&self, person: &Person, change: &str) {
        let available = person.is_available();
        let status = if available { "AVAILABLE" } else { "UNAVAILABLE" };
        let skills: Vec<&str> = person.skills.iter().map(|s| s.skill_name.as_str()).collect();
        self.publisher
            .emit(PersonnelStatusChanged {
                personnel_id: Some(person.id),
                personnel_code: Some(person.id.code()),
                full_name: Some(person.full_name()),
                status: Some(status.to_owned()),
                role: Some(person.role.clone().unwrap_or_else(|| "UNKNOWN".to_owned())),
                skills: Some(skills.join(", ")),
                is_available: Some(available),
                notes: Some(format!("Personnel {change}")),
            })
            .await;
    }

    /// Pick the best available person for `task`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Matcher`] when nobody is available.
    pub async fn match_task(&self, task: &Task) -> Result<MatchResult, ServiceError> {
        let candidates = self.available().await;
        let result = self.matcher.select(task, &candidates).await?;
        info!(
            task_code = task.task_code,
            personnel_code = result.person_id.code(),
            score = result.match_score,
            fallback = result.fallback,
            matcher = self.matcher.name(),
            "task matched"
        );
        Ok(result)
    }

    /// Match every `PENDING` task in `tasks`. Tasks that cannot be matched
    /// are logged and skipped.
    pub async fn match_all(&self, tasks: &[Task]) -> Vec<(Task, MatchResult)> {
        let mut matched = Vec::new();
        for task in tasks.iter().filter(|t| t.status == TaskStatus::Pending) {
            match self.match_task(task).await {
                Ok(result) => matched.push((task.clone(), result)),
                Err(e) => warn!(task_code = task.task_code, error = %e, "task left unmatched"),
            }
        }
        matched
    }

    fn on_task_assigned(p: &TaskAssigned) -> Result<(), ReactionError> {
        let task_code = required(p.task_id.as_ref(), "taskId")?;
        let assignee = required(p.assigned_to.as_ref(), "assignedTo")?;
        let person = PersonnelId::from_code(assignee).ok_or_else(|| {
            ReactionError::Failed(format!("unreadable personnel code {assignee:?}"))
        })?;
        info!(
            task_code,
            personnel_id = %person,
            task_type = p.task_type.map(|t| t.as_str()).unwrap_or("-"),
            "task assignment received"
        );
        Ok(())
    }
}

impl Reaction for PersonnelService {
    fn name(&self) -> &'static str {
        "personnel"
    }

    async fn react(&self, event: Event) -> Result<(), ReactionError> {
        match event {
            Event::TaskAssigned(p) => Self::on_task_assigned(&p),
            other => Err(ReactionError::Unexpected(other.routing_key().to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use disa_bus::MemoryBus;
    use disa_events::{EventEnvelope, QueueBinding, RoutingKey};
    use disa_types::{Priority, TaskId, TaskType};

    use super::*;

    fn roster() -> PersonnelService {
        PersonnelService::new(Bus::in_memory())
    }

    fn responder(first: &str, status: &str) -> NewPerson {
        NewPerson {
            first_name: first.to_owned(),
            last_name: "Fernando".to_owned(),
            role: Some("Paramedic".to_owned()),
            department: None,
            rank: None,
            organization: None,
            skills: Vec::new(),
            status: Some(status.to_owned()),
            has_medical_condition: false,
            shift_start: None,
            shift_end: None,
        }
    }

    fn pending(id: u64, status: TaskStatus) -> Task {
        Task {
            id: TaskId::new(id),
            task_code: format!("TSK-{id:03}"),
            task_type: TaskType::MedicalAid,
            title: "medical triage".to_owned(),
            description: None,
            priority: Priority::Medium,
            incident_id: None,
            assigned_to: None,
            location: None,
            status,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn availability_is_a_substring_match() {
        let service = roster();
        service.create_person(responder("Ama", "Available")).await;
        service.create_person(responder("Ruwan", "On Leave")).await;
        service.create_person(responder("Dilan", "Unavailable")).await;
        let names: Vec<_> = service
            .available()
            .await
            .into_iter()
            .map(|p| p.first_name)
            .collect();
        assert_eq!(names, vec!["Ama".to_owned(), "Dilan".to_owned()]);
    }

    #[tokio::test]
    async fn matches_first_available_and_skips_non_pending() {
        let service = roster();
        let ama = service.create_person(responder("Ama", "Available")).await;

        let result = service.match_task(&pending(1, TaskStatus::Pending)).await.unwrap();
        assert_eq!(result.person_id, ama.id);
        assert!(result.fallback);

        let tasks = vec![
            pending(1, TaskStatus::Pending),
            pending(2, TaskStatus::InProgress),
            pending(3, TaskStatus::Pending),
        ];
        let matched = service.match_all(&tasks).await;
        let codes: Vec<_> = matched.iter().map(|(t, _)| t.task_code.as_str()).collect();
        assert_eq!(codes, vec!["TSK-001", "TSK-003"]);
    }

    #[tokio::test]
    async fn nobody_available_is_an_error() {
        let service = roster();
        let ama = service.create_person(responder("Ama", "Available")).await;
        service.set_status(ama.id, "Deployed").await.unwrap();
        let result = service.match_task(&pending(1, TaskStatus::Pending)).await;
        assert!(matches!(result, Err(ServiceError::Matcher(_))));
        assert!(service.match_all(&[pending(1, TaskStatus::Pending)]).await.is_empty());
    }

    #[tokio::test]
    async fn roster_changes_are_announced() {
        let memory = MemoryBus::new();
        memory
            .declare(&QueueBinding::durable("tap", RoutingKey::PersonnelStatusChanged.as_str()))
            .await;
        let service = PersonnelService::new(Bus::Memory(memory.clone()));
        let mut rx = memory.subscribe("tap").await.unwrap();

        let mut input = responder("Ama", "Available");
        input.skills = vec![
            Skill {
                skill_name: "First Aid".to_owned(),
                proficiency_level: "Expert".to_owned(),
            },
            Skill {
                skill_name: "Driving".to_owned(),
                proficiency_level: "Basic".to_owned(),
            },
        ];
        let ama = service.create_person(input).await;
        service.set_status(ama.id, "On Leave").await.unwrap();
        service.delete(ama.id).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(delivery) = rx.try_recv() {
            let envelope = EventEnvelope::decode(&delivery.body, None).unwrap();
            let Event::PersonnelStatusChanged(payload) = envelope.event else {
                panic!("expected personnel.status.changed");
            };
            seen.push(payload);
        }
        assert_eq!(seen.len(), 3);

        let created = seen.first().unwrap();
        assert_eq!(created.personnel_id, Some(ama.id));
        assert_eq!(created.personnel_code.as_deref(), Some(ama.id.code().as_str()));
        assert_eq!(created.full_name.as_deref(), Some("Ama Fernando"));
        assert_eq!(created.status.as_deref(), Some("AVAILABLE"));
        assert_eq!(created.role.as_deref(), Some("Paramedic"));
        assert_eq!(created.skills.as_deref(), Some("First Aid, Driving"));
        assert_eq!(created.is_available, Some(true));
        assert_eq!(created.notes.as_deref(), Some("Personnel created"));

        let updated = seen.get(1).unwrap();
        assert_eq!(updated.status.as_deref(), Some("UNAVAILABLE"));
        assert_eq!(updated.is_available, Some(false));
        assert_eq!(updated.notes.as_deref(), Some("Personnel updated"));

        assert_eq!(seen.get(2).unwrap().notes.as_deref(), Some("Personnel deleted"));
        assert!(matches!(service.get(ama.id).await, Err(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unknown_person_changes_emit_nothing() {
        let memory = MemoryBus::new();
        memory
            .declare(&QueueBinding::durable("tap", RoutingKey::PersonnelStatusChanged.as_str()))
            .await;
        let service = PersonnelService::new(Bus::Memory(memory.clone()));
        let ghost = PersonnelId::new(42);
        assert!(service.set_status(ghost, "Available").await.is_err());
        assert!(service.delete(ghost).await.is_err());
        let mut rx = memory.subscribe("tap").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn assignment_event_changes_nothing() {
        let service = roster();
        let ama = service.create_person(responder("Ama", "Available")).await;
        let event = Event::TaskAssigned(TaskAssigned {
            task_id: Some("TSK-004".to_owned()),
            assigned_to: Some(ama.id.code()),
            ..TaskAssigned::default()
        });
        service.react(event).await.unwrap();
        assert_eq!(service.get(ama.id).await.unwrap(), ama);

        let missing = service.react(Event::TaskAssigned(TaskAssigned::default())).await;
        assert!(matches!(missing, Err(ReactionError::MissingField("taskId"))));
    }
}
