//! Task service: field work items and their assignment.
//!
//! Produces `task.assigned` when a task moves to `IN_PROGRESS` through
//! assignment, and consumes `assessment.completed` to generate one task per
//! required action.
//!
//! ```text
//! PENDING --assign--> IN_PROGRESS --complete--> COMPLETED
//! ```

use chrono::Utc;
use disa_bus::{Bus, EventPublisher, Reaction, ReactionError};
use disa_events::{AssessmentCompleted, Event, Service, TaskAssigned};
use disa_types::{IncidentId, PersonnelId, Priority, Task, TaskId, TaskStatus, TaskType};
use serde::Deserialize;
use tracing::info;

use crate::error::ServiceError;
use crate::store::Store;

/// Description given to every generated task.
pub const GENERATED_DESCRIPTION: &str = "Auto-generated from assessment";

/// Task-generation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Match the `rescue`/`medical` keywords ignoring case. Off by default,
    /// so `Rescue survivors` falls through to `DEBRIS_REMOVAL`.
    pub case_insensitive_keywords: bool,
}

/// Pick a task type from the action text: `rescue` wins over `medical`,
/// anything else is debris removal.
pub fn infer_task_type(action: &str, case_insensitive: bool) -> TaskType {
    let text = if case_insensitive {
        action.to_lowercase()
    } else {
        action.to_owned()
    };
    if text.contains("rescue") {
        TaskType::RescueOperation
    } else if text.contains("medical") {
        TaskType::MedicalAid
    } else {
        TaskType::DebrisRemoval
    }
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Kind of task.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Short title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Urgency.
    pub priority: Priority,
    /// Related incident.
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
    /// Where the work happens.
    #[serde(default)]
    pub location: Option<String>,
}

/// Editable task fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskUpdate {
    /// New kind.
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New incident link.
    pub incident_id: Option<IncidentId>,
    /// New location.
    pub location: Option<String>,
}

/// Owns tasks, announces assignments, and turns assessments into work.
#[derive(Debug, Clone)]
pub struct TaskService {
    store: Store<Task>,
    publisher: EventPublisher,
    settings: TaskSettings,
}

impl TaskService {
    /// A service publishing inline on `bus` with default settings.
    pub fn new(bus: Bus) -> Self {
        Self::with_publisher(
            EventPublisher::best_effort(bus, Service::Task),
            TaskSettings::default(),
        )
    }

    /// A service using a prepared publisher.
    pub fn with_publisher(publisher: EventPublisher, settings: TaskSettings) -> Self {
        Self {
            store: Store::new(),
            publisher,
            settings,
        }
    }

    /// Create a `PENDING` task. Emits nothing.
    pub async fn create(&self, input: NewTask) -> Task {
        let task = self
            .store
            .insert_with(|id| Task {
                id: TaskId::new(id),
                task_code: format!("TSK-{id:03}"),
                task_type: input.task_type,
                title: input.title,
                description: input.description,
                priority: input.priority,
                incident_id: input.incident_id,
                assigned_to: None,
                location: input.location,
                status: TaskStatus::Pending,
                created_at: Utc::now(),
                completed_at: None,
            })
            .await;
        info!(task_code = task.task_code, task_type = %task.task_type, "task created");
        task
    }

    /// Look up one task.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn get(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.store
            .get(id.into_inner())
            .await
            .ok_or_else(|| ServiceError::not_found("task", id))
    }

    /// Every task.
    pub async fn list(&self) -> Vec<Task> {
        self.store.list().await
    }

    /// Tasks with `status`.
    pub async fn by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.store.filter(|t| t.status == status).await
    }

    /// Tasks linked to one incident.
    pub async fn by_incident(&self, incident_id: IncidentId) -> Vec<Task> {
        self.store.filter(|t| t.incident_id == Some(incident_id)).await
    }

    /// Edit descriptive fields.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Conflict`] for
    /// a completed task.
    pub async fn update(&self, id: TaskId, changes: TaskUpdate) -> Result<Task, ServiceError> {
        self.store
            .update(id.into_inner(), |t| {
                if t.status == TaskStatus::Completed {
                    return Err(ServiceError::Conflict(format!(
                        "task {} is already completed",
                        t.task_code
                    )));
                }
                if let Some(kind) = changes.task_type {
                    t.task_type = kind;
                }
                if let Some(title) = changes.title {
                    t.title = title;
                }
                if changes.description.is_some() {
                    t.description = changes.description;
                }
                if let Some(p) = changes.priority {
                    t.priority = p;
                }
                if changes.incident_id.is_some() {
                    t.incident_id = changes.incident_id;
                }
                if changes.location.is_some() {
                    t.location = changes.location;
                }
                Ok(t.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("task", id))?
    }

    /// Assign the task to `person`, move it to `IN_PROGRESS`, and emit
    /// `task.assigned`. Reassigning an in-progress task announces the new
    /// assignee.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], or [`ServiceError::Conflict`] for
    /// a completed task. No event is emitted on error.
    pub async fn assign(&self, id: TaskId, person: PersonnelId) -> Result<Task, ServiceError> {
        let task = self
            .store
            .update(id.into_inner(), |t| {
                if t.status == TaskStatus::Completed {
                    return Err(ServiceError::Conflict(format!(
                        "task {} is already completed",
                        t.task_code
                    )));
                }
                t.assigned_to = Some(person);
                t.status = TaskStatus::InProgress;
                Ok(t.clone())
            })
            .await
            .ok_or_else(|| ServiceError::not_found("task", id))??;

        info!(task_code = task.task_code, assigned_to = %person.code(), "task assigned");
        self.publisher
            .emit(TaskAssigned {
                task_id: Some(task.task_code.clone()),
                assigned_to: Some(person.code()),
                task_type: Some(task.task_type),
                priority: Some(task.priority),
                location: task.location.clone(),
            })
            .await;
        Ok(task)
    }

    /// Mark an assigned task done.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`], [`ServiceError::Conflict`] if it
    /// is already completed, or [`ServiceError::InvalidState`] if it was
    /// never assigned.
    pub async fn complete(&self, id: TaskId) -> Result<Task, ServiceError> {
        let task = self
            .store
            .update(id.into_inner(), |t| match t.status {
                TaskStatus::Completed => Err(ServiceError::Conflict(format!(
                    "task {} is already completed",
                    t.task_code
                ))),
                TaskStatus::Pending => Err(ServiceError::InvalidState(format!(
                    "task {} must be assigned before completion",
                    t.task_code
                ))),
                TaskStatus::InProgress => {
                    t.status = TaskStatus::Completed;
                    t.completed_at = Some(Utc::now());
                    Ok(t.clone())
                }
            })
            .await
            .ok_or_else(|| ServiceError::not_found("task", id))??;
        info!(task_code = task.task_code, "task completed");
        Ok(task)
    }

    /// Delete a task.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn delete(&self, id: TaskId) -> Result<(), ServiceError> {
        self.store
            .remove(id.into_inner())
            .await
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("task", id))
    }

    /// Create one `HIGH` priority task per required action, in order.
    pub async fn create_from_assessment(&self, payload: &AssessmentCompleted) -> Vec<Task> {
        let actions = payload.required_actions.as_deref().unwrap_or_default();
        let mut created = Vec::with_capacity(actions.len());
        for action in actions {
            let task = self
                .create(NewTask {
                    task_type: infer_task_type(action, self.settings.case_insensitive_keywords),
                    title: action.clone(),
                    description: Some(GENERATED_DESCRIPTION.to_owned()),
                    priority: Priority::High,
                    incident_id: payload.incident_id,
                    location: payload.location.clone(),
                })
                .await;
            created.push(task);
        }
        created
    }
}

impl Reaction for TaskService {
    fn name(&self) -> &'static str {
        "task"
    }

    async fn react(&self, event: Event) -> Result<(), ReactionError> {
        let payload = match event {
            Event::AssessmentCompleted(payload) => payload,
            other => return Err(ReactionError::Unexpected(other.routing_key().to_string())),
        };
        disa_events::required(payload.required_actions.as_ref(), "requiredActions")?;
        let created = self.create_from_assessment(&payload).await;
        info!(
            assessment_code = payload.assessment_code.as_deref().unwrap_or("-"),
            tasks = created.len(),
            "tasks generated from assessment"
        );
        Ok(())
    }
}
