//! Platform wiring: one bus, seven services, one listener per queue.
//!
//! [`Platform::start`] declares the queues of every hosted consumer before
//! any producer can publish, builds the services around shared publishers,
//! and spawns a [`Listener`] per queue. [`Platform::shutdown`] stops the
//! listeners and the outbox relay and waits for in-flight messages.

use std::sync::Arc;

use disa_bus::{
    Bus, BusError, EventPublisher, FailurePolicy, Listener, ListenerConfig, ListenerStats, Outbox,
    OutboxRelay, PublishMode, Reaction, RetryPolicy, Shutdown,
};
use disa_events::Service;
use disa_types::{Task, TaskId};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::assessment::AssessmentService;
use crate::error::{PlatformError, ServiceError};
use crate::incident::IncidentService;
use crate::matcher::{MatcherConfig, TaskMatcher};
use crate::mission::MissionService;
use crate::personnel::PersonnelService;
use crate::resource::ResourceService;
use crate::shelter::{ShelterService, ShelterSettings};
use crate::task::{TaskService, TaskSettings};

/// Everything needed to start a platform.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Services whose queues this node consumes. Producers are always
    /// available as library calls.
    pub services: Vec<Service>,
    /// Settings shared by every listener.
    pub listener: ListenerConfig,
    /// How producers hand events to the bus.
    pub publish_mode: PublishMode,
    /// Outbox relay backoff.
    pub retry: RetryPolicy,
    /// Shelter activation.
    pub shelter: ShelterSettings,
    /// Task generation.
    pub task: TaskSettings,
    /// Task-to-person matching.
    pub matcher: MatcherConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            services: Service::ALL.to_vec(),
            listener: ListenerConfig::default(),
            publish_mode: PublishMode::default(),
            retry: RetryPolicy::default(),
            shelter: ShelterSettings::default(),
            task: TaskSettings::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

struct RunningListener {
    queue: String,
    stats: Arc<ListenerStats>,
    handle: JoinHandle<Result<(), BusError>>,
}

/// A running node: services plus their listeners.
pub struct Platform {
    bus: Bus,
    incidents: IncidentService,
    assessments: AssessmentService,
    resources: ResourceService,
    tasks: TaskService,
    missions: MissionService,
    shelters: ShelterService,
    personnel: PersonnelService,
    outbox: Option<Outbox>,
    relay: Option<JoinHandle<()>>,
    listeners: Vec<RunningListener>,
    shutdown: Shutdown,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("bus", &self.bus.name())
            .field("listeners", &self.listeners.len())
            .field("outbox", &self.outbox.is_some())
            .finish_non_exhaustive()
    }
}

impl Platform {
    /// Start a platform on a fresh in-memory bus with default settings.
    ///
    /// # Errors
    ///
    /// See [`Platform::start`].
    pub async fn in_memory() -> Result<Self, PlatformError> {
        Self::start(Bus::in_memory(), PlatformConfig::default()).await
    }

    /// Declare queues, build services and spawn listeners.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Bus`] if a queue cannot be declared, or
    /// [`PlatformError::Service`] if the matcher cannot be built.
    pub async fn start(bus: Bus, config: PlatformConfig) -> Result<Self, PlatformError> {
        let shutdown = Shutdown::new();
        let dead_letter = config.listener.failure_policy == FailurePolicy::DeadLetter;

        let mut hosted = config.services.clone();
        hosted.sort();
        hosted.dedup();

        let mut bindings = Vec::new();
        for service in &hosted {
            for binding in bus.declare_service(*service, dead_letter).await? {
                bindings.push((*service, binding));
            }
        }

        let outbox = (config.publish_mode == PublishMode::Outbox).then(Outbox::new);
        let relay = outbox
            .clone()
            .map(|o| OutboxRelay::new(o, bus.clone(), config.retry).spawn(shutdown.subscribe()));
        let publisher = |service| match &outbox {
            Some(o) => EventPublisher::with_outbox(bus.clone(), service, o.clone()),
            None => EventPublisher::best_effort(bus.clone(), service),
        };

        let incidents = IncidentService::with_publisher(publisher(Service::Incident));
        let assessments = AssessmentService::with_publisher(publisher(Service::Assessment));
        let resources = ResourceService::with_publisher(publisher(Service::Resource));
        let tasks = TaskService::with_publisher(publisher(Service::Task), config.task);
        let personnel = PersonnelService::with_publisher(
            publisher(Service::Personnel),
            TaskMatcher::from_config(&config.matcher)?,
        );

        let mut platform = Self {
            bus: bus.clone(),
            incidents,
            assessments,
            resources,
            tasks,
            missions: MissionService::new(),
            shelters: ShelterService::with_settings(config.shelter),
            personnel,
            outbox,
            relay,
            listeners: Vec::new(),
            shutdown,
        };

        let missions = Arc::new(platform.missions.clone());
        let tasks = Arc::new(platform.tasks.clone());
        let shelters = Arc::new(platform.shelters.clone());
        let personnel = Arc::new(platform.personnel.clone());
        for (service, binding) in bindings {
            let queue = binding.queue;
            match service {
                Service::Mission => platform.listen(queue, Arc::clone(&missions), config.listener),
                Service::Task => platform.listen(queue, Arc::clone(&tasks), config.listener),
                Service::Shelter => platform.listen(queue, Arc::clone(&shelters), config.listener),
                Service::Personnel => platform.listen(queue, Arc::clone(&personnel), config.listener),
                Service::Incident | Service::Assessment | Service::Resource => {}
            }
        }

        info!(
            backend = bus.name(),
            services = ?hosted,
            listeners = platform.listeners.len(),
            publish_mode = ?config.publish_mode,
            "platform started"
        );
        Ok(platform)
    }

    fn listen<R: Reaction>(&mut self, queue: String, reaction: Arc<R>, config: ListenerConfig) {
        let listener = Listener::new(queue.clone(), self.bus.clone(), reaction, config);
        let stats = listener.stats();
        let handle = listener.spawn(self.shutdown.subscribe());
        self.listeners.push(RunningListener {
            queue,
            stats,
            handle,
        });
    }

    /// The shared bus.
    pub const fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Incident producer.
    pub const fn incidents(&self) -> &IncidentService {
        &self.incidents
    }

    /// Assessment producer.
    pub const fn assessments(&self) -> &AssessmentService {
        &self.assessments
    }

    /// Resource producer.
    pub const fn resources(&self) -> &ResourceService {
        &self.resources
    }

    /// Task producer and consumer.
    pub const fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    /// Mission consumer.
    pub const fn missions(&self) -> &MissionService {
        &self.missions
    }

    /// Shelter consumer.
    pub const fn shelters(&self) -> &ShelterService {
        &self.shelters
    }

    /// Personnel producer and consumer.
    pub const fn personnel(&self) -> &PersonnelService {
        &self.personnel
    }

    /// Counters per running listener, keyed by queue name.
    pub fn listener_stats(&self) -> Vec<(&str, Arc<ListenerStats>)> {
        self.listeners
            .iter()
            .map(|l| (l.queue.as_str(), Arc::clone(&l.stats)))
            .collect()
    }

    /// Envelopes staged but not yet published. Always zero in best-effort
    /// mode.
    pub async fn outbox_pending(&self) -> usize {
        match &self.outbox {
            Some(outbox) => outbox.len().await,
            None => 0,
        }
    }

    /// Match a pending task to the best available person and assign it,
    /// which emits `task.assigned`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown task,
    /// [`ServiceError::Matcher`] when nobody is available, or the
    /// assignment's own conflict.
    pub async fn auto_assign(&self, task_id: TaskId) -> Result<Task, ServiceError> {
        let task = self.tasks.get(task_id).await?;
        let selection = self.personnel.match_task(&task).await?;
        self.tasks.assign(task_id, selection.person_id).await
    }

    /// Stop every listener and the relay, waiting for in-flight messages.
    pub async fn shutdown(self) {
        info!(listeners = self.listeners.len(), "platform shutting down");
        self.shutdown.trigger();
        for listener in self.listeners {
            match listener.handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(queue = listener.queue, error = %e, "listener failed"),
                Err(e) => error!(queue = listener.queue, error = %e, "listener task panicked"),
            }
        }
        if let Some(relay) = self.relay
            && let Err(e) = relay.await
        {
            error!(error = %e, "outbox relay task panicked");
        }
        info!("platform stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use disa_bus::MemoryBus;
    use disa_events::contract::{
        MISSION_INCIDENT_CREATED_QUEUE, PERSONNEL_STATUS_QUEUE, PERSONNEL_TASK_ASSIGNED_QUEUE,
    };
    use disa_events::dead_letter_key;

    use super::*;

    #[tokio::test]
    async fn declares_queues_for_hosted_consumers_only() {
        let memory = MemoryBus::new();
        let config = PlatformConfig {
            services: vec![Service::Mission, Service::Incident, Service::Mission],
            listener: ListenerConfig {
                failure_policy: FailurePolicy::DeadLetter,
                ..ListenerConfig::default()
            },
            ..PlatformConfig::default()
        };
        let platform = Platform::start(Bus::Memory(memory.clone()), config).await.unwrap();

        let queues = memory.queue_names().await;
        assert!(queues.contains(&MISSION_INCIDENT_CREATED_QUEUE.to_owned()));
        assert!(queues.contains(&dead_letter_key(MISSION_INCIDENT_CREATED_QUEUE)));
        assert!(!queues.contains(&PERSONNEL_TASK_ASSIGNED_QUEUE.to_owned()));
        assert!(!queues.contains(&PERSONNEL_STATUS_QUEUE.to_owned()));
        assert_eq!(platform.listener_stats().len(), 3);

        platform.shutdown().await;
    }

    #[tokio::test]
    async fn personnel_status_queue_is_declared_without_a_listener() {
        let memory = MemoryBus::new();
        let config = PlatformConfig {
            services: vec![Service::Personnel],
            ..PlatformConfig::default()
        };
        let platform = Platform::start(Bus::Memory(memory.clone()), config).await.unwrap();

        let queues = memory.queue_names().await;
        assert!(queues.contains(&PERSONNEL_STATUS_QUEUE.to_owned()));
        let listening: Vec<&str> = platform.listener_stats().into_iter().map(|(q, _)| q).collect();
        assert_eq!(listening, vec![PERSONNEL_TASK_ASSIGNED_QUEUE]);

        platform.shutdown().await;
    }

    #[tokio::test]
    async fn outbox_mode_starts_a_relay() {
        let config = PlatformConfig {
            publish_mode: PublishMode::Outbox,
            ..PlatformConfig::default()
        };
        let platform = Platform::start(Bus::in_memory(), config).await.unwrap();
        assert!(platform.relay.is_some());
        assert_eq!(platform.outbox_pending().await, 0);
        assert_eq!(platform.listener_stats().len(), 6);
        platform.shutdown().await;
    }
}
