//! Node configuration loaded from `disa-config.yaml`.
//!
//! Every section is optional; a missing file or an empty document yields a
//! node that hosts all services on an in-memory bus. Environment variables
//! override the bus and matcher settings so deployments can switch backends
//! without editing the file.

use std::path::Path;

use disa_bus::{ListenerConfig, PublishMode, RetryPolicy};
use disa_events::Service;
use disa_services::{MatcherConfig, PlatformConfig, ShelterSettings, TaskSettings};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but makes no sense for a node.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Bus backend and connection.
    #[serde(default)]
    pub bus: BusConfig,

    /// Services whose queues this node consumes.
    #[serde(default = "default_services")]
    pub services: Vec<Service>,

    /// Listener concurrency and failure policy.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// How producers publish.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Shelter activation.
    #[serde(default)]
    pub shelter: ShelterSettings,

    /// Task generation.
    #[serde(default)]
    pub task: TaskSettings,

    /// Task-to-person matching.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            services: default_services(),
            listener: ListenerConfig::default(),
            publisher: PublisherConfig::default(),
            shelter: ShelterSettings::default(),
            task: TaskSettings::default(),
            matcher: MatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `NATS_URL` overrides `bus.nats_url`
    /// - `DISA_BUS_BACKEND` overrides `bus.backend`
    /// - `DISA_SERVICES` (comma separated) overrides `services`
    /// - `MATCHER_API_URL` overrides `matcher.api_url`
    /// - `MATCHER_API_KEY` overrides `matcher.api_key`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override cannot be parsed.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override values with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown backend or service.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("NATS_URL") {
            self.bus.nats_url = val;
        }
        if let Some(val) = lookup("DISA_BUS_BACKEND") {
            self.bus.backend = BusBackend::parse(&val)?;
        }
        if let Some(val) = lookup("DISA_SERVICES") {
            self.services = val
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<Service>().map_err(|message| ConfigError::Invalid { message }))
                .collect::<Result<_, _>>()?;
        }
        if let Some(val) = lookup("MATCHER_API_URL") {
            self.matcher.api_url = val;
        }
        if let Some(val) = lookup("MATCHER_API_KEY") {
            self.matcher.api_key = val;
        }
        Ok(())
    }

    /// The settings handed to the platform.
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            services: self.services.clone(),
            listener: self.listener,
            publish_mode: self.publisher.mode,
            retry: self.publisher.retry,
            shelter: self.shelter,
            task: self.task,
            matcher: self.matcher.clone(),
        }
    }
}

/// Which bus implementation a node connects to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusBackend {
    /// In-process bus. Events never leave this node.
    #[default]
    Memory,
    /// NATS `JetStream`.
    Nats,
}

impl BusBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "nats" => Ok(Self::Nats),
            other => Err(ConfigError::Invalid {
                message: format!("unknown bus backend: {other}"),
            }),
        }
    }
}

/// Bus connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: BusBackend,

    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// `JetStream` stream holding every routing key.
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Subject prefix in front of each routing key.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            nats_url: default_nats_url(),
            stream: default_stream(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// Producer settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PublisherConfig {
    /// Best effort or transactional outbox.
    #[serde(default)]
    pub mode: PublishMode,

    /// Outbox relay backoff.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_services() -> Vec<Service> {
    Service::ALL.to_vec()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_stream() -> String {
    "DISA_EVENTS".to_owned()
}

fn default_subject_prefix() -> String {
    "disa".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use disa_bus::FailurePolicy;
    use disa_services::ProximityMetric;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_document_is_an_all_in_one_memory_node() {
        let config: NodeConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config.bus.backend, BusBackend::Memory);
        assert_eq!(config.services, Service::ALL.to_vec());
        assert_eq!(config.publisher.mode, PublishMode::BestEffort);
        assert_eq!(config.logging.level, "info");
        assert!(!config.matcher.enabled);
    }

    #[test]
    fn parses_every_section() {
        let yaml = r"
bus:
  backend: nats
  nats_url: nats://bus:4222
  stream: RELIEF
services: [mission, shelter]
listener:
  concurrency: 4
  failure_policy: dead_letter
publisher:
  mode: outbox
  retry:
    first_ms: 100
    max_ms: 2000
shelter:
  radius_km: 25.0
  metric: haversine
task:
  case_insensitive_keywords: true
matcher:
  enabled: true
  model: gpt-4o
logging:
  level: debug
  json: true
";
        let config: NodeConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.bus.backend, BusBackend::Nats);
        assert_eq!(config.bus.stream, "RELIEF");
        assert_eq!(config.bus.subject_prefix, "disa");
        assert_eq!(config.services, vec![Service::Mission, Service::Shelter]);
        assert_eq!(config.listener.failure_policy, FailurePolicy::DeadLetter);
        assert_eq!(config.publisher.mode, PublishMode::Outbox);
        assert_eq!(config.shelter.metric, ProximityMetric::Haversine);
        assert!(config.task.case_insensitive_keywords);
        assert_eq!(config.matcher.model, "gpt-4o");
        assert!(config.logging.json);

        let platform = config.platform_config();
        assert_eq!(platform.publish_mode, PublishMode::Outbox);
        assert_eq!(platform.services.len(), 2);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = NodeConfig::default();
        config
            .apply_overrides_from(overrides(&[
                ("NATS_URL", "nats://prod:4222"),
                ("DISA_BUS_BACKEND", "NATS"),
                ("DISA_SERVICES", "task, personnel"),
                ("MATCHER_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.bus.nats_url, "nats://prod:4222");
        assert_eq!(config.bus.backend, BusBackend::Nats);
        assert_eq!(config.services, vec![Service::Task, Service::Personnel]);
        assert_eq!(config.matcher.api_key, "sk-test");
        assert!(!format!("{:?}", config.matcher).contains("sk-test"));
    }

    #[test]
    fn unknown_override_values_are_rejected() {
        let mut config = NodeConfig::default();
        let backend = config.apply_overrides_from(overrides(&[("DISA_BUS_BACKEND", "kafka")]));
        assert!(matches!(backend, Err(ConfigError::Invalid { .. })));

        let services = config.apply_overrides_from(overrides(&[("DISA_SERVICES", "billing")]));
        assert!(matches!(services, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_service_name_fails_to_parse() {
        let result: Result<NodeConfig, _> = serde_yml::from_str("services: [billing]");
        assert!(result.is_err());
    }
}
