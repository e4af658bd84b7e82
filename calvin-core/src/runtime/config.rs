//! Runtime configuration parsing.

use crate::queue::DEFAULT_QUEUE_LENGTH;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Runtime configuration matching the `calvin.yml` schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Default per-writer capacity for new port queues
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,

    /// Capability name -> platform settings
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilityConfig>,

    /// Capabilities never offered by this runtime
    #[serde(default)]
    pub capabilities_blacklist: Vec<String>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_queue_length() -> usize {
    DEFAULT_QUEUE_LENGTH
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Merged over open-time arguments; these win on conflicts
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_fires_per_pass")]
    pub max_fires_per_pass: usize,
}

fn default_max_fires_per_pass() -> usize {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_fires_per_pass: default_max_fires_per_pass(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_length: default_queue_length(),
            capabilities: BTreeMap::new(),
            capabilities_blacklist: Vec::new(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_length".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.scheduler.max_fires_per_pass == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.max_fires_per_pass".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Platform attributes for a capability, empty if none are configured
    pub fn attributes(&self, capability: &str) -> Map<String, Value> {
        self.capabilities
            .get(capability)
            .map(|c| c.attributes.clone())
            .unwrap_or_default()
    }
}
