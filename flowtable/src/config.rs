// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow table configuration

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracectl::{TraceCtlError, get_trace_ctl};
use tracing::debug;

use crate::checksum::TableChecksum;

/// The reasons why a configuration may be rejected
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("Invalid tracing setup: {0}")]
    Tracing(#[from] TraceCtlError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default, deny_unknown_fields)]
#[builder(default)]
pub struct FlowTableConfig {
    /// name of the instance, used to label its metrics
    #[builder(setter(into))]
    pub name: String,
    /// checksum buckets per table, 0 to only keep the table checksums
    pub checksum_buckets_size: u32,
    /// entries an iteration task may visit before yielding
    pub task_quantum_entries: usize,
    /// time an iteration task may run before yielding, in microseconds (0 for no limit)
    pub task_quantum_us: u64,
    /// pending iteration tasks allowed
    pub max_iter_tasks: usize,
    /// log levels to apply, as `tag=level,...`
    #[builder(setter(into, strip_option))]
    pub tracing: Option<String>,
}

impl Default for FlowTableConfig {
    fn default() -> Self {
        Self {
            name: "flowtable".to_string(),
            checksum_buckets_size: 0,
            task_quantum_entries: 64,
            task_quantum_us: 0,
            max_iter_tasks: 64,
            tracing: None,
        }
    }
}

impl FlowTableConfig {
    #[must_use]
    pub fn builder() -> FlowTableConfigBuilder {
        FlowTableConfigBuilder::default()
    }

    /// Parse and validate a YAML configuration. Missing fields take their default.
    ///
    /// # Errors
    ///
    /// Fails if the YAML is malformed or a value is out of range.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Fails if a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        debug!("Validating flow table configuration..");
        if self.checksum_buckets_size != 0 {
            TableChecksum::validate_size(self.checksum_buckets_size).map_err(|_| {
                ConfigError::InvalidValue(
                    "checksum_buckets_size",
                    format!("{} is not a power of two", self.checksum_buckets_size),
                )
            })?;
        }
        if self.task_quantum_entries == 0 {
            return Err(ConfigError::InvalidValue(
                "task_quantum_entries",
                "must be at least 1".to_string(),
            ));
        }
        if self.max_iter_tasks == 0 {
            return Err(ConfigError::InvalidValue(
                "max_iter_tasks",
                "must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the log levels of the configuration, if any.
    ///
    /// # Errors
    ///
    /// Fails if the tracing string is malformed or names an unknown tag.
    pub fn apply_tracing(&self) -> Result<(), ConfigError> {
        if let Some(tracing) = &self.tracing {
            get_trace_ctl().setup_from_string(tracing)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn task_quantum(&self) -> Option<Duration> {
        (self.task_quantum_us != 0).then(|| Duration::from_micros(self.task_quantum_us))
    }
}
