use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::attribute::{AttributeRegistry, DEFAULT_BATCH_TIMEOUT};
use crate::cluster::synchronizer::DEFAULT_SYNCHRONIZATION_PERIOD;
use crate::descriptor::{Descriptor, keys};
use crate::error::{ConnectorError, ConnectorResult};
use crate::notification::EventCategory;
use crate::util;

/// Configuration of one connector
///
/// ```toml
/// resource = "web-frontend"
/// threads = 4
///
/// [parameters]
/// batchTimeout = "5s"
///
/// [attributes.latency]
/// gauge = "rangedGauge64"
/// from = 0
/// to = 250
///
/// [events.latencies]
/// name = "measurement.value"
/// filter = "(name=latency)"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Name of the monitored resource
    pub resource: String,

    /// Identity of this node within the cluster
    #[serde(default)]
    pub node: Option<String>,

    /// Worker threads; when set, listeners are notified in parallel
    #[serde(default)]
    pub threads: Option<usize>,

    /// Connector-level parameters (`batchTimeout`, `synchronizationPeriod`)
    #[serde(default)]
    pub parameters: Descriptor,

    /// Attribute descriptors by attribute id
    #[serde(default)]
    pub attributes: BTreeMap<String, Descriptor>,

    /// Event descriptors by category id
    #[serde(default)]
    pub events: BTreeMap<String, Descriptor>,
}

impl ConnectorConfig {
    pub fn batch_timeout(&self) -> ConnectorResult<Duration> {
        self.parameters
            .duration_or(keys::BATCH_TIMEOUT, DEFAULT_BATCH_TIMEOUT)
    }

    pub fn synchronization_period(&self) -> ConnectorResult<Duration> {
        let period = self
            .parameters
            .duration_or(keys::SYNCHRONIZATION_PERIOD, DEFAULT_SYNCHRONIZATION_PERIOD)?;
        if period.is_zero() {
            return Err(ConnectorError::invalid(
                keys::SYNCHRONIZATION_PERIOD,
                self.parameters
                    .get(keys::SYNCHRONIZATION_PERIOD)
                    .unwrap_or_default(),
                "must be greater than zero",
            ));
        }
        Ok(period)
    }

    pub fn node_id(&self) -> String {
        self.node
            .clone()
            .unwrap_or_else(|| util::get_default_node_id(&self.resource))
    }

    /// Apply overrides from the environment (`GUARDIA_NODE`)
    pub fn apply_env_overrides(&mut self) {
        if let Some(node) = util::get_node_override() {
            trace!("node id overridden from environment: {node}");
            self.node = Some(node);
        }
    }

    /// Check every descriptor without connecting anything
    pub fn validate(&self, registry: &AttributeRegistry) -> ConnectorResult<()> {
        if self.resource.trim().is_empty() {
            return Err(ConnectorError::missing("connector", "resource"));
        }
        if self.threads == Some(0) {
            return Err(ConnectorError::invalid("threads", "0", "must be at least 1"));
        }
        self.batch_timeout()?;
        self.synchronization_period()?;

        for (id, descriptor) in &self.attributes {
            registry.validate(id, descriptor)?;
        }
        for (id, descriptor) in &self.events {
            EventCategory::from_descriptor(id, descriptor.clone())?;
        }
        Ok(())
    }
}

/// Read a JSON or TOML (by `.toml` extension) configuration file
pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<ConnectorConfig> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let config: ConnectorConfig = if is_toml {
        toml::from_str(&file_content).context("invalid TOML configuration")?
    } else {
        serde_json::from_str(&file_content).context("invalid JSON configuration")?
    };

    trace!("loaded config: {config:?}");
    Ok(config)
}
