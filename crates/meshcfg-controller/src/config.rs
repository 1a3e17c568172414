//! Controller configuration.

use std::time::Duration;

use meshcfg_core::{ConfigError, Result};
use meshcfg_registry::JoinRetry;
use meshcfg_store::DEFAULT_EVENT_BUFFER;
use serde::Deserialize;

use crate::source::ConfigSource;

/// Address of one config source, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigSourceSpec {
    /// `k8s://...` or `xds://host:port?types=...`.
    pub address: String,
}

impl ConfigSourceSpec {
    /// Create a spec for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Configuration of a [`ConfigController`](crate::ConfigController).
///
/// Every field has a default, so a partial document deserializes.
///
/// # Example
///
/// ```rust
/// use meshcfg_controller::ControllerConfig;
///
/// let config: ControllerConfig = serde_json::from_str(
///     r#"{ "configSources": [{ "address": "k8s://" }], "translateServices": true }"#,
/// )
/// .unwrap();
/// assert_eq!(config.domain_suffix, "cluster.local");
/// assert_eq!(config.event_buffer, 100);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Sources to aggregate.
    #[serde(default)]
    pub config_sources: Vec<ConfigSourceSpec>,

    /// Mirror Services, Endpoints and ServiceEntries into the canonical model.
    #[serde(default)]
    pub translate_services: bool,

    /// Suffix of synthesized service hostnames.
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,

    /// Monitor queue capacity.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Wait policy for out-of-order Endpoints and Pods.
    #[serde(default)]
    pub join_retry: JoinRetry,

    /// Use incremental (delta) MCP instead of state-of-the-world.
    #[serde(default)]
    pub incremental_push: bool,

    /// Delay before reconnecting a failed source, in milliseconds.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Restrict Kubernetes watches to one namespace.
    #[serde(default)]
    pub kube_namespace: Option<String>,

    /// Node identifier sent to MCP peers.
    #[serde(default = "default_node_id")]
    pub node_id: String,
}

fn default_domain_suffix() -> String {
    "cluster.local".to_string()
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

fn default_node_id() -> String {
    "meshcfg".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            config_sources: Vec::new(),
            translate_services: false,
            domain_suffix: default_domain_suffix(),
            event_buffer: default_event_buffer(),
            join_retry: JoinRetry::default(),
            incremental_push: false,
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            kube_namespace: None,
            node_id: default_node_id(),
        }
    }
}

impl ControllerConfig {
    /// Create a builder.
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Delay before reconnecting a failed source.
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Parse every configured source address.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidConfigSource`] for the first bad address.
    pub fn sources(&self) -> Result<Vec<ConfigSource>> {
        self.config_sources
            .iter()
            .map(|s| s.address.parse())
            .collect()
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Configuration`] when no source is configured or a size
    /// is zero, [`ConfigError::InvalidConfigSource`] for a bad address.
    pub fn validate(&self) -> Result<()> {
        if self.sources()?.is_empty() {
            return Err(ConfigError::Configuration(
                "at least one config source must be configured".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Configuration("event buffer must be positive".into()));
        }
        if self.join_retry.attempts == 0 {
            return Err(ConfigError::Configuration("join retry attempts must be positive".into()));
        }
        if self.domain_suffix.is_empty() {
            return Err(ConfigError::Configuration("domain suffix must not be empty".into()));
        }
        Ok(())
    }
}

/// Builder for [`ControllerConfig`].
#[derive(Debug, Default)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    /// Add a source address.
    pub fn source(mut self, address: impl Into<String>) -> Self {
        self.config.config_sources.push(ConfigSourceSpec::new(address));
        self
    }

    /// Enable or disable the translation pipeline.
    pub fn translate_services(mut self, enabled: bool) -> Self {
        self.config.translate_services = enabled;
        self
    }

    /// Set the hostname suffix.
    pub fn domain_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.domain_suffix = suffix.into();
        self
    }

    /// Set the monitor queue capacity.
    pub fn event_buffer(mut self, size: usize) -> Self {
        self.config.event_buffer = size;
        self
    }

    /// Set the dependent-resource wait policy.
    pub fn join_retry(mut self, retry: JoinRetry) -> Self {
        self.config.join_retry = retry;
        self
    }

    /// Use incremental MCP.
    pub fn incremental_push(mut self, enabled: bool) -> Self {
        self.config.incremental_push = enabled;
        self
    }

    /// Set the reconnect delay.
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.config.reconnect_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Restrict Kubernetes watches to `namespace`.
    pub fn kube_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.kube_namespace = Some(namespace.into());
        self
    }

    /// Set the MCP node identifier.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.config.node_id = id.into();
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// See [`ControllerConfig::validate`].
    pub fn build(self) -> Result<ControllerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
