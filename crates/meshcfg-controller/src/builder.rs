//! Builder for the config controller.

use std::sync::Arc;

use meshcfg_core::{ConfigError, Result, Schemas};
use meshcfg_store::{MemoryStore, MonitorController, SourceKind, SubscribableMap, ViewerStore};
use meshcfg_types::{Node, Service};
use tracing::info;

use crate::config::ControllerConfig;
use crate::controller::{ConfigController, SourceRunner};
use crate::source::{ConfigSource, KubeSource, McpConnector, XdsSource};

/// Builder for creating a [`ConfigController`].
///
/// # Example
///
/// ```rust
/// use meshcfg_controller::{ConfigControllerBuilder, ControllerConfig};
///
/// let config = ControllerConfig::builder()
///     .source("k8s://")
///     .translate_services(true)
///     .build()
///     .unwrap();
/// let controller = ConfigControllerBuilder::new().config(config).build().unwrap();
///
/// // The built-in controller always comes first.
/// assert_eq!(controller.controllers().len(), 2);
/// assert_eq!(controller.controllers()[0].kind(), meshcfg_store::SourceKind::Builtin);
/// ```
#[derive(Default)]
pub struct ConfigControllerBuilder {
    config: Option<ControllerConfig>,
    connector: Option<Arc<dyn McpConnector>>,
    kube_client: Option<kube::Client>,
    facts: Option<SubscribableMap<Service>>,
}

impl std::fmt::Debug for ConfigControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigControllerBuilder")
            .field("config", &self.config)
            .field("connector", &self.connector.is_some())
            .field("kube_client", &self.kube_client.is_some())
            .finish()
    }
}

impl ConfigControllerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    ///
    /// This is required.
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the transport used by `xds://` sources.
    ///
    /// Required when any `xds://` source is configured.
    pub fn mcp_connector(mut self, connector: Arc<dyn McpConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use `client` for `k8s://` sources instead of inferring one from the
    /// environment when they start.
    pub fn kube_client(mut self, client: kube::Client) -> Self {
        self.kube_client = Some(client);
        self
    }

    /// Share `facts` instead of creating a fresh map.
    pub fn shared_facts(mut self, facts: SubscribableMap<Service>) -> Self {
        self.facts = Some(facts);
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No configuration was provided, or it does not validate
    /// - A source address is invalid
    /// - An `xds://` source is configured without an MCP connector
    pub fn build(self) -> Result<ConfigController> {
        let config = self
            .config
            .ok_or_else(|| ConfigError::Configuration("config is required".into()))?;
        config.validate()?;

        let builtin_store = MemoryStore::builder(Schemas::builtin())
            .retain_zombies(config.incremental_push)
            .build();
        let builtin = Arc::new(MonitorController::new(
            SourceKind::Builtin,
            Arc::new(builtin_store),
            config.event_buffer,
        ));
        builtin.set_ready(true);

        let mut controllers = vec![Arc::clone(&builtin)];
        let mut runners = Vec::new();
        let node = Node {
            id: config.node_id.clone(),
            ..Default::default()
        };

        for source in config.sources()? {
            match source {
                ConfigSource::Kubernetes { address } => {
                    let controller = Arc::new(
                        MonitorController::new(
                            SourceKind::Kubernetes,
                            Arc::new(MemoryStore::new(Schemas::kube())),
                            config.event_buffer,
                        )
                        .with_source(address),
                    );
                    let mut runner = KubeSource::new(Arc::clone(&controller), config.kube_namespace.clone())
                        .with_backoff(config.reconnect_backoff());
                    if let Some(client) = &self.kube_client {
                        runner = runner.with_client(client.clone());
                    }
                    controllers.push(controller);
                    runners.push(SourceRunner::Kube(runner));
                }
                ConfigSource::Xds {
                    address,
                    endpoint,
                    types,
                } => {
                    let connector = self.connector.clone().ok_or_else(|| {
                        ConfigError::Configuration(format!("source {address} needs an MCP connector"))
                    })?;
                    let store = MemoryStore::builder(Schemas::builtin())
                        .retain_zombies(config.incremental_push)
                        .build();
                    let controller = Arc::new(
                        MonitorController::new(SourceKind::Xds, Arc::new(store), config.event_buffer)
                            .with_source(address),
                    );
                    let runner = XdsSource::new(Arc::clone(&controller), endpoint, types, connector)
                        .with_node(node.clone())
                        .incremental(config.incremental_push)
                        .with_backoff(config.reconnect_backoff());
                    controllers.push(controller);
                    runners.push(SourceRunner::Xds(runner));
                }
            }
        }

        let mut viewer = ViewerStore::new();
        for controller in &controllers {
            viewer.register(Arc::clone(controller) as Arc<dyn meshcfg_store::ConfigReader>);
        }

        info!(
            sources = controllers.len() - 1,
            translate_services = config.translate_services,
            incremental_push = config.incremental_push,
            "config controller built"
        );
        Ok(ConfigController::from_parts(
            config,
            builtin,
            controllers,
            runners,
            viewer,
            self.facts.unwrap_or_default(),
        ))
    }
}
