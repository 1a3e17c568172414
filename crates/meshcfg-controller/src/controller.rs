//! The aggregating config controller.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meshcfg_core::{Config, ConfigError, ConfigMeta, GroupVersionKind, Result, Schemas};
use meshcfg_store::{
    ConfigReader, EventHandler, Listing, MonitorController, SourceKind, StopSignal, SubscribableMap,
    ViewerStore,
};
use meshcfg_types::Service;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::builder::ConfigControllerBuilder;
use crate::config::ControllerConfig;
use crate::source::{KubeSource, XdsSource};
use crate::translate::TranslationPipeline;

/// A source adapter waiting to be started.
pub(crate) enum SourceRunner {
    Kube(KubeSource),
    Xds(XdsSource),
}

impl SourceRunner {
    async fn run(self, stop: StopSignal) {
        match self {
            Self::Kube(source) => source.run(stop).await,
            Self::Xds(source) => source.run(stop).await,
        }
    }
}

/// Aggregates one [`MonitorController`] per config source behind a single
/// read and subscribe API.
///
/// The built-in controller, holding synthesized canonical configs, is always
/// first; reads prefer it over the sources.
///
/// # Example
///
/// ```rust
/// use meshcfg_controller::{ConfigController, ControllerConfig};
/// use meshcfg_core::{ConfigEvent, GroupVersionKind};
/// use std::sync::Arc;
///
/// let config = ControllerConfig::builder().source("k8s://").build().unwrap();
/// let controller = ConfigController::new(config).unwrap();
///
/// controller
///     .register_event_handler(&GroupVersionKind::SERVICE_ENTRY, Arc::new(|ev: &ConfigEvent| {
///         println!("{} {}", ev.event(), ev.config().meta.key());
///     }))
///     .unwrap();
/// assert!(controller.list(Some(&GroupVersionKind::SERVICE_ENTRY), "").is_complete());
/// ```
pub struct ConfigController {
    config: ControllerConfig,
    builtin: Arc<MonitorController>,
    controllers: Vec<Arc<MonitorController>>,
    runners: Mutex<Vec<SourceRunner>>,
    viewer: ViewerStore,
    facts: SubscribableMap<Service>,
    started: AtomicBool,
}

impl fmt::Debug for ConfigController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigController")
            .field("controllers", &self.controllers)
            .field("translate_services", &self.config.translate_services)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl ConfigController {
    /// Create a builder.
    pub fn builder() -> ConfigControllerBuilder {
        ConfigControllerBuilder::new()
    }

    /// Build a controller from `config` with no MCP transport.
    ///
    /// # Errors
    ///
    /// See [`ConfigControllerBuilder::build`].
    pub fn new(config: ControllerConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub(crate) fn from_parts(
        config: ControllerConfig,
        builtin: Arc<MonitorController>,
        controllers: Vec<Arc<MonitorController>>,
        runners: Vec<SourceRunner>,
        viewer: ViewerStore,
        facts: SubscribableMap<Service>,
    ) -> Self {
        Self {
            config,
            builtin,
            controllers,
            runners: Mutex::new(runners),
            viewer,
            facts,
            started: AtomicBool::new(false),
        }
    }

    /// The configuration this controller was built from.
    #[inline]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The built-in controller.
    #[inline]
    pub fn builtin(&self) -> &Arc<MonitorController> {
        &self.builtin
    }

    /// Every controller, built-in first, then sources in configured order.
    #[inline]
    pub fn controllers(&self) -> &[Arc<MonitorController>] {
        &self.controllers
    }

    /// The first controller of `kind`.
    pub fn controller(&self, kind: SourceKind) -> Option<&Arc<MonitorController>> {
        self.controllers.iter().find(|c| c.kind() == kind)
    }

    /// The read view over every controller.
    #[inline]
    pub fn viewer(&self) -> &ViewerStore {
        &self.viewer
    }

    /// Canonical services keyed by [`fact_key`](crate::fact_key)
    /// (`namespace/hostname`), as mirrored by the translation pipeline.
    #[inline]
    pub fn shared_facts(&self) -> &SubscribableMap<Service> {
        &self.facts
    }

    /// Union of every controller's kinds.
    pub fn schemas(&self) -> &Schemas {
        self.viewer.schemas()
    }

    /// First copy of a config across controllers.
    pub fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Option<Config> {
        self.viewer.get(gvk, namespace, name)
    }

    /// Merged configs of `gvk` (all kinds when `None`) with per-source errors.
    pub fn list(&self, gvk: Option<&GroupVersionKind>, namespace: &str) -> Listing {
        self.viewer.list(gvk, namespace)
    }

    /// Register `handler` on every controller serving `gvk`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownType`] if no controller serves `gvk`.
    pub fn register_event_handler(&self, gvk: &GroupVersionKind, handler: EventHandler) -> Result<()> {
        let mut registered = 0;
        for controller in self.controllers.iter().filter(|c| c.schemas().contains(gvk)) {
            controller.register_event_handler(gvk, Arc::clone(&handler))?;
            registered += 1;
        }
        if registered == 0 {
            return Err(ConfigError::UnknownType { gvk: gvk.clone() });
        }
        debug!(gvk = %gvk, controllers = registered, "event handler registered");
        Ok(())
    }

    /// Configs of `gvk` deleted from any controller since the last
    /// [`gc_zombies`](Self::gc_zombies). Empty unless `incremental_push` is on.
    pub fn zombies(&self, gvk: &GroupVersionKind) -> Vec<ConfigMeta> {
        self.controllers.iter().flat_map(|c| c.zombies(gvk)).collect()
    }

    /// Drop the retained zombies of every controller. Returns how many were
    /// dropped.
    pub fn gc_zombies(&self) -> usize {
        self.controllers.iter().map(|c| c.gc_zombies()).sum()
    }

    /// Whether every controller has completed its initial sync.
    pub fn init_ready(&self) -> bool {
        self.controllers.iter().all(|c| c.init_ready())
    }

    fn start_pipelines(&self, runtime: &Handle) -> Result<()> {
        if !self.config.translate_services {
            return Ok(());
        }
        for source in self.controllers.iter().filter(|c| c.kind() != SourceKind::Builtin) {
            let pipeline = Arc::new(TranslationPipeline::new(
                Arc::clone(source),
                Arc::clone(&self.builtin),
                runtime.clone(),
                self.config.join_retry,
                self.config.domain_suffix.clone(),
                self.facts.clone(),
            ));
            pipeline.register()?;
        }
        Ok(())
    }

    /// Register the translation pipeline (when enabled) and spawn every
    /// controller's monitor loop, without starting the sources.
    ///
    /// Tests use this to drive source controllers directly.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Configuration`] if called twice or outside a Tokio
    /// runtime.
    pub fn start_monitors(&self, stop: StopSignal) -> Result<Vec<JoinHandle<()>>> {
        let runtime = Handle::try_current()
            .map_err(|e| ConfigError::Configuration(format!("no async runtime: {e}")))?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ConfigError::Configuration("config controller already started".into()));
        }
        self.start_pipelines(&runtime)?;

        let handles = self
            .controllers
            .iter()
            .map(|controller| {
                let (controller, stop) = (Arc::clone(controller), stop.clone());
                runtime.spawn(async move { controller.run(stop).await })
            })
            .collect::<Vec<_>>();
        info!(controllers = handles.len(), "monitors started");
        Ok(handles)
    }

    /// Start every monitor and source, then wait until `stop` fires and
    /// everything has wound down.
    ///
    /// # Errors
    ///
    /// See [`start_monitors`](Self::start_monitors).
    pub async fn run(&self, stop: StopSignal) -> Result<()> {
        let mut handles = self.start_monitors(stop.clone())?;
        let runners = std::mem::take(&mut *self.runners.lock());
        for runner in runners {
            handles.push(tokio::spawn(runner.run(stop.clone())));
        }
        info!(tasks = handles.len(), "config controller running");

        stop.wait().await;
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                error!(error = %err, "config controller task failed");
            }
        }
        info!("config controller stopped");
        Ok(())
    }
}
