//! A store bound to its monitor.
//!
//! [`MonitorController`] is the write path for one config source: every
//! successful change is applied to the store first and then scheduled on the
//! monitor, and writes that change nothing schedule nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meshcfg_core::{
    Config, ConfigError, ConfigEvent, ConfigMeta, GroupVersionKind, ResourceVersion, Result,
    Schemas,
};
use tracing::{debug, info};

use crate::metrics::ConfigMetrics;
use crate::monitor::{EventHandler, Monitor, DEFAULT_EVENT_BUFFER};
use crate::stop::StopSignal;
use crate::store::{ConfigReader, ConfigStore, MemoryStore};

/// Which kind of source a controller represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Synthesized canonical configs.
    Builtin,
    /// A live Kubernetes cluster.
    Kubernetes,
    /// A remote MCP-over-xDS peer.
    Xds,
}

impl SourceKind {
    /// Short name for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Kubernetes => "kubernetes",
            Self::Xds => "xds",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One config source: a store, its monitor and a readiness flag.
///
/// # Example
///
/// ```rust
/// use meshcfg_core::{Config, ConfigMeta, GroupVersionKind, Schemas, Spec};
/// use meshcfg_store::{ConfigReader, MonitorController, SourceKind};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> meshcfg_core::Result<()> {
/// let controller = MonitorController::in_memory(SourceKind::Kubernetes, Schemas::kube());
/// let meta = ConfigMeta::new(GroupVersionKind::CONFIG_MAP, "default", "settings");
/// controller.create(Config::new(meta, Spec::Json(serde_json::json!({})))).await?;
///
/// assert!(controller.get(&GroupVersionKind::CONFIG_MAP, "default", "settings").is_some());
/// assert!(!controller.init_ready());
/// # Ok(())
/// # }
/// ```
pub struct MonitorController {
    kind: SourceKind,
    source: Option<String>,
    store: Arc<dyn ConfigStore>,
    monitor: Arc<Monitor>,
    ready: AtomicBool,
    metrics: ConfigMetrics,
}

impl fmt::Debug for MonitorController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorController")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("ready", &self.init_ready())
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl MonitorController {
    /// Bind `store` to a new monitor with the given queue capacity.
    pub fn new(kind: SourceKind, store: Arc<dyn ConfigStore>, event_buffer: usize) -> Self {
        let monitor = Arc::new(Monitor::with_buffer_size(&store.schemas(), event_buffer));
        Self {
            kind,
            source: None,
            store,
            monitor,
            ready: AtomicBool::new(false),
            metrics: ConfigMetrics::new(),
        }
    }

    /// Controller over a fresh [`MemoryStore`] with the default queue capacity.
    pub fn in_memory(kind: SourceKind, schemas: Schemas) -> Self {
        Self::new(kind, Arc::new(MemoryStore::new(schemas)), DEFAULT_EVENT_BUFFER)
    }

    /// Attach the address of the source this controller mirrors.
    #[must_use]
    pub fn with_source(mut self, address: impl Into<String>) -> Self {
        self.source = Some(address.into());
        self
    }

    /// Source kind.
    #[inline]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Source address, if any.
    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The underlying store.
    #[inline]
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Configs deleted from the store since the last [`gc_zombies`](Self::gc_zombies).
    pub fn zombies(&self, gvk: &GroupVersionKind) -> Vec<ConfigMeta> {
        self.store.zombies(gvk)
    }

    /// Drop retained zombies, returning how many were dropped.
    pub fn gc_zombies(&self) -> usize {
        self.store.gc_zombies()
    }

    /// The monitor.
    #[inline]
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Register a handler for `gvk`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownType`] if `gvk` is not in this controller's schema.
    pub fn register_event_handler(&self, gvk: &GroupVersionKind, handler: EventHandler) -> Result<()> {
        self.monitor.append_event_handler(gvk, handler)
    }

    /// Whether the initial sync with the source has completed.
    pub fn init_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Mark the initial sync as complete or not.
    pub fn set_ready(&self, ready: bool) {
        let was = self.ready.swap(ready, Ordering::AcqRel);
        if was != ready {
            info!(source = %self.label(), ready, "source readiness changed");
        }
        self.metrics.source_ready(self.label(), ready);
    }

    fn label(&self) -> &str {
        self.source.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Run the monitor loop until `stop` fires.
    pub async fn run(&self, stop: StopSignal) {
        self.monitor.run(stop).await;
    }

    async fn schedule(&self, event: ConfigEvent) -> Result<()> {
        self.metrics.event(event.event(), event.gvk());
        self.monitor.schedule_process_event(event).await
    }

    /// Create `cfg` and schedule an Add event.
    ///
    /// # Errors
    ///
    /// Store errors, or [`ConfigError::Shutdown`] if the monitor has stopped.
    pub async fn create(&self, cfg: Config) -> Result<ResourceVersion> {
        let gvk = cfg.gvk().clone();
        let (namespace, name) = (cfg.namespace().to_string(), cfg.name().to_string());

        let result = self.store.create(cfg);
        self.metrics.store_op("create", &gvk, &result);
        let version = result?;

        let stored = self
            .store
            .get(&gvk, &namespace, &name)
            .ok_or_else(|| ConfigError::not_found(&gvk, &namespace, &name))?;
        self.schedule(ConfigEvent::Add(stored)).await?;
        Ok(version)
    }

    /// Update `cfg`, scheduling an Update event only if the version changed.
    ///
    /// # Errors
    ///
    /// Store errors, or [`ConfigError::Shutdown`] if the monitor has stopped.
    pub async fn update(&self, cfg: Config) -> Result<ResourceVersion> {
        let gvk = cfg.gvk().clone();
        let (namespace, name) = (cfg.namespace().to_string(), cfg.name().to_string());
        let previous = self.store.get(&gvk, &namespace, &name);

        let result = self.store.update(cfg);
        self.metrics.store_op("update", &gvk, &result);
        let version = result?;

        let event = match previous {
            Some(old) if old.resource_version() == version.as_str() => {
                debug!(gvk = %gvk, namespace = %namespace, name = %name, "version unchanged, no event");
                return Ok(version);
            }
            Some(old) => {
                let Some(new) = self.store.get(&gvk, &namespace, &name) else {
                    return Ok(version);
                };
                ConfigEvent::Update { old, new }
            }
            // Created concurrently between the read and the write.
            None => match self.store.get(&gvk, &namespace, &name) {
                Some(new) => ConfigEvent::Add(new),
                None => return Ok(version),
            },
        };
        self.schedule(event).await?;
        Ok(version)
    }

    /// Delete a config and schedule a Delete event carrying its last value.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotFound`] if it does not exist.
    pub async fn delete(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Result<()> {
        let Some(previous) = self.store.get(gvk, namespace, name) else {
            self.metrics.store_op("delete", gvk, &Err::<(), _>(()));
            return Err(ConfigError::not_found(gvk, namespace, name));
        };

        let result = self.store.delete(gvk, namespace, name);
        self.metrics.store_op("delete", gvk, &result);
        result?;

        self.schedule(ConfigEvent::Delete(previous)).await
    }

    /// Create or update `cfg`.
    ///
    /// # Errors
    ///
    /// Store errors, or [`ConfigError::Shutdown`] if the monitor has stopped.
    pub async fn apply(&self, cfg: Config) -> Result<ResourceVersion> {
        if self.store.get(cfg.gvk(), cfg.namespace(), cfg.name()).is_some() {
            return self.update(cfg).await;
        }
        match self.create(cfg.clone()).await {
            Err(err) if err.is_already_exists() => self.update(cfg).await,
            other => other,
        }
    }
}

impl ConfigReader for MonitorController {
    fn schemas(&self) -> Schemas {
        self.store.schemas()
    }

    fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Option<Config> {
        self.store.get(gvk, namespace, name)
    }

    fn list(&self, gvk: Option<&GroupVersionKind>, namespace: &str) -> Result<Vec<Config>> {
        self.store.list(gvk, namespace)
    }
}
