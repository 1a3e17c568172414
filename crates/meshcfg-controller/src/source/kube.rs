//! Kubernetes source.
//!
//! One watch per kind of the controller's schema. Watch events are written
//! through the controller, so every change reaches its monitor. A relist
//! (`Init` .. `InitDone`) prunes objects that disappeared while the watch was
//! down. The controller turns ready once every watch has finished its first
//! list.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service as KubeService};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, Resource, ResourceExt};
use meshcfg_core::{Config, ConfigError, ConfigMeta, GroupVersionKind, Result, Spec};
use meshcfg_store::{ConfigReader, MonitorController, StopSignal};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::codec::spec_from_json;

/// Kinds a cluster can serve.
const WATCHED: [GroupVersionKind; 5] = [
    GroupVersionKind::POD,
    GroupVersionKind::ENDPOINTS,
    GroupVersionKind::SERVICE,
    GroupVersionKind::CONFIG_MAP,
    GroupVersionKind::SERVICE_ENTRY,
];

/// Build config metadata from Kubernetes object metadata.
///
/// The cluster's `resourceVersion` becomes the requested version.
pub fn config_meta(gvk: &GroupVersionKind, meta: &ObjectMeta) -> ConfigMeta {
    let mut out = ConfigMeta::new(
        gvk.clone(),
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    );
    out.labels = meta.labels.clone().unwrap_or_default();
    out.annotations = meta.annotations.clone().unwrap_or_default();
    out.creation_timestamp = meta.creation_timestamp.as_ref().map(|t| t.0);
    match meta.resource_version.as_deref() {
        Some(version) if !version.is_empty() => out.with_resource_version(version),
        _ => out,
    }
}

fn pod_config(gvk: &GroupVersionKind, pod: Pod) -> Result<Config> {
    let meta = config_meta(gvk, &pod.metadata);
    Ok(Config::new(meta, Spec::Pod(pod)))
}

fn endpoints_config(gvk: &GroupVersionKind, endpoints: Endpoints) -> Result<Config> {
    let meta = config_meta(gvk, &endpoints.metadata);
    Ok(Config::new(meta, Spec::Endpoints(endpoints)))
}

fn service_config(gvk: &GroupVersionKind, svc: KubeService) -> Result<Config> {
    let meta = config_meta(gvk, &svc.metadata);
    Ok(Config::new(meta, Spec::KubeService(svc)))
}

fn config_map_config(gvk: &GroupVersionKind, cm: ConfigMap) -> Result<Config> {
    let meta = config_meta(gvk, &cm.metadata);
    Ok(Config::new(meta, Spec::ConfigMap(cm)))
}

/// Config of a custom resource; its `spec` field is decoded for `gvk`.
///
/// # Errors
///
/// [`ConfigError::Decode`] if the spec does not fit the kind.
pub fn dynamic_config(gvk: &GroupVersionKind, obj: DynamicObject) -> Result<Config> {
    let meta = config_meta(gvk, &obj.metadata);
    let spec = obj
        .data
        .get("spec")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Ok(Config::new(meta, spec_from_json(gvk, spec)?))
}

/// Flips the controller ready once every watch has listed.
struct SyncTracker {
    remaining: AtomicUsize,
    controller: Arc<MonitorController>,
}

impl SyncTracker {
    fn new(watches: usize, controller: Arc<MonitorController>) -> Self {
        if watches == 0 {
            controller.set_ready(true);
        }
        Self {
            remaining: AtomicUsize::new(watches),
            controller,
        }
    }

    fn synced(&self, gvk: &GroupVersionKind) {
        info!(gvk = %gvk, "initial list complete");
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.controller.set_ready(true);
        }
    }
}

/// State of one kind's watch.
struct KindWatch<K> {
    gvk: GroupVersionKind,
    controller: Arc<MonitorController>,
    convert: fn(&GroupVersionKind, K) -> Result<Config>,
    relist: Option<HashSet<(String, String)>>,
    synced: bool,
}

impl<K: Resource> KindWatch<K> {
    async fn upsert(&mut self, obj: K) -> Result<()> {
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        let cfg = match (self.convert)(&self.gvk, obj) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(gvk = %self.gvk, namespace = %key.0, name = %key.1, error = %err, "skipping object");
                return Ok(());
            }
        };
        if let Some(seen) = self.relist.as_mut() {
            seen.insert(key);
        }
        match self.controller.apply(cfg).await {
            Ok(_) => Ok(()),
            Err(ConfigError::Shutdown) => Err(ConfigError::Shutdown),
            Err(err) => {
                warn!(gvk = %self.gvk, error = %err, "failed to apply watch event");
                Ok(())
            }
        }
    }

    async fn remove(&self, namespace: &str, name: &str) -> Result<()> {
        match self.controller.delete(&self.gvk, namespace, name).await {
            Err(ConfigError::Shutdown) => Err(ConfigError::Shutdown),
            Err(err) if !err.is_not_found() => {
                warn!(gvk = %self.gvk, namespace, name, error = %err, "failed to delete");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn prune(&self, seen: HashSet<(String, String)>) -> Result<()> {
        let stale: Vec<Config> = self
            .controller
            .list(Some(&self.gvk), "")?
            .into_iter()
            .filter(|c| !seen.contains(&(c.namespace().to_string(), c.name().to_string())))
            .collect();
        if !stale.is_empty() {
            debug!(gvk = %self.gvk, count = stale.len(), "pruning objects missing from relist");
        }
        for cfg in stale {
            self.remove(cfg.namespace(), cfg.name()).await?;
        }
        Ok(())
    }

    async fn handle(&mut self, event: Event<K>, tracker: &SyncTracker) -> Result<()> {
        match event {
            Event::Init => {
                self.relist = Some(HashSet::new());
            }
            Event::InitApply(obj) | Event::Apply(obj) => self.upsert(obj).await?,
            Event::Delete(obj) => {
                let namespace = obj.namespace().unwrap_or_default();
                self.remove(&namespace, &obj.name_any()).await?;
            }
            Event::InitDone => {
                if let Some(seen) = self.relist.take() {
                    self.prune(seen).await?;
                }
                if !self.synced {
                    self.synced = true;
                    tracker.synced(&self.gvk);
                }
            }
        }
        Ok(())
    }
}

async fn watch_kind<K>(
    api: Api<K>,
    mut watch: KindWatch<K>,
    tracker: Arc<SyncTracker>,
    stop: StopSignal,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    info!(gvk = %watch.gvk, "starting watch");
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(stream);
    let stopped = stop.wait();
    tokio::pin!(stopped);

    loop {
        let next = tokio::select! {
            _ = &mut stopped => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                if watch.handle(event, &tracker).await.is_err() {
                    break;
                }
            }
            Some(Err(err)) => warn!(gvk = %watch.gvk, error = %err, "watch error"),
            None => {
                warn!(gvk = %watch.gvk, "watch stream ended");
                break;
            }
        }
    }
    info!(gvk = %watch.gvk, "watch stopped");
}

/// Mirrors a Kubernetes cluster into a [`MonitorController`].
pub struct KubeSource {
    controller: Arc<MonitorController>,
    namespace: Option<String>,
    client: Option<Client>,
    backoff: Duration,
}

impl std::fmt::Debug for KubeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSource")
            .field("namespace", &self.namespace)
            .field("client", &self.client.is_some())
            .finish()
    }
}

impl KubeSource {
    /// Create a source writing into `controller`, optionally confined to
    /// `namespace`.
    pub fn new(controller: Arc<MonitorController>, namespace: Option<String>) -> Self {
        Self {
            controller,
            namespace,
            client: None,
            backoff: Duration::from_secs(1),
        }
    }

    /// Use `client` instead of inferring one from the environment.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Wait `backoff` between client connection attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Kinds this source will watch.
    pub fn watched_kinds(&self) -> Vec<GroupVersionKind> {
        let schemas = self.controller.schemas();
        WATCHED.into_iter().filter(|g| schemas.contains(g)).collect()
    }

    fn api<K>(&self, client: Client) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }

    fn dynamic_api(&self, client: Client, gvk: &GroupVersionKind) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(&kube::core::GroupVersionKind::gvk(
            gvk.group(),
            gvk.version(),
            gvk.kind(),
        ));
        match &self.namespace {
            Some(ns) => Api::namespaced_with(client, ns, &resource),
            None => Api::all_with(client, &resource),
        }
    }

    async fn client(&self, stop: &StopSignal) -> Option<Client> {
        if let Some(client) = &self.client {
            return Some(client.clone());
        }
        loop {
            match Client::try_default().await {
                Ok(client) => return Some(client),
                Err(err) => error!(error = %err, backoff = ?self.backoff, "failed to create kubernetes client"),
            }
            tokio::select! {
                _ = stop.clone().wait() => return None,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
    }

    fn kind_watch<K>(&self, gvk: &GroupVersionKind, convert: fn(&GroupVersionKind, K) -> Result<Config>) -> KindWatch<K> {
        KindWatch {
            gvk: gvk.clone(),
            controller: Arc::clone(&self.controller),
            convert,
            relist: None,
            synced: false,
        }
    }

    /// Watch the cluster until `stop` fires.
    pub async fn run(self, stop: StopSignal) {
        let Some(client) = self.client(&stop).await else {
            return;
        };
        let kinds = self.watched_kinds();
        let tracker = Arc::new(SyncTracker::new(kinds.len(), Arc::clone(&self.controller)));
        info!(namespace = ?self.namespace, kinds = kinds.len(), "starting kubernetes source");

        let mut watches = Vec::with_capacity(kinds.len());
        for gvk in &kinds {
            let (tracker, stop, client) = (Arc::clone(&tracker), stop.clone(), client.clone());
            let task = if *gvk == GroupVersionKind::POD {
                tokio::spawn(watch_kind(self.api::<Pod>(client), self.kind_watch(gvk, pod_config), tracker, stop))
            } else if *gvk == GroupVersionKind::ENDPOINTS {
                tokio::spawn(watch_kind(
                    self.api::<Endpoints>(client),
                    self.kind_watch(gvk, endpoints_config),
                    tracker,
                    stop,
                ))
            } else if *gvk == GroupVersionKind::SERVICE {
                tokio::spawn(watch_kind(
                    self.api::<KubeService>(client),
                    self.kind_watch(gvk, service_config),
                    tracker,
                    stop,
                ))
            } else if *gvk == GroupVersionKind::CONFIG_MAP {
                tokio::spawn(watch_kind(
                    self.api::<ConfigMap>(client),
                    self.kind_watch(gvk, config_map_config),
                    tracker,
                    stop,
                ))
            } else {
                tokio::spawn(watch_kind(
                    self.dynamic_api(client, gvk),
                    self.kind_watch(gvk, dynamic_config),
                    tracker,
                    stop,
                ))
            };
            watches.push(task);
        }

        for result in futures::future::join_all(watches).await {
            if let Err(err) = result {
                error!(error = %err, "watch task failed");
            }
        }
        info!("kubernetes source stopped");
    }
}
