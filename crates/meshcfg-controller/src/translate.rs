//! Translation of source registry objects into the canonical model.
//!
//! Handlers on a source controller convert `ServiceEntry`, `Service` and
//! `Endpoints` events into `IstioService` / `IstioEndpoint` configs and mirror
//! them into the built-in controller. Each event recomputes the canonical
//! objects it implies, removes what is no longer implied and writes what
//! changed. A failed mirror write is logged and skipped; siblings already
//! written stay written.
//!
//! Handlers run on the source monitor's blocking thread and drive the
//! built-in controller's async writes through a runtime [`Handle`]. They must
//! never write into the monitor that invokes them.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Pod};
use meshcfg_core::{Config, ConfigError, ConfigEvent, ConfigMeta, GroupVersionKind, Result, Spec};
use meshcfg_registry::{
    convert_endpoints, convert_kube_service, convert_service, convert_service_entry, endpoint_keys,
    service_hostname, JoinRetry, KubeIndex,
};
use meshcfg_store::{ConfigMetrics, ConfigReader, MonitorController, SubscribableMap};
use meshcfg_types::{IstioEndpoint, Service, ServiceEntrySpec};
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

/// [`KubeIndex`] over the objects a source has stored.
pub struct StoreIndex<'a> {
    reader: &'a dyn ConfigReader,
}

impl<'a> StoreIndex<'a> {
    /// Index `reader`.
    pub fn new(reader: &'a dyn ConfigReader) -> Self {
        Self { reader }
    }
}

fn pod_has_ip(pod: &Pod, ip: &str) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    status.pod_ip.as_deref() == Some(ip)
}

impl KubeIndex for StoreIndex<'_> {
    fn endpoints(&self, namespace: &str, name: &str) -> Option<Endpoints> {
        self.reader
            .get(&GroupVersionKind::ENDPOINTS, namespace, name)?
            .spec
            .as_endpoints()
            .cloned()
    }

    fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.reader
            .get(&GroupVersionKind::POD, namespace, name)?
            .spec
            .as_pod()
            .cloned()
    }

    fn pod_by_ip(&self, namespace: &str, ip: &str) -> Option<Pod> {
        if namespace.is_empty() {
            return None;
        }
        self.reader
            .list(Some(&GroupVersionKind::POD), namespace)
            .ok()?
            .into_iter()
            .find_map(|cfg| cfg.spec.as_pod().filter(|pod| pod_has_ip(pod, ip)).cloned())
    }
}

/// Key of a mirrored service in the shared facts map: `namespace/hostname`.
///
/// The same host may be declared in several namespaces; each is its own fact.
pub fn fact_key(namespace: &str, hostname: &str) -> String {
    format!("{namespace}/{hostname}")
}

/// Canonical config of a mirrored service, named by its hostname.
pub fn service_config(service: Service) -> Config {
    let meta = ConfigMeta::new(
        GroupVersionKind::ISTIO_SERVICE,
        service.attributes.namespace.clone(),
        service.hostname.clone(),
    );
    Config::new(meta, service)
}

/// Canonical config of a mirrored endpoint, named by its key.
pub fn endpoint_config(endpoint: IstioEndpoint) -> Config {
    let meta = ConfigMeta::new(GroupVersionKind::ISTIO_ENDPOINT, endpoint.namespace.clone(), endpoint.key());
    Config::new(meta, endpoint)
}

fn service_entry_spec(cfg: &Config) -> Option<Cow<'_, ServiceEntrySpec>> {
    match &*cfg.spec {
        Spec::ServiceEntry(se) => Some(Cow::Borrowed(se)),
        Spec::Json(value) => match serde_json::from_value(value.clone()) {
            Ok(se) => Some(Cow::Owned(se)),
            Err(err) => {
                warn!(key = %cfg.meta.key(), error = %err, "undecodable ServiceEntry");
                None
            }
        },
        other => {
            warn!(key = %cfg.meta.key(), variant = other.variant(), "unexpected ServiceEntry payload");
            None
        }
    }
}

/// `pod ...` or `endpoints ...` from a join timeout.
fn join_target(err: &ConfigError) -> Option<&'static str> {
    match err {
        ConfigError::JoinTimeout { what, .. } if what.starts_with("pod") => Some("pod"),
        ConfigError::JoinTimeout { .. } => Some("endpoints"),
        _ => None,
    }
}

/// Mirrors one source controller's registry objects into the built-in
/// controller.
pub struct TranslationPipeline {
    source: Arc<MonitorController>,
    builtin: Arc<MonitorController>,
    runtime: Handle,
    retry: JoinRetry,
    domain_suffix: String,
    facts: SubscribableMap<Service>,
    metrics: ConfigMetrics,
}

impl fmt::Debug for TranslationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationPipeline")
            .field("source", &self.source.kind())
            .field("domain_suffix", &self.domain_suffix)
            .field("retry", &self.retry)
            .finish()
    }
}

impl TranslationPipeline {
    /// Create a pipeline from `source` into `builtin`.
    ///
    /// Mirrored services are also published into `facts` under [`fact_key`].
    pub fn new(
        source: Arc<MonitorController>,
        builtin: Arc<MonitorController>,
        runtime: Handle,
        retry: JoinRetry,
        domain_suffix: impl Into<String>,
        facts: SubscribableMap<Service>,
    ) -> Self {
        Self {
            source,
            builtin,
            runtime,
            retry,
            domain_suffix: domain_suffix.into(),
            facts,
            metrics: ConfigMetrics::new(),
        }
    }

    /// Register handlers for whichever of `ServiceEntry`, `Service` and
    /// `Endpoints` the source serves. Returns how many were registered.
    ///
    /// # Errors
    ///
    /// Propagates registration failures.
    pub fn register(self: &Arc<Self>) -> Result<usize> {
        let schemas = self.source.schemas();
        let mut registered = 0;

        if schemas.contains(&GroupVersionKind::SERVICE_ENTRY) {
            let this = Arc::clone(self);
            self.source.register_event_handler(
                &GroupVersionKind::SERVICE_ENTRY,
                Arc::new(move |ev: &ConfigEvent| this.on_service_entry(ev)),
            )?;
            registered += 1;
        }
        if schemas.contains(&GroupVersionKind::SERVICE) {
            let this = Arc::clone(self);
            self.source.register_event_handler(
                &GroupVersionKind::SERVICE,
                Arc::new(move |ev: &ConfigEvent| this.on_service(ev)),
            )?;
            registered += 1;
        }
        if schemas.contains(&GroupVersionKind::ENDPOINTS) {
            let this = Arc::clone(self);
            self.source.register_event_handler(
                &GroupVersionKind::ENDPOINTS,
                Arc::new(move |ev: &ConfigEvent| this.on_endpoints(ev)),
            )?;
            registered += 1;
        }
        debug!(source = %self.source.kind(), handlers = registered, "translation pipeline registered");
        Ok(registered)
    }

    fn mirrored_service(&self, namespace: &str, hostname: &str) -> Option<Service> {
        self.builtin
            .get(&GroupVersionKind::ISTIO_SERVICE, namespace, hostname)?
            .spec
            .as_mesh_service()
            .cloned()
    }

    /// Write `cfg` unless the built-in copy already has the same spec.
    fn put(&self, cfg: Config) {
        if let Some(current) = self.builtin.get(cfg.gvk(), cfg.namespace(), cfg.name()) {
            if current.spec == cfg.spec {
                trace!(key = %cfg.meta.key(), "mirror unchanged");
                return;
            }
        }
        let (kind, key) = (cfg.gvk().kind().to_string(), cfg.meta.key());
        let published = cfg.spec.as_mesh_service().cloned();

        let result = self.runtime.block_on(self.builtin.apply(cfg));
        self.metrics.mirror_op("apply", &kind, &result);
        match result {
            Ok(version) => {
                debug!(key = %key, version = %version, "mirrored");
                if let Some(service) = published {
                    self.facts
                        .set(fact_key(&service.attributes.namespace, &service.hostname), service);
                }
            }
            Err(err) => error!(key = %key, error = %err, "mirror write failed"),
        }
    }

    fn remove(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) {
        let result = self.runtime.block_on(self.builtin.delete(gvk, namespace, name));
        self.metrics.mirror_op("delete", gvk.kind(), &result);
        match result {
            Ok(()) => {
                debug!(gvk = %gvk, namespace, name, "mirror removed");
                if *gvk == GroupVersionKind::ISTIO_SERVICE {
                    self.facts.remove(&fact_key(namespace, name));
                }
            }
            Err(err) if err.is_not_found() => trace!(gvk = %gvk, namespace, name, "mirror already gone"),
            Err(err) => error!(gvk = %gvk, namespace, name, error = %err, "mirror delete failed"),
        }
    }

    /// Replace the canonical objects implied by `old` with those implied by
    /// `new`. Removals go first.
    fn reconcile(&self, old: &[Service], new: &[Service]) {
        let endpoints = |services: &[Service]| -> BTreeMap<(String, String), IstioEndpoint> {
            services
                .iter()
                .flat_map(|s| s.endpoints.iter())
                .map(|ep| ((ep.namespace.clone(), ep.key()), ep.clone()))
                .collect()
        };
        let (old_eps, new_eps) = (endpoints(old), endpoints(new));
        let new_hosts: HashSet<(&str, &str)> = new
            .iter()
            .map(|s| (s.attributes.namespace.as_str(), s.hostname.as_str()))
            .collect();

        for (namespace, key) in old_eps.keys().filter(|k| !new_eps.contains_key(*k)) {
            self.remove(&GroupVersionKind::ISTIO_ENDPOINT, namespace, key);
        }
        for svc in old
            .iter()
            .filter(|s| !new_hosts.contains(&(s.attributes.namespace.as_str(), s.hostname.as_str())))
        {
            self.remove(&GroupVersionKind::ISTIO_SERVICE, &svc.attributes.namespace, &svc.hostname);
        }

        for svc in new {
            self.put(service_config(svc.clone()));
        }
        for ep in new_eps.into_values() {
            self.put(endpoint_config(ep));
        }
    }

    fn service_entry_services(&self, cfg: &Config) -> Vec<Service> {
        service_entry_spec(cfg)
            .map(|se| convert_service_entry(&cfg.meta, &se))
            .unwrap_or_default()
    }

    fn on_service_entry(&self, ev: &ConfigEvent) {
        let (old, new) = match ev {
            ConfigEvent::Add(cfg) => (Vec::new(), self.service_entry_services(cfg)),
            ConfigEvent::Update { old, new } => {
                (self.service_entry_services(old), self.service_entry_services(new))
            }
            ConfigEvent::Delete(cfg) => (self.service_entry_services(cfg), Vec::new()),
        };
        trace!(key = %ev.config().meta.key(), event = %ev.event(), hosts = new.len(), "translating ServiceEntry");
        self.reconcile(&old, &new);
    }

    /// Convert a Kubernetes service with its endpoints, degrading to a
    /// service without endpoints when a dependency never shows up.
    fn kube_service(&self, cfg: &Config) -> Option<Service> {
        let Some(svc) = cfg.spec.as_kube_service() else {
            warn!(key = %cfg.meta.key(), variant = cfg.spec.variant(), "unexpected Service payload");
            return None;
        };
        let index = StoreIndex::new(self.source.as_ref());
        match convert_kube_service(svc, &index, &self.retry, &self.domain_suffix) {
            Ok(service) => Some(service),
            Err(err) => match join_target(&err) {
                Some(what) => {
                    self.metrics.join_timeout(what);
                    warn!(key = %cfg.meta.key(), error = %err, "join timed out, mirroring service without endpoints");
                    Some(convert_service(svc, &self.domain_suffix))
                }
                None => {
                    error!(key = %cfg.meta.key(), error = %err, "service conversion failed");
                    None
                }
            },
        }
    }

    fn on_service(&self, ev: &ConfigEvent) {
        let cfg = ev.config();
        let hostname = service_hostname(cfg.name(), cfg.namespace(), &self.domain_suffix);
        let old: Vec<Service> = self.mirrored_service(cfg.namespace(), &hostname).into_iter().collect();
        let new: Vec<Service> = match ev {
            ConfigEvent::Delete(_) => Vec::new(),
            _ => match self.kube_service(cfg) {
                Some(service) => vec![service],
                None => return,
            },
        };
        trace!(key = %cfg.meta.key(), event = %ev.event(), "translating Service");
        self.reconcile(&old, &new);
    }

    fn on_endpoints(&self, ev: &ConfigEvent) {
        let cfg = ev.config();
        let (namespace, name) = (cfg.namespace(), cfg.name());
        let hostname = service_hostname(name, namespace, &self.domain_suffix);

        let mirrored = self.mirrored_service(namespace, &hostname);
        let base = mirrored.clone().or_else(|| {
            self.source
                .get(&GroupVersionKind::SERVICE, namespace, name)?
                .spec
                .as_kube_service()
                .map(|svc| convert_service(svc, &self.domain_suffix))
        });
        let Some(mut service) = base else {
            debug!(namespace, name, "no service for endpoints yet");
            return;
        };

        let old_keys: HashSet<String> = match ev {
            ConfigEvent::Update { old, .. } | ConfigEvent::Delete(old) => old
                .spec
                .as_endpoints()
                .map(|e| endpoint_keys(name, e))
                .unwrap_or_default()
                .into_iter()
                .collect(),
            ConfigEvent::Add(_) => service.endpoints.iter().map(IstioEndpoint::key).collect(),
        };

        let new_endpoints = match (ev, cfg.spec.as_endpoints()) {
            (ConfigEvent::Delete(_), _) => Vec::new(),
            (_, Some(endpoints)) => {
                let index = StoreIndex::new(self.source.as_ref());
                match convert_endpoints(&service, endpoints, &index, &self.retry) {
                    Ok(eps) => eps,
                    Err(err) => {
                        if let Some(what) = join_target(&err) {
                            self.metrics.join_timeout(what);
                        }
                        warn!(namespace, name, error = %err, "endpoints conversion failed");
                        return;
                    }
                }
            }
            (_, None) => {
                warn!(key = %cfg.meta.key(), variant = cfg.spec.variant(), "unexpected Endpoints payload");
                return;
            }
        };
        let new_keys: HashSet<String> = new_endpoints.iter().map(IstioEndpoint::key).collect();

        for key in old_keys.difference(&new_keys) {
            self.remove(&GroupVersionKind::ISTIO_ENDPOINT, namespace, key);
            service.remove_endpoint(key);
        }
        for ep in new_endpoints {
            self.put(endpoint_config(ep.clone()));
            let key = ep.key();
            match service.endpoints.iter_mut().find(|e| e.key() == key) {
                Some(slot) => *slot = ep,
                None => service.endpoints.push(ep),
            }
        }
        trace!(service = %hostname, endpoints = service.endpoints.len(), "re-persisting service");
        self.put(service_config(service));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;
    use meshcfg_core::Schemas;
    use meshcfg_store::{MemoryStore, SourceKind};

    fn pod(name: &str, ip: &str) -> Pod {
        Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                pod_ip: Some(ip.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_store_index_finds_pod_by_ip() {
        let store = MemoryStore::new(Schemas::kube());
        let meta = ConfigMeta::new(GroupVersionKind::POD, "default", "p1");
        meshcfg_store::ConfigStore::create(&store, Config::new(meta, Spec::Pod(pod("p1", "10.0.0.9")))).unwrap();

        let index = StoreIndex::new(&store);
        assert!(index.pod_by_ip("default", "10.0.0.9").is_some());
        assert!(index.pod_by_ip("default", "10.0.0.10").is_none());
        assert!(index.pod_by_ip("other", "10.0.0.9").is_none());
        assert!(index.pod_by_ip("", "10.0.0.9").is_none());
        assert!(index.pod("default", "p1").is_some());
        assert!(index.pod("other", "p1").is_none());
        assert!(index.endpoints("default", "p1").is_none());
    }

    #[test]
    fn test_canonical_names() {
        let ep = IstioEndpoint {
            address: "10.0.0.1".to_string(),
            endpoint_port: 80,
            service_port_name: "http".to_string(),
            service_name: "se1".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };
        let cfg = endpoint_config(ep);
        assert_eq!(cfg.name(), "se1/http/10.0.0.1:80");
        assert_eq!(cfg.gvk(), &GroupVersionKind::ISTIO_ENDPOINT);

        let svc = Service {
            hostname: "a.com".to_string(),
            ..Default::default()
        };
        assert_eq!(service_config(svc).name(), "a.com");
        assert_eq!(fact_key("team-a", "a.com"), "team-a/a.com");
        assert_ne!(fact_key("team-a", "a.com"), fact_key("team-b", "a.com"));
    }

    #[test]
    fn test_join_target() {
        let pod = ConfigError::JoinTimeout {
            what: "pod 10.0.0.1".to_string(),
            attempts: 100,
        };
        let eps = ConfigError::JoinTimeout {
            what: "endpoints default/reviews".to_string(),
            attempts: 100,
        };
        assert_eq!(join_target(&pod), Some("pod"));
        assert_eq!(join_target(&eps), Some("endpoints"));
        assert_eq!(join_target(&ConfigError::Shutdown), None);
    }

    #[test]
    fn test_service_entry_from_json_payload() {
        let meta = ConfigMeta::new(GroupVersionKind::SERVICE_ENTRY, "default", "se1");
        let cfg = Config::new(meta, Spec::Json(serde_json::json!({ "hosts": ["a.com", "b.com"] })));
        let se = service_entry_spec(&cfg).unwrap();
        assert_eq!(se.hosts.len(), 2);

        let bad = Config::new(
            ConfigMeta::new(GroupVersionKind::SERVICE_ENTRY, "default", "se2"),
            Spec::Json(serde_json::json!({ "hosts": 1 })),
        );
        assert!(service_entry_spec(&bad).is_none());
    }

    #[tokio::test]
    async fn test_register_follows_source_schema() {
        let builtin = Arc::new(MonitorController::in_memory(SourceKind::Builtin, Schemas::builtin()));
        let kube = Arc::new(MonitorController::in_memory(SourceKind::Kubernetes, Schemas::kube()));
        let xds = Arc::new(MonitorController::in_memory(SourceKind::Xds, Schemas::mesh()));

        let pipeline = |source: &Arc<MonitorController>| {
            Arc::new(TranslationPipeline::new(
                Arc::clone(source),
                Arc::clone(&builtin),
                Handle::current(),
                JoinRetry::default(),
                "cluster.local",
                SubscribableMap::new(),
            ))
        };
        assert_eq!(pipeline(&kube).register().unwrap(), 3);
        assert_eq!(pipeline(&xds).register().unwrap(), 1);
        assert_eq!(kube.monitor().handler_count(&GroupVersionKind::ENDPOINTS), 1);
    }
}
