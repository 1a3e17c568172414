//! Translation pipeline: registry objects mirrored into the built-in
//! controller.

use std::sync::Arc;

use meshcfg_controller::{fact_key, ConfigController, ControllerConfig};
use meshcfg_core::{Config, ConfigMeta, Event, GroupVersionKind};
use meshcfg_registry::JoinRetry;
use meshcfg_store::{ConfigReader, MonitorController, SourceKind, StopHandle};
use meshcfg_types::{Service, ServiceEntrySpec, ServicePort, WorkloadEntry};

use crate::support::{
    endpoint_name, endpoints_config, init_tracing, pod_config, service_config, wait_until, Recorder,
    NAMESPACE,
};

const HOSTNAME: &str = "reviews.default.svc.cluster.local";

struct Harness {
    controller: ConfigController,
    kube: Arc<MonitorController>,
    endpoints: Recorder,
    stop: StopHandle,
}

impl Harness {
    fn start(retry: JoinRetry) -> Self {
        init_tracing();
        let config = ControllerConfig::builder()
            .source("k8s://")
            .translate_services(true)
            .join_retry(retry)
            .build()
            .unwrap();
        let controller = ConfigController::new(config).unwrap();
        let endpoints = Recorder::default();
        controller
            .register_event_handler(&GroupVersionKind::ISTIO_ENDPOINT, endpoints.handler())
            .unwrap();

        let stop = StopHandle::new();
        controller.start_monitors(stop.signal()).unwrap();
        let kube = Arc::clone(controller.controller(SourceKind::Kubernetes).unwrap());
        Self {
            controller,
            kube,
            endpoints,
            stop,
        }
    }

    /// Wait until the source monitor has handled `n` events.
    async fn settle(&self, n: u64) {
        let stats = self.kube.monitor().stats();
        wait_until(|| stats.delivered() >= n).await;
    }

    fn mirrored(&self, namespace: &str, hostname: &str) -> Option<Service> {
        self.controller
            .builtin()
            .get(&GroupVersionKind::ISTIO_SERVICE, namespace, hostname)?
            .spec
            .as_mesh_service()
            .cloned()
    }

    fn mirrored_addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .mirrored(NAMESPACE, HOSTNAME)
            .map(|s| s.endpoints.into_iter().map(|e| e.address).collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn endpoints_update_replaces_mirrored_endpoints() {
    let h = Harness::start(JoinRetry::default());

    h.kube.create(pod_config("reviews-1", "10.0.0.1")).await.unwrap();
    h.kube.create(pod_config("reviews-2", "10.0.0.2")).await.unwrap();
    h.kube.create(endpoints_config("reviews", &["10.0.0.1"])).await.unwrap();
    h.kube.create(service_config("reviews", "10.96.0.10")).await.unwrap();
    h.settle(4).await;

    h.endpoints.wait_for(1).await;
    assert_eq!(h.mirrored_addresses(), ["10.0.0.1"]);

    h.kube.update(endpoints_config("reviews", &["10.0.0.2"])).await.unwrap();
    h.settle(5).await;

    let events = h.endpoints.wait_for(3).await;
    assert_eq!(
        events,
        vec![
            (Event::Add, endpoint_name("reviews", "10.0.0.1")),
            (Event::Delete, endpoint_name("reviews", "10.0.0.1")),
            (Event::Add, endpoint_name("reviews", "10.0.0.2")),
        ]
    );
    assert_eq!(h.mirrored_addresses(), ["10.0.0.2"]);

    let key = fact_key(NAMESPACE, HOSTNAME);
    wait_until(|| {
        h.controller
            .shared_facts()
            .get(&key)
            .is_some_and(|s| s.endpoints.len() == 1 && s.endpoints[0].address == "10.0.0.2")
    })
    .await;
    let facts = h.controller.shared_facts().get(&key).unwrap();
    assert_eq!(facts.endpoints.len(), 1);
    assert_eq!(facts.endpoints[0].address, "10.0.0.2");

    let stored = h
        .controller
        .builtin()
        .list(Some(&GroupVersionKind::ISTIO_ENDPOINT), NAMESPACE)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name(), endpoint_name("reviews", "10.0.0.2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_service_removes_mirror() {
    let h = Harness::start(JoinRetry::default());

    h.kube.create(pod_config("reviews-1", "10.0.0.1")).await.unwrap();
    h.kube.create(endpoints_config("reviews", &["10.0.0.1"])).await.unwrap();
    h.kube.create(service_config("reviews", "10.96.0.10")).await.unwrap();
    h.settle(3).await;
    wait_until(|| h.mirrored(NAMESPACE, HOSTNAME).is_some()).await;

    h.kube.delete(&GroupVersionKind::SERVICE, NAMESPACE, "reviews").await.unwrap();
    h.settle(4).await;

    wait_until(|| h.mirrored(NAMESPACE, HOSTNAME).is_none()).await;
    let events = h.endpoints.wait_for(2).await;
    assert_eq!(events.last(), Some(&(Event::Delete, endpoint_name("reviews", "10.0.0.1"))));
    let key = fact_key(NAMESPACE, HOSTNAME);
    wait_until(|| h.controller.shared_facts().get(&key).is_none()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_without_endpoints_is_mirrored_degraded() {
    let h = Harness::start(JoinRetry {
        attempts: 2,
        pause_ms: 0,
    });

    h.kube.create(service_config("reviews", "10.96.0.10")).await.unwrap();
    h.settle(1).await;

    wait_until(|| h.mirrored(NAMESPACE, HOSTNAME).is_some()).await;
    let service = h.mirrored(NAMESPACE, HOSTNAME).unwrap();
    assert!(service.endpoints.is_empty());
    assert_eq!(service.addresses, vec!["10.96.0.10".to_string()]);
    assert_eq!(h.endpoints.len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_entry_is_mirrored_per_host() {
    let h = Harness::start(JoinRetry::default());
    let se = |addresses: &[&str]| {
        let spec = ServiceEntrySpec {
            hosts: vec!["a.com".to_string()],
            ports: vec![ServicePort {
                number: 80,
                name: "http".to_string(),
                protocol: "HTTP".to_string(),
                ..Default::default()
            }],
            endpoints: addresses
                .iter()
                .map(|a| WorkloadEntry {
                    address: a.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        Config::new(ConfigMeta::new(GroupVersionKind::SERVICE_ENTRY, NAMESPACE, "se1"), spec)
    };

    h.kube.create(se(&["1.1.1.1"])).await.unwrap();
    h.settle(1).await;
    wait_until(|| h.mirrored(NAMESPACE, "a.com").is_some()).await;
    assert_eq!(
        h.endpoints.wait_for(1).await,
        vec![(Event::Add, "se1/http/1.1.1.1:80".to_string())]
    );

    h.kube.update(se(&["2.2.2.2"])).await.unwrap();
    h.settle(2).await;
    let events = h.endpoints.wait_for(3).await;
    assert_eq!(events[1], (Event::Delete, "se1/http/1.1.1.1:80".to_string()));
    assert_eq!(events[2], (Event::Add, "se1/http/2.2.2.2:80".to_string()));
    let service = h.mirrored(NAMESPACE, "a.com").unwrap();
    assert_eq!(service.endpoints[0].address, "2.2.2.2");

    h.kube.delete(&GroupVersionKind::SERVICE_ENTRY, NAMESPACE, "se1").await.unwrap();
    h.settle(3).await;
    wait_until(|| h.mirrored(NAMESPACE, "a.com").is_none()).await;
    assert_eq!(h.endpoints.wait_for(4).await[3].0, Event::Delete);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_host_in_two_namespaces_keeps_two_facts() {
    let h = Harness::start(JoinRetry::default());
    let se = |namespace: &str, address: &str| {
        let spec = ServiceEntrySpec {
            hosts: vec!["shared.example.com".to_string()],
            ports: vec![ServicePort {
                number: 443,
                name: "https".to_string(),
                protocol: "HTTPS".to_string(),
                ..Default::default()
            }],
            endpoints: vec![WorkloadEntry {
                address: address.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        Config::new(ConfigMeta::new(GroupVersionKind::SERVICE_ENTRY, namespace, "shared"), spec)
    };
    let facts = h.controller.shared_facts().clone();
    let key_a = fact_key("team-a", "shared.example.com");
    let key_b = fact_key("team-b", "shared.example.com");

    h.kube.create(se("team-a", "1.1.1.1")).await.unwrap();
    h.kube.create(se("team-b", "2.2.2.2")).await.unwrap();
    h.settle(2).await;
    wait_until(|| facts.get(&key_a).is_some() && facts.get(&key_b).is_some()).await;
    assert_eq!(facts.get(&key_a).unwrap().endpoints[0].address, "1.1.1.1");
    assert_eq!(facts.get(&key_b).unwrap().endpoints[0].address, "2.2.2.2");

    h.kube.delete(&GroupVersionKind::SERVICE_ENTRY, "team-a", "shared").await.unwrap();
    h.settle(3).await;
    wait_until(|| facts.get(&key_a).is_none()).await;
    let remaining = facts.get(&key_b).unwrap();
    assert_eq!(remaining.attributes.namespace, "team-b");
    assert_eq!(remaining.endpoints[0].address, "2.2.2.2");
}
