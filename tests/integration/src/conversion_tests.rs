//! Registry conversion over stored objects.

use k8s_openapi::api::core::v1::Service as KubeService;
use meshcfg_controller::StoreIndex;
use meshcfg_core::{ConfigError, ConfigMeta, GroupVersionKind, Schemas};
use meshcfg_registry::{convert_kube_service, convert_service_entry, infer_protocol, JoinRetry};
use meshcfg_store::{ConfigStore, MemoryStore};
use meshcfg_types::{Protocol, Registry, Resolution, ServiceEntrySpec, ServicePort, WorkloadEntry};

use crate::support::{endpoints_config, pod_config, pod_config_in, service_config, NAMESPACE};

fn kube_service(store: &MemoryStore) -> KubeService {
    let cfg = service_config("reviews", "10.96.0.10");
    store.create(cfg.clone()).unwrap();
    cfg.spec.as_kube_service().cloned().unwrap()
}

#[test]
fn kube_service_joins_stored_endpoints_and_pods() {
    let store = MemoryStore::new(Schemas::kube());
    store.create(pod_config("reviews-1", "10.0.0.1")).unwrap();
    store.create(pod_config("reviews-2", "10.0.0.2")).unwrap();
    store
        .create(endpoints_config("reviews", &["10.0.0.1", "10.0.0.2"]))
        .unwrap();
    let svc = kube_service(&store);

    let index = StoreIndex::new(&store);
    let service = convert_kube_service(&svc, &index, &JoinRetry::once(), "cluster.local").unwrap();

    assert_eq!(service.hostname, "reviews.default.svc.cluster.local");
    assert_eq!(service.addresses, vec!["10.96.0.10".to_string()]);
    assert_eq!(service.attributes.service_registry, Registry::Kubernetes);
    assert_eq!(service.attributes.namespace, NAMESPACE);
    assert_eq!(service.resolution, Resolution::ClientSideLb);
    assert_eq!(service.port_by_name("http").map(|p| p.protocol), Some(Protocol::Http));

    let mut addresses: Vec<_> = service.endpoints.iter().map(|e| e.address.as_str()).collect();
    addresses.sort_unstable();
    assert_eq!(addresses, ["10.0.0.1", "10.0.0.2"]);
    assert!(service
        .endpoints
        .iter()
        .all(|e| e.labels.get("app").map(String::as_str) == Some("reviews")));
}

#[test]
fn pods_sharing_an_ip_in_other_namespaces_are_ignored() {
    let store = MemoryStore::new(Schemas::kube());
    store
        .create(pod_config_in("kube-system", "node-agent", "10.0.0.1", "node-agent"))
        .unwrap();
    store.create(pod_config("reviews-1", "10.0.0.1")).unwrap();
    store.create(endpoints_config("reviews", &["10.0.0.1"])).unwrap();
    let svc = kube_service(&store);

    let service = convert_kube_service(&svc, &StoreIndex::new(&store), &JoinRetry::once(), "cluster.local").unwrap();
    assert_eq!(service.endpoints.len(), 1);
    assert_eq!(service.endpoints[0].labels.get("app").map(String::as_str), Some("reviews"));
}

#[test]
fn missing_pod_times_out() {
    let store = MemoryStore::new(Schemas::kube());
    store.create(endpoints_config("reviews", &["10.0.0.1"])).unwrap();
    let svc = kube_service(&store);

    let retry = JoinRetry {
        attempts: 3,
        pause_ms: 0,
    };
    let err = convert_kube_service(&svc, &StoreIndex::new(&store), &retry, "cluster.local").unwrap_err();
    match err {
        ConfigError::JoinTimeout { what, attempts } => {
            assert!(what.starts_with("pod"));
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn service_entry_yields_one_service_per_host() {
    let meta = ConfigMeta::new(GroupVersionKind::SERVICE_ENTRY, NAMESPACE, "external");
    let se = ServiceEntrySpec {
        hosts: vec!["a.com".to_string(), "b.com".to_string()],
        ports: vec![
            ServicePort {
                number: 443,
                name: "tls".to_string(),
                protocol: "TLS".to_string(),
                ..Default::default()
            },
            ServicePort {
                number: 53,
                name: "dns".to_string(),
                protocol: "UDP".to_string(),
                ..Default::default()
            },
        ],
        endpoints: vec![
            WorkloadEntry {
                address: "1.1.1.1".to_string(),
                ..Default::default()
            },
            WorkloadEntry {
                address: "2.2.2.2".to_string(),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let services = convert_service_entry(&meta, &se);
    assert_eq!(services.len(), 2);
    for (service, host) in services.iter().zip(["a.com", "b.com"]) {
        assert_eq!(service.hostname, host);
        assert_eq!(service.attributes.service_registry, Registry::External);
        assert!(!service.has_address());
        // Two workloads times two ports.
        assert_eq!(service.endpoints.len(), 4);
        assert_eq!(service.port_by_name("tls").map(|p| p.protocol), Some(Protocol::Tls));
        assert_eq!(service.port_by_name("dns").map(|p| p.protocol), Some(Protocol::Udp));
    }
    assert_eq!(services[0].endpoints, services[1].endpoints);
}

#[test]
fn declared_udp_beats_every_other_hint() {
    assert_eq!(infer_protocol(Some("UDP"), Some("http"), "grpc-api", 80), Protocol::Udp);
    assert_eq!(infer_protocol(Some("TCP"), Some("http"), "grpc-api", 80), Protocol::Http);
    assert_eq!(infer_protocol(Some("TCP"), None, "grpc-api", 80), Protocol::Grpc);
    assert_eq!(infer_protocol(Some("TCP"), None, "metrics", 27017), Protocol::Tcp);
}
