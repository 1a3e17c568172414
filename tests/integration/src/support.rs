//! Shared fixtures.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Pod, PodStatus, Service as KubeService,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use meshcfg_core::{Config, ConfigEvent, ConfigMeta, Event, GroupVersionKind, Spec};
use meshcfg_store::EventHandler;
use parking_lot::Mutex;

pub const NAMESPACE: &str = "default";

/// Route `tracing` output through the test harness. `RUST_LOG` selects the
/// level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records `(event, name)` for every delivered event.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<(Event, String)>>>,
}

impl Recorder {
    pub fn handler(&self) -> EventHandler {
        let seen = Arc::clone(&self.seen);
        Arc::new(move |ev: &ConfigEvent| {
            seen.lock().push((ev.event(), ev.config().name().to_string()));
        })
    }

    pub fn events(&self) -> Vec<(Event, String)> {
        self.seen.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Wait until at least `n` events were recorded.
    pub async fn wait_for(&self, n: usize) -> Vec<(Event, String)> {
        wait_until(|| self.len() >= n).await;
        self.events()
    }
}

/// Poll `cond` for up to two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(cond(), "condition not met in time");
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        ..Default::default()
    }
}

pub fn pod_config(name: &str, ip: &str) -> Config {
    pod_config_in(NAMESPACE, name, ip, "reviews")
}

pub fn pod_config_in(namespace: &str, name: &str, ip: &str, app: &str) -> Config {
    let pod = Pod {
        metadata: ObjectMeta {
            labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            namespace: Some(namespace.to_string()),
            ..meta(name)
        },
        status: Some(PodStatus {
            pod_ip: Some(ip.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    Config::new(ConfigMeta::new(GroupVersionKind::POD, namespace, name), Spec::Pod(pod))
}

pub fn endpoints_config(service: &str, ips: &[&str]) -> Config {
    let endpoints = Endpoints {
        metadata: meta(service),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                ips.iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ports: Some(vec![EndpointPort {
                name: Some("http".to_string()),
                port: 9080,
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    };
    Config::new(
        ConfigMeta::new(GroupVersionKind::ENDPOINTS, NAMESPACE, service),
        Spec::Endpoints(endpoints),
    )
}

pub fn service_config(name: &str, cluster_ip: &str) -> Config {
    let svc = KubeService {
        metadata: meta(name),
        spec: Some(ServiceSpec {
            cluster_ip: Some(cluster_ip.to_string()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 9080,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    Config::new(
        ConfigMeta::new(GroupVersionKind::SERVICE, NAMESPACE, name),
        Spec::KubeService(svc),
    )
}

/// The canonical endpoint name of `ip` on the `http` port of `service`.
pub fn endpoint_name(service: &str, ip: &str) -> String {
    format!("{service}/http/{ip}:9080")
}
