//! Kubernetes `Service` / `Endpoints` / `Pod` conversion.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EndpointAddress, Endpoints, Pod, Service as KubeService};
use meshcfg_core::Result;
use meshcfg_types::model::endpoint_key;
use meshcfg_types::{IstioEndpoint, Port, Registry, Resolution, Service, ServiceAttributes, UNSPECIFIED_IP};
use tracing::trace;

use crate::protocol::infer_protocol;
use crate::retry::JoinRetry;

/// Annotation listing the namespaces a service is exported to.
pub const EXPORT_TO_ANNOTATION: &str = "networking.istio.io/exportTo";

const CLUSTER_IP_NONE: &str = "None";
const POD_KIND: &str = "Pod";
const EXTERNAL_NAME: &str = "ExternalName";

/// Access to the cluster objects conversion depends on.
pub trait KubeIndex {
    /// The `Endpoints` object named like its service.
    fn endpoints(&self, namespace: &str, name: &str) -> Option<Endpoints>;

    /// The pod `namespace/name`.
    fn pod(&self, namespace: &str, name: &str) -> Option<Pod>;

    /// A pod in `namespace` whose IP is `ip`.
    fn pod_by_ip(&self, namespace: &str, ip: &str) -> Option<Pod>;
}

/// `name.namespace.svc.<domain_suffix>`.
pub fn service_hostname(name: &str, namespace: &str, domain_suffix: &str) -> String {
    format!("{name}.{namespace}.svc.{domain_suffix}")
}

fn name_and_namespace(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> (String, String) {
    (
        meta.name.clone().unwrap_or_default(),
        meta.namespace.clone().unwrap_or_default(),
    )
}

/// Convert a Kubernetes service, without endpoints.
///
/// The address is [`UNSPECIFIED_IP`] unless a real cluster IP is assigned.
/// Headless and `ExternalName` services carry no label selector.
pub fn convert_service(svc: &KubeService, domain_suffix: &str) -> Service {
    let (name, namespace) = name_and_namespace(&svc.metadata);
    let spec = svc.spec.clone().unwrap_or_default();

    let cluster_ip = spec
        .cluster_ip
        .as_deref()
        .filter(|ip| !ip.is_empty() && *ip != CLUSTER_IP_NONE);
    let headless = spec.cluster_ip.as_deref() == Some(CLUSTER_IP_NONE);
    let external_name = spec.type_.as_deref() == Some(EXTERNAL_NAME);

    let resolution = if external_name {
        Resolution::DnsLb
    } else if headless {
        Resolution::Passthrough
    } else {
        Resolution::ClientSideLb
    };

    let ports = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| {
            let name = p.name.unwrap_or_default();
            let number = u32::try_from(p.port).unwrap_or_default();
            Port {
                protocol: infer_protocol(p.protocol.as_deref(), p.app_protocol.as_deref(), &name, number),
                name,
                port: number,
            }
        })
        .collect();

    let annotations: BTreeMap<String, String> = svc.metadata.annotations.clone().unwrap_or_default();
    let export_to = annotations
        .get(EXPORT_TO_ANNOTATION)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let label_selectors = if headless || external_name {
        BTreeMap::new()
    } else {
        spec.selector.unwrap_or_default()
    };

    Service {
        hostname: service_hostname(&name, &namespace, domain_suffix),
        ports,
        addresses: vec![cluster_ip.unwrap_or(UNSPECIFIED_IP).to_string()],
        attributes: ServiceAttributes {
            service_registry: Registry::Kubernetes,
            name,
            namespace,
            labels: svc.metadata.labels.clone().unwrap_or_default(),
            annotations,
            label_selectors,
            export_to,
        },
        endpoints: Vec::new(),
        resolution,
        mesh_external: external_name,
    }
}

/// Keys of every endpoint `endpoints` implies for service `service_name`.
///
/// Needs no pod lookups, so it also works for objects whose pods are gone.
pub fn endpoint_keys(service_name: &str, endpoints: &Endpoints) -> Vec<String> {
    let mut keys = Vec::new();
    for subset in endpoints.subsets.iter().flatten() {
        let ports = subset.ports.as_deref().unwrap_or_default();
        for address in subset.addresses.iter().flatten() {
            for port in ports {
                keys.push(endpoint_key(
                    service_name,
                    port.name.as_deref().unwrap_or_default(),
                    &address.ip,
                    u32::try_from(port.port).unwrap_or_default(),
                ));
            }
        }
    }
    keys
}

/// Look up the pod behind `address`, waiting for it with `retry`.
///
/// A pod `targetRef` names the pod directly. Without one the address is
/// matched by IP among pods of `namespace` only; host-network pods share
/// their node's IP, so an IP match is ambiguous across namespaces.
fn join_pod(
    address: &EndpointAddress,
    namespace: &str,
    index: &dyn KubeIndex,
    retry: &JoinRetry,
) -> Result<Pod> {
    let target = address
        .target_ref
        .as_ref()
        .filter(|r| r.kind.as_deref() == Some(POD_KIND))
        .and_then(|r| Some((r.namespace.as_deref().unwrap_or(namespace), r.name.as_deref()?)));
    match target {
        Some((pod_namespace, pod_name)) => retry.join(&format!("pod {pod_namespace}/{pod_name}"), || {
            index.pod(pod_namespace, pod_name)
        }),
        None => retry.join(&format!("pod {} in {namespace}", address.ip), || {
            index.pod_by_ip(namespace, &address.ip)
        }),
    }
}

/// Convert the ready addresses of `endpoints` into endpoints of `service`.
///
/// Each address is joined with its pod through `retry`; labels and service
/// account come from the pod.
///
/// # Errors
///
/// [`ConfigError::JoinTimeout`](meshcfg_core::ConfigError::JoinTimeout) if a
/// pod never shows up.
pub fn convert_endpoints(
    service: &Service,
    endpoints: &Endpoints,
    index: &dyn KubeIndex,
    retry: &JoinRetry,
) -> Result<Vec<IstioEndpoint>> {
    let namespace = endpoints
        .metadata
        .namespace
        .as_deref()
        .unwrap_or(&service.attributes.namespace);
    let mut out = Vec::new();
    for subset in endpoints.subsets.iter().flatten() {
        let ports = subset.ports.as_deref().unwrap_or_default();
        for address in subset.addresses.iter().flatten() {
            let pod = join_pod(address, namespace, index, retry)?;
            let labels = pod.metadata.labels.clone().unwrap_or_default();
            let service_account = pod
                .spec
                .as_ref()
                .and_then(|s| s.service_account_name.clone())
                .unwrap_or_default();

            for port in ports {
                out.push(IstioEndpoint {
                    address: address.ip.clone(),
                    endpoint_port: u32::try_from(port.port).unwrap_or_default(),
                    service_port_name: port.name.clone().unwrap_or_default(),
                    service_name: service.attributes.name.clone(),
                    namespace: service.attributes.namespace.clone(),
                    hostnames: vec![service.hostname.clone()],
                    labels: labels.clone(),
                    service_account: service_account.clone(),
                    ..Default::default()
                });
            }
        }
    }
    trace!(service = %service.hostname, count = out.len(), "converted endpoints");
    Ok(out)
}

/// Convert a Kubernetes service together with its endpoints.
///
/// The `Endpoints` object is looked up through `index` under the service's
/// own name, waiting for it with `retry`.
///
/// # Errors
///
/// [`ConfigError::JoinTimeout`](meshcfg_core::ConfigError::JoinTimeout) if the
/// `Endpoints` object or a pod never shows up.
pub fn convert_kube_service(
    svc: &KubeService,
    index: &dyn KubeIndex,
    retry: &JoinRetry,
    domain_suffix: &str,
) -> Result<Service> {
    let mut service = convert_service(svc, domain_suffix);
    let (name, namespace) = (&service.attributes.name, &service.attributes.namespace);
    let endpoints = retry.join(&format!("endpoints {namespace}/{name}"), || {
        index.endpoints(namespace, name)
    })?;
    service.endpoints = convert_endpoints(&service, &endpoints, index, retry)?;
    Ok(service)
}
