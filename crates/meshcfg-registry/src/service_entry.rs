//! `ServiceEntry` conversion.
//!
//! A `ServiceEntry` declares one or more hosts sharing a port list and a set
//! of workload endpoints. Each host becomes its own canonical service and
//! every one of them carries the same endpoint list.

use meshcfg_core::ConfigMeta;
use meshcfg_types::networking::UNIX_ADDRESS_PREFIX;
use meshcfg_types::{
    IstioEndpoint, Location, Port, Registry, Resolution, Service, ServiceAttributes,
    ServiceEntryResolution, ServiceEntrySpec, ServicePort, WorkloadEntry, UNSPECIFIED_IP,
};
use tracing::debug;

use crate::protocol::service_entry_protocol;

fn resolution(se: &ServiceEntrySpec) -> Resolution {
    match se.resolution {
        ServiceEntryResolution::None => Resolution::Passthrough,
        ServiceEntryResolution::Static => Resolution::ClientSideLb,
        ServiceEntryResolution::Dns | ServiceEntryResolution::DnsRoundRobin => Resolution::DnsLb,
    }
}

/// Port of `workload` serving `port`: the explicit target port, else the
/// workload's port of the same name, else the service port number.
fn endpoint_port(port: &ServicePort, workload: &WorkloadEntry) -> u32 {
    if port.target_port != 0 {
        return port.target_port;
    }
    workload.ports.get(&port.name).copied().unwrap_or(port.number)
}

/// Endpoints declared by a `ServiceEntry`, one per workload and port.
///
/// UNIX socket addresses lose their `unix://` prefix and get port 0. A
/// `ServiceEntry` that selects workloads by label instead of listing them
/// yields no endpoints.
pub fn service_entry_endpoints(meta: &ConfigMeta, se: &ServiceEntrySpec) -> Vec<IstioEndpoint> {
    if se.endpoints.is_empty() {
        if se.workload_selector.is_some() {
            debug!(namespace = %meta.namespace, name = %meta.name, "workload selector endpoints are not resolved");
        }
        return Vec::new();
    }

    let mut out = Vec::with_capacity(se.endpoints.len() * se.ports.len());
    for workload in &se.endpoints {
        let unix = workload.is_unix_socket();
        let address = workload
            .address
            .strip_prefix(UNIX_ADDRESS_PREFIX)
            .unwrap_or(&workload.address);
        for port in &se.ports {
            out.push(IstioEndpoint {
                address: address.to_string(),
                endpoint_port: if unix { 0 } else { endpoint_port(port, workload) },
                service_port_name: port.name.clone(),
                service_name: meta.name.clone(),
                namespace: meta.namespace.clone(),
                hostnames: se.hosts.clone(),
                labels: workload.labels.clone(),
                network: workload.network.clone(),
                locality: workload.locality.clone(),
                service_account: workload.service_account.clone(),
                lb_weight: workload.weight,
            });
        }
    }
    out
}

/// Canonical services declared by a `ServiceEntry`, one per host, each
/// carrying the full endpoint list.
pub fn convert_service_entry(meta: &ConfigMeta, se: &ServiceEntrySpec) -> Vec<Service> {
    let ports: Vec<Port> = se
        .ports
        .iter()
        .map(|p| Port {
            name: p.name.clone(),
            port: p.number,
            protocol: service_entry_protocol(&p.protocol, &p.name, p.number),
        })
        .collect();

    let addresses = if se.addresses.is_empty() {
        vec![UNSPECIFIED_IP.to_string()]
    } else {
        se.addresses.clone()
    };

    let attributes = ServiceAttributes {
        service_registry: Registry::External,
        name: meta.name.clone(),
        namespace: meta.namespace.clone(),
        labels: meta.labels.clone(),
        annotations: meta.annotations.clone(),
        label_selectors: se
            .workload_selector
            .as_ref()
            .map(|s| s.labels.clone())
            .unwrap_or_default(),
        export_to: se.export_to.clone(),
    };

    let endpoints = service_entry_endpoints(meta, se);
    se.hosts
        .iter()
        .map(|host| Service {
            hostname: host.clone(),
            ports: ports.clone(),
            addresses: addresses.clone(),
            attributes: attributes.clone(),
            endpoints: endpoints.clone(),
            resolution: resolution(se),
            mesh_external: se.location == Location::MeshExternal,
        })
        .collect()
}
