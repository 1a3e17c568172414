//! `networking.istio.io` ServiceEntry spec.
//!
//! Field names follow the Kubernetes JSON representation so a spec can be
//! read straight out of a custom resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Marker prefix for UNIX domain socket endpoint addresses.
pub const UNIX_ADDRESS_PREFIX: &str = "unix://";

/// Spec of a `ServiceEntry`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceEntrySpec {
    /// Hosts the entry declares; one canonical service per host.
    pub hosts: Vec<String>,
    /// Virtual addresses.
    pub addresses: Vec<String>,
    /// Ports.
    pub ports: Vec<ServicePort>,
    /// Inside or outside the mesh.
    pub location: Location,
    /// Endpoint resolution mode.
    pub resolution: ServiceEntryResolution,
    /// Explicit workload endpoints.
    pub endpoints: Vec<WorkloadEntry>,
    /// Selects workloads by label instead of listing endpoints.
    pub workload_selector: Option<WorkloadSelector>,
    /// Namespaces the entry is visible to.
    pub export_to: Vec<String>,
    /// Subject alternative names for mTLS verification.
    pub subject_alt_names: Vec<String>,
}

/// A port declared by a `ServiceEntry`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicePort {
    /// Port number.
    pub number: u32,
    /// Declared protocol.
    pub protocol: String,
    /// Port name.
    pub name: String,
    /// Port on the endpoints, 0 when unset.
    pub target_port: u32,
}

/// Mesh location of a `ServiceEntry`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    /// Outside the mesh.
    #[default]
    MeshExternal,
    /// Part of the mesh.
    MeshInternal,
}

/// Resolution of a `ServiceEntry`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceEntryResolution {
    /// Passthrough to the original destination.
    #[default]
    None,
    /// Use the listed endpoints.
    Static,
    /// Resolve endpoints through DNS.
    Dns,
    /// Resolve through DNS, round robin over the first address.
    DnsRoundRobin,
}

/// A workload endpoint listed in a `ServiceEntry`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadEntry {
    /// IP, hostname, or `unix://` socket path.
    pub address: String,
    /// Port-name to port-number mapping for this workload.
    pub ports: BTreeMap<String, u32>,
    /// Workload labels.
    pub labels: BTreeMap<String, String>,
    /// Network name.
    pub network: String,
    /// Locality.
    pub locality: String,
    /// Load-balancing weight.
    pub weight: u32,
    /// Service account.
    pub service_account: String,
}

impl WorkloadEntry {
    /// Whether the address is a UNIX domain socket.
    pub fn is_unix_socket(&self) -> bool {
        self.address.starts_with(UNIX_ADDRESS_PREFIX)
    }
}

/// Label selector for workloads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSelector {
    /// Labels a workload must carry.
    pub labels: BTreeMap<String, String>,
}
