//! Canonical mesh model.
//!
//! These types are what the config plane pushes across the protocol
//! boundary, independent of which registry a service came from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Address used when a service has no routable virtual IP.
pub const UNSPECIFIED_IP: &str = "0.0.0.0";

/// Application protocol of a service port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// HTTP/1.1.
    #[serde(rename = "HTTP")]
    Http,
    /// HTTP/2.
    #[serde(rename = "HTTP2")]
    Http2,
    /// HTTP CONNECT proxying.
    #[serde(rename = "HTTP_PROXY")]
    HttpProxy,
    /// gRPC.
    #[serde(rename = "GRPC")]
    Grpc,
    /// gRPC-Web.
    #[serde(rename = "GRPC-Web")]
    GrpcWeb,
    /// HTTPS.
    #[serde(rename = "HTTPS")]
    Https,
    /// Opaque TLS.
    #[serde(rename = "TLS")]
    Tls,
    /// Opaque TCP.
    #[serde(rename = "TCP")]
    Tcp,
    /// UDP.
    #[serde(rename = "UDP")]
    Udp,
    /// MongoDB wire protocol.
    #[serde(rename = "Mongo")]
    Mongo,
    /// Redis.
    #[serde(rename = "Redis")]
    Redis,
    /// MySQL.
    #[serde(rename = "MySQL")]
    Mysql,
    /// Thrift.
    #[serde(rename = "Thrift")]
    Thrift,
    /// Could not be determined.
    #[serde(rename = "UnsupportedProtocol")]
    Unsupported,
}

impl Protocol {
    /// Parse a protocol name, case-insensitively.
    ///
    /// Unknown names map to [`Protocol::Unsupported`].
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "http2" => Self::Http2,
            "http_proxy" => Self::HttpProxy,
            "grpc" => Self::Grpc,
            "grpc-web" => Self::GrpcWeb,
            "https" => Self::Https,
            "tls" => Self::Tls,
            "tcp" => Self::Tcp,
            "udp" => Self::Udp,
            "mongo" => Self::Mongo,
            "redis" => Self::Redis,
            "mysql" => Self::Mysql,
            "thrift" => Self::Thrift,
            _ => Self::Unsupported,
        }
    }

    /// Canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Http2 => "HTTP2",
            Self::HttpProxy => "HTTP_PROXY",
            Self::Grpc => "GRPC",
            Self::GrpcWeb => "GRPC-Web",
            Self::Https => "HTTPS",
            Self::Tls => "TLS",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Mongo => "Mongo",
            Self::Redis => "Redis",
            Self::Mysql => "MySQL",
            Self::Thrift => "Thrift",
            Self::Unsupported => "UnsupportedProtocol",
        }
    }

    /// Whether the protocol is HTTP-based.
    pub fn is_http(&self) -> bool {
        matches!(
            self,
            Self::Http | Self::Http2 | Self::HttpProxy | Self::Grpc | Self::GrpcWeb
        )
    }

    /// Whether this is [`Protocol::Unsupported`].
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named service port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port name.
    pub name: String,
    /// Port number.
    pub port: u32,
    /// Inferred application protocol.
    pub protocol: Protocol,
}

/// Registry a service was discovered from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Registry {
    /// Native Kubernetes `Service`.
    #[default]
    Kubernetes,
    /// Declared through a `ServiceEntry`.
    External,
}

/// How the proxy resolves endpoints of a service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Proxy load-balances across known endpoints.
    #[default]
    ClientSideLb,
    /// Traffic is forwarded to the original destination.
    Passthrough,
    /// Endpoints are resolved through DNS.
    DnsLb,
}

/// Service attributes carried alongside the hostname.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAttributes {
    /// Origin registry.
    pub service_registry: Registry,
    /// Name of the source object.
    pub name: String,
    /// Namespace of the source object.
    pub namespace: String,
    /// Labels of the source object.
    pub labels: BTreeMap<String, String>,
    /// Annotations of the source object.
    pub annotations: BTreeMap<String, String>,
    /// Workload label selector; empty for headless and external-name services.
    pub label_selectors: BTreeMap<String, String>,
    /// Namespaces the service is exported to.
    pub export_to: Vec<String>,
}

/// Canonical mesh service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Fully qualified hostname.
    pub hostname: String,
    /// Declared ports.
    pub ports: Vec<Port>,
    /// Virtual addresses; [`UNSPECIFIED_IP`] when there is none.
    pub addresses: Vec<String>,
    /// Service attributes.
    pub attributes: ServiceAttributes,
    /// Workload instances currently believed to back the service.
    pub endpoints: Vec<IstioEndpoint>,
    /// Endpoint resolution mode.
    pub resolution: Resolution,
    /// Whether the service lives outside the mesh.
    pub mesh_external: bool,
}

impl Service {
    /// Look up a port by name.
    pub fn port_by_name(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Whether the service has a routable virtual address.
    pub fn has_address(&self) -> bool {
        self.addresses.iter().any(|a| a != UNSPECIFIED_IP)
    }

    /// Remove the endpoint with `key`, if present.
    ///
    /// Order is not preserved: the last endpoint takes the removed slot.
    pub fn remove_endpoint(&mut self, key: &str) -> Option<IstioEndpoint> {
        let pos = self.endpoints.iter().position(|e| e.key() == key)?;
        Some(self.endpoints.swap_remove(pos))
    }
}

/// One workload instance backing a service port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IstioEndpoint {
    /// Workload address (IP or socket path).
    pub address: String,
    /// Port on the workload.
    pub endpoint_port: u32,
    /// Name of the service port this instance serves.
    pub service_port_name: String,
    /// Name of the owning service.
    pub service_name: String,
    /// Namespace of the owning service.
    pub namespace: String,
    /// Hostnames this endpoint serves.
    pub hostnames: Vec<String>,
    /// Workload labels.
    pub labels: BTreeMap<String, String>,
    /// Network the workload is attached to.
    pub network: String,
    /// Locality (`region/zone/subzone`).
    pub locality: String,
    /// Workload service account.
    pub service_account: String,
    /// Load-balancing weight, 0 means default.
    pub lb_weight: u32,
}

impl IstioEndpoint {
    /// Storage identity: `serviceName/servicePortName/address:port`.
    pub fn key(&self) -> String {
        endpoint_key(
            &self.service_name,
            &self.service_port_name,
            &self.address,
            self.endpoint_port,
        )
    }
}

/// Build an endpoint identity without constructing the endpoint.
pub fn endpoint_key(service: &str, port_name: &str, address: &str, port: u32) -> String {
    format!("{service}/{port_name}/{address}:{port}")
}
