//! Config source addresses and adapters.
//!
//! The scheme of a source address selects its adapter:
//!
//! - `k8s://` - live cluster watches ([`KubeSource`])
//! - `xds://host:port` - remote MCP-over-xDS peer ([`XdsSource`]); an optional
//!   `types=` query restricts the subscribed collections

use std::fmt;
use std::str::FromStr;

use meshcfg_core::ConfigError;
use url::Url;

pub mod codec;
mod kube;
mod xds;

pub use self::kube::KubeSource;
pub use self::xds::{McpConnector, McpStream, XdsSource};

/// Scheme of cluster-backed sources.
pub const KUBE_SCHEME: &str = "k8s";
/// Scheme of MCP-over-xDS sources.
pub const XDS_SCHEME: &str = "xds";
/// Port used when an `xds://` address names none.
pub const DEFAULT_MCP_PORT: u16 = 15010;

/// A parsed source address.
///
/// # Example
///
/// ```rust
/// use meshcfg_controller::ConfigSource;
///
/// let source: ConfigSource = "xds://istiod.istio-system:15010?types=Sidecar,EnvoyFilter"
///     .parse()
///     .unwrap();
/// match source {
///     ConfigSource::Xds { endpoint, types, .. } => {
///         assert_eq!(endpoint, "istiod.istio-system:15010");
///         assert_eq!(types, ["Sidecar", "EnvoyFilter"]);
///     }
///     _ => unreachable!(),
/// }
/// assert!("ftp://x".parse::<ConfigSource>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    /// A Kubernetes cluster.
    Kubernetes {
        /// The address as configured.
        address: String,
    },
    /// A remote MCP peer.
    Xds {
        /// The address as configured.
        address: String,
        /// `host:port` to dial.
        endpoint: String,
        /// Allow-list of collections, by type URL or kind name; empty for all.
        types: Vec<String>,
    },
}

impl ConfigSource {
    /// The address as configured.
    pub fn address(&self) -> &str {
        match self {
            Self::Kubernetes { address } | Self::Xds { address, .. } => address,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address())
    }
}

impl FromStr for ConfigSource {
    type Err = ConfigError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let Some((scheme, _)) = address.split_once("://") else {
            return Err(ConfigError::invalid_source(address, "missing scheme"));
        };

        match scheme {
            KUBE_SCHEME => Ok(Self::Kubernetes {
                address: address.to_string(),
            }),
            XDS_SCHEME => {
                let url = Url::parse(address)
                    .map_err(|e| ConfigError::invalid_source(address, e.to_string()))?;
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| ConfigError::invalid_source(address, "missing host"))?;
                let port = url.port().unwrap_or(DEFAULT_MCP_PORT);
                let types = url
                    .query_pairs()
                    .filter(|(k, _)| k == "types")
                    .flat_map(|(_, v)| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .collect();
                Ok(Self::Xds {
                    address: address.to_string(),
                    endpoint: format!("{host}:{port}"),
                    types,
                })
            }
            other => Err(ConfigError::invalid_source(
                address,
                format!("unsupported scheme {other:?}"),
            )),
        }
    }
}
