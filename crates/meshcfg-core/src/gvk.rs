//! Resource type identity.
//!
//! A [`GroupVersionKind`] keys every map in the config plane. Its string form
//! doubles as the MCP collection (type URL) used on the wire.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// Group/Version/Kind triple identifying a resource type.
///
/// Stringifies as `group/version/kind`, or `core/version/kind` when the group
/// is empty.
///
/// # Example
///
/// ```rust
/// use meshcfg_core::GroupVersionKind;
///
/// assert_eq!(GroupVersionKind::POD.to_string(), "core/v1/Pod");
///
/// let gvk: GroupVersionKind = "networking.istio.io/v1alpha3/Sidecar".parse().unwrap();
/// assert_eq!(gvk, GroupVersionKind::SIDECAR);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionKind {
    group: Cow<'static, str>,
    version: Cow<'static, str>,
    kind: Cow<'static, str>,
}

const ISTIO_NETWORKING: &str = "networking.istio.io";
const ISTIO_SECURITY: &str = "security.istio.io";

impl GroupVersionKind {
    /// Kubernetes `Service`.
    pub const SERVICE: Self = Self::from_static("", "v1", "Service");
    /// Kubernetes `Endpoints`.
    pub const ENDPOINTS: Self = Self::from_static("", "v1", "Endpoints");
    /// Kubernetes `Pod`.
    pub const POD: Self = Self::from_static("", "v1", "Pod");
    /// Kubernetes `ConfigMap`.
    pub const CONFIG_MAP: Self = Self::from_static("", "v1", "ConfigMap");

    /// Istio `ServiceEntry`.
    pub const SERVICE_ENTRY: Self = Self::from_static(ISTIO_NETWORKING, "v1alpha3", "ServiceEntry");
    /// Istio `VirtualService`.
    pub const VIRTUAL_SERVICE: Self =
        Self::from_static(ISTIO_NETWORKING, "v1alpha3", "VirtualService");
    /// Istio `DestinationRule`.
    pub const DESTINATION_RULE: Self =
        Self::from_static(ISTIO_NETWORKING, "v1alpha3", "DestinationRule");
    /// Istio `Gateway`.
    pub const GATEWAY: Self = Self::from_static(ISTIO_NETWORKING, "v1alpha3", "Gateway");
    /// Istio `Sidecar`.
    pub const SIDECAR: Self = Self::from_static(ISTIO_NETWORKING, "v1alpha3", "Sidecar");
    /// Istio `EnvoyFilter`.
    pub const ENVOY_FILTER: Self = Self::from_static(ISTIO_NETWORKING, "v1alpha3", "EnvoyFilter");
    /// Istio `WorkloadEntry`.
    pub const WORKLOAD_ENTRY: Self =
        Self::from_static(ISTIO_NETWORKING, "v1alpha3", "WorkloadEntry");
    /// Istio `PeerAuthentication`.
    pub const PEER_AUTHENTICATION: Self =
        Self::from_static(ISTIO_SECURITY, "v1beta1", "PeerAuthentication");
    /// Istio `AuthorizationPolicy`.
    pub const AUTHORIZATION_POLICY: Self =
        Self::from_static(ISTIO_SECURITY, "v1beta1", "AuthorizationPolicy");

    /// Canonical mesh service synthesized from native registries.
    pub const ISTIO_SERVICE: Self = Self::from_static(ISTIO_NETWORKING, "v1alpha3", "IstioService");
    /// Canonical workload instance synthesized from native registries.
    pub const ISTIO_ENDPOINT: Self =
        Self::from_static(ISTIO_NETWORKING, "v1alpha3", "IstioEndpoint");

    /// Create a kind from owned or borrowed parts.
    pub fn new(
        group: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
        kind: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Create a kind from static strings; usable in constants.
    pub const fn from_static(group: &'static str, version: &'static str, kind: &'static str) -> Self {
        Self {
            group: Cow::Borrowed(group),
            version: Cow::Borrowed(version),
            kind: Cow::Borrowed(kind),
        }
    }

    /// API group; empty for the Kubernetes core group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// API version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// MCP collection name for this kind.
    pub fn type_url(&self) -> String {
        self.to_string()
    }

    /// Whether `kind` names this type, ignoring case.
    pub fn matches_kind(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = if self.group.is_empty() { "core" } else { &self.group };
        write!(f, "{}/{}/{}", group, self.version, self.kind)
    }
}

impl FromStr for GroupVersionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split('/').collect();
        match parts.as_slice() {
            [group, version, kind] if !version.is_empty() && !kind.is_empty() => {
                let group = if *group == "core" { "" } else { group };
                Ok(Self::new(group.to_string(), version.to_string(), kind.to_string()))
            }
            _ => Err(ConfigError::Configuration(format!(
                "invalid kind {s:?}: expected group/version/kind"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(GroupVersionKind::SERVICE.to_string(), "core/v1/Service");
        assert_eq!(
            GroupVersionKind::SERVICE_ENTRY.to_string(),
            "networking.istio.io/v1alpha3/ServiceEntry"
        );
    }

    #[test]
    fn test_owned_equals_static() {
        let owned = GroupVersionKind::new(String::new(), "v1".to_string(), "Pod".to_string());
        assert_eq!(owned, GroupVersionKind::POD);

        let mut set = std::collections::HashSet::new();
        set.insert(owned);
        assert!(set.contains(&GroupVersionKind::POD));
    }

    #[test]
    fn test_parse_core_group() {
        let gvk: GroupVersionKind = "core/v1/Endpoints".parse().unwrap();
        assert_eq!(gvk, GroupVersionKind::ENDPOINTS);
        assert_eq!(gvk.group(), "");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("v1/Pod".parse::<GroupVersionKind>().is_err());
        assert!("a/b/".parse::<GroupVersionKind>().is_err());
    }

    #[test]
    fn test_matches_kind() {
        assert!(GroupVersionKind::SERVICE_ENTRY.matches_kind("serviceentry"));
        assert!(!GroupVersionKind::SERVICE_ENTRY.matches_kind("service"));
    }
}
