//! MCP-over-xDS discovery messages.
//!
//! A peer subscribes to typed resource collections. The collection name is
//! the `type_url` and follows the `group/version/kind` convention, e.g.
//! `networking.istio.io/v1alpha3/ServiceEntry`.

use std::collections::BTreeMap;

/// Identity of the subscribing node.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Node {
    /// Node identifier.
    pub id: String,
    /// Cluster the node belongs to.
    pub cluster: String,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
}

/// Error detail attached to a NACK.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Status {
    /// gRPC status code.
    pub code: i32,
    /// Error message.
    pub message: String,
}

/// State-of-the-world discovery request.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DiscoveryRequest {
    /// Version info from the last accepted response (empty on first request).
    pub version_info: String,
    /// Node information.
    pub node: Option<Node>,
    /// Requested resource names (empty for wildcard).
    pub resource_names: Vec<String>,
    /// Collection being requested.
    pub type_url: String,
    /// Nonce of the response being acknowledged.
    pub response_nonce: String,
    /// Set when this request NACKs the previous response.
    pub error_detail: Option<Status>,
}

impl DiscoveryRequest {
    /// A wildcard subscription to `type_url`.
    pub fn subscribe(type_url: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            ..Default::default()
        }
    }

    /// Convert the subscription into its delta form.
    pub fn to_delta(&self) -> DeltaDiscoveryRequest {
        DeltaDiscoveryRequest {
            node: self.node.clone(),
            type_url: self.type_url.clone(),
            resource_names_subscribe: self.resource_names.clone(),
            ..Default::default()
        }
    }
}

/// State-of-the-world discovery response: the full set for one collection.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DiscoveryResponse {
    /// Version of this response.
    pub version_info: String,
    /// Every resource currently in the collection.
    pub resources: Vec<McpResource>,
    /// Collection of the resources.
    pub type_url: String,
    /// Unique nonce for this response.
    pub nonce: String,
}

/// Delta discovery request.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DeltaDiscoveryRequest {
    /// Node information.
    pub node: Option<Node>,
    /// Collection being requested.
    pub type_url: String,
    /// Names to add to the subscription.
    pub resource_names_subscribe: Vec<String>,
    /// Names to remove from the subscription.
    pub resource_names_unsubscribe: Vec<String>,
    /// Versions already held by the client, keyed by resource name.
    pub initial_resource_versions: BTreeMap<String, String>,
    /// Nonce of the response being acknowledged.
    pub response_nonce: String,
    /// Set when this request NACKs the previous response.
    pub error_detail: Option<Status>,
}

/// Delta discovery response: changed and removed resources only.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DeltaDiscoveryResponse {
    /// Version of the whole system at the time of this response.
    pub system_version_info: String,
    /// Added or changed resources.
    pub resources: Vec<McpResource>,
    /// Collection of the resources.
    pub type_url: String,
    /// Names of removed resources (`namespace/name`).
    pub removed_resources: Vec<String>,
    /// Unique nonce for this response.
    pub nonce: String,
}

/// Request sent on an MCP session.
#[derive(Clone, PartialEq, Debug)]
pub enum McpRequest {
    /// State-of-the-world request.
    Sotw(DiscoveryRequest),
    /// Incremental request.
    Delta(DeltaDiscoveryRequest),
}

impl McpRequest {
    /// Collection this request is about.
    pub fn type_url(&self) -> &str {
        match self {
            Self::Sotw(r) => &r.type_url,
            Self::Delta(r) => &r.type_url,
        }
    }

    /// Whether this request rejects the previous response.
    pub fn is_nack(&self) -> bool {
        match self {
            Self::Sotw(r) => r.error_detail.is_some(),
            Self::Delta(r) => r.error_detail.is_some(),
        }
    }
}

/// Response received on an MCP session.
#[derive(Clone, PartialEq, Debug)]
pub enum McpResponse {
    /// State-of-the-world response.
    Sotw(DiscoveryResponse),
    /// Incremental response.
    Delta(DeltaDiscoveryResponse),
}

impl McpResponse {
    /// Collection this response carries.
    pub fn type_url(&self) -> &str {
        match self {
            Self::Sotw(r) => &r.type_url,
            Self::Delta(r) => &r.type_url,
        }
    }

    /// Nonce to acknowledge.
    pub fn nonce(&self) -> &str {
        match self {
            Self::Sotw(r) => &r.nonce,
            Self::Delta(r) => &r.nonce,
        }
    }
}

/// One resource of a collection.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct McpResource {
    /// Resource metadata.
    pub metadata: Metadata,
    /// Encoded resource body. `None` for a zombie (deleted) resource.
    pub body: Option<prost_types::Any>,
}

/// Metadata of an MCP resource.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Metadata {
    /// Fully qualified name, `namespace/name` or `name` for cluster-scoped.
    pub name: String,
    /// Creation time.
    pub create_time: Option<prost_types::Timestamp>,
    /// Opaque resource version.
    pub version: String,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    pub annotations: BTreeMap<String, String>,
}

impl Metadata {
    /// Split the fully qualified name into `(namespace, name)`.
    ///
    /// A name without `/` is cluster-scoped and yields an empty namespace.
    pub fn split_name(&self) -> (&str, &str) {
        match self.name.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => ("", self.name.as_str()),
        }
    }
}
