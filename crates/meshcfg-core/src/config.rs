//! Versioned config objects.
//!
//! A [`Config`] is metadata plus a [`Spec`] payload. The payload is a closed
//! set of variants, one per supported kind, with [`Spec::Json`] carrying kinds
//! whose body the config plane only stores and forwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service as KubeService};
use meshcfg_types::{IstioEndpoint, Service, ServiceEntrySpec};

use crate::GroupVersionKind;

/// Annotation whose value, when present, is used as the resource version on
/// create and update. Stores strip it before persisting.
pub const RESOURCE_VERSION_ANNOTATION: &str = "meshcfg.nebucloud.io/resource-version";

/// Metadata of a config object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigMeta {
    /// Kind of the object.
    pub gvk: GroupVersionKind,
    /// Name.
    pub name: String,
    /// Namespace; empty for cluster-scoped objects.
    pub namespace: String,
    /// DNS domain the object belongs to.
    pub domain: String,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    pub annotations: BTreeMap<String, String>,
    /// Opaque version stamped by the store.
    pub resource_version: String,
    /// Set by the store on first create when missing.
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ConfigMeta {
    /// Metadata for `namespace/name` of kind `gvk`.
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Request that the store adopt `version` instead of stamping its own.
    #[must_use]
    pub fn with_resource_version(self, version: impl Into<String>) -> Self {
        self.with_annotation(RESOURCE_VERSION_ANNOTATION, version)
    }

    /// Version requested through [`RESOURCE_VERSION_ANNOTATION`], if any.
    pub fn requested_version(&self) -> Option<&str> {
        self.annotations
            .get(RESOURCE_VERSION_ANNOTATION)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Kind-specific payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Spec {
    /// Kubernetes `Service`.
    KubeService(KubeService),
    /// Kubernetes `Endpoints`.
    Endpoints(Endpoints),
    /// Kubernetes `Pod`.
    Pod(Pod),
    /// Kubernetes `ConfigMap`.
    ConfigMap(ConfigMap),
    /// Istio `ServiceEntry`.
    ServiceEntry(ServiceEntrySpec),
    /// Canonical mesh service.
    MeshService(Service),
    /// Canonical workload instance.
    IstioEndpoint(IstioEndpoint),
    /// Any other kind, stored as its JSON body.
    Json(serde_json::Value),
}

impl Spec {
    /// Variant name, for logging.
    pub fn variant(&self) -> &'static str {
        match self {
            Self::KubeService(_) => "KubeService",
            Self::Endpoints(_) => "Endpoints",
            Self::Pod(_) => "Pod",
            Self::ConfigMap(_) => "ConfigMap",
            Self::ServiceEntry(_) => "ServiceEntry",
            Self::MeshService(_) => "MeshService",
            Self::IstioEndpoint(_) => "IstioEndpoint",
            Self::Json(_) => "Json",
        }
    }

    /// The Kubernetes service, if this is one.
    pub fn as_kube_service(&self) -> Option<&KubeService> {
        match self {
            Self::KubeService(s) => Some(s),
            _ => None,
        }
    }

    /// The Kubernetes endpoints, if this is one.
    pub fn as_endpoints(&self) -> Option<&Endpoints> {
        match self {
            Self::Endpoints(e) => Some(e),
            _ => None,
        }
    }

    /// The pod, if this is one.
    pub fn as_pod(&self) -> Option<&Pod> {
        match self {
            Self::Pod(p) => Some(p),
            _ => None,
        }
    }

    /// The ServiceEntry spec, if this is one.
    pub fn as_service_entry(&self) -> Option<&ServiceEntrySpec> {
        match self {
            Self::ServiceEntry(se) => Some(se),
            _ => None,
        }
    }

    /// The canonical service, if this is one.
    pub fn as_mesh_service(&self) -> Option<&Service> {
        match self {
            Self::MeshService(s) => Some(s),
            _ => None,
        }
    }

    /// The canonical endpoint, if this is one.
    pub fn as_istio_endpoint(&self) -> Option<&IstioEndpoint> {
        match self {
            Self::IstioEndpoint(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ServiceEntrySpec> for Spec {
    fn from(spec: ServiceEntrySpec) -> Self {
        Self::ServiceEntry(spec)
    }
}

impl From<Service> for Spec {
    fn from(svc: Service) -> Self {
        Self::MeshService(svc)
    }
}

impl From<IstioEndpoint> for Spec {
    fn from(ep: IstioEndpoint) -> Self {
        Self::IstioEndpoint(ep)
    }
}

impl From<serde_json::Value> for Spec {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// A config object: metadata plus a shared payload.
///
/// Cloning copies the metadata and shares the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Metadata.
    pub meta: ConfigMeta,
    /// Payload.
    pub spec: Arc<Spec>,
}

impl Config {
    /// Create a config.
    pub fn new(meta: ConfigMeta, spec: impl Into<Spec>) -> Self {
        Self {
            meta,
            spec: Arc::new(spec.into()),
        }
    }

    /// Kind.
    #[inline]
    pub fn gvk(&self) -> &GroupVersionKind {
        &self.meta.gvk
    }

    /// Name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Namespace.
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }

    /// Resource version.
    #[inline]
    pub fn resource_version(&self) -> &str {
        &self.meta.resource_version
    }

    /// `namespace/name`.
    pub fn key(&self) -> String {
        self.meta.key()
    }
}
