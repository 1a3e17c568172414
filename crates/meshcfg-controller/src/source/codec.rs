//! Config <-> MCP resource codec.
//!
//! Resource bodies travel as `google.protobuf.Any` whose value is the JSON
//! encoding of the spec. Kinds with a typed [`Spec`] variant decode into it;
//! everything else stays [`Spec::Json`].

use chrono::{DateTime, Utc};
use meshcfg_core::{Config, ConfigError, ConfigMeta, GroupVersionKind, Result, Spec};
use meshcfg_types::{McpResource, Metadata};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// `Any` type URL prefix used for encoded bodies.
pub const BODY_TYPE_PREFIX: &str = "type.googleapis.com/";

fn decode_err(gvk: &GroupVersionKind, err: impl ToString) -> ConfigError {
    ConfigError::Decode {
        type_url: gvk.type_url(),
        message: err.to_string(),
    }
}

fn typed<T: DeserializeOwned>(gvk: &GroupVersionKind, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| decode_err(gvk, e))
}

/// Build the [`Spec`] of a `gvk` object from its JSON form.
///
/// # Errors
///
/// [`ConfigError::Decode`] if the JSON does not fit the kind's type.
pub fn spec_from_json(gvk: &GroupVersionKind, value: Value) -> Result<Spec> {
    let spec = if *gvk == GroupVersionKind::SERVICE_ENTRY {
        Spec::ServiceEntry(typed(gvk, value)?)
    } else if *gvk == GroupVersionKind::ISTIO_SERVICE {
        Spec::MeshService(typed(gvk, value)?)
    } else if *gvk == GroupVersionKind::ISTIO_ENDPOINT {
        Spec::IstioEndpoint(typed(gvk, value)?)
    } else if *gvk == GroupVersionKind::SERVICE {
        Spec::KubeService(typed(gvk, value)?)
    } else if *gvk == GroupVersionKind::ENDPOINTS {
        Spec::Endpoints(typed(gvk, value)?)
    } else if *gvk == GroupVersionKind::POD {
        Spec::Pod(typed(gvk, value)?)
    } else if *gvk == GroupVersionKind::CONFIG_MAP {
        Spec::ConfigMap(typed(gvk, value)?)
    } else {
        Spec::Json(value)
    };
    Ok(spec)
}

/// JSON form of `spec`.
///
/// # Errors
///
/// [`ConfigError::Decode`] if serialization fails.
pub fn spec_to_json(gvk: &GroupVersionKind, spec: &Spec) -> Result<Value> {
    let value = match spec {
        Spec::KubeService(s) => serde_json::to_value(s),
        Spec::Endpoints(e) => serde_json::to_value(e),
        Spec::Pod(p) => serde_json::to_value(p),
        Spec::ConfigMap(c) => serde_json::to_value(c),
        Spec::ServiceEntry(se) => serde_json::to_value(se),
        Spec::MeshService(s) => serde_json::to_value(s),
        Spec::IstioEndpoint(e) => serde_json::to_value(e),
        Spec::Json(v) => Ok(v.clone()),
    };
    value.map_err(|e| decode_err(gvk, e))
}

fn to_timestamp(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: i32::try_from(ts.timestamp_subsec_nanos()).unwrap_or_default(),
    }
}

fn from_timestamp(ts: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.seconds, u32::try_from(ts.nanos).unwrap_or_default())
}

/// Decode one resource of collection `gvk`.
///
/// Returns `Ok(None)` for a resource without a body.
///
/// # Errors
///
/// [`ConfigError::Decode`] for a malformed body.
pub fn decode_resource(gvk: &GroupVersionKind, resource: &McpResource) -> Result<Option<Config>> {
    let Some(body) = resource.body.as_ref() else {
        return Ok(None);
    };
    let (namespace, name) = resource.metadata.split_name();
    if name.is_empty() {
        return Err(decode_err(gvk, "resource without a name"));
    }

    let value: Value = serde_json::from_slice(&body.value).map_err(|e| decode_err(gvk, e))?;
    let spec = spec_from_json(gvk, value)?;

    let mut meta = ConfigMeta::new(gvk.clone(), namespace, name);
    meta.labels = resource.metadata.labels.clone();
    meta.annotations = resource.metadata.annotations.clone();
    meta.creation_timestamp = resource.metadata.create_time.as_ref().and_then(from_timestamp);
    if !resource.metadata.version.is_empty() {
        meta = meta.with_resource_version(resource.metadata.version.clone());
    }
    Ok(Some(Config::new(meta, spec)))
}

/// Encode `cfg` as an MCP resource.
///
/// # Errors
///
/// [`ConfigError::Decode`] if the spec cannot be serialized.
pub fn encode_resource(cfg: &Config) -> Result<McpResource> {
    let value = spec_to_json(cfg.gvk(), &cfg.spec)?;
    let bytes = serde_json::to_vec(&value).map_err(|e| decode_err(cfg.gvk(), e))?;
    let name = if cfg.namespace().is_empty() {
        cfg.name().to_string()
    } else {
        format!("{}/{}", cfg.namespace(), cfg.name())
    };
    Ok(McpResource {
        metadata: Metadata {
            name,
            create_time: cfg.meta.creation_timestamp.map(to_timestamp),
            version: cfg.resource_version().to_string(),
            labels: cfg.meta.labels.clone(),
            annotations: cfg.meta.annotations.clone(),
        },
        body: Some(prost_types::Any {
            type_url: format!("{BODY_TYPE_PREFIX}{}", cfg.gvk()),
            value: bytes,
        }),
    })
}
