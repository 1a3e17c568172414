//! # meshcfg-core
//!
//! Core types shared by every layer of the config plane:
//!
//! - [`GroupVersionKind`] - identity of a resource type, with well-known kinds
//! - [`Schemas`] - ordered, immutable catalogue of known kinds
//! - [`Config`] / [`ConfigMeta`] / [`Spec`] - a versioned config object
//! - [`ConfigEvent`] / [`Event`] - change notifications
//! - [`ResourceVersion`] - opaque version token
//! - [`ConfigError`] - error type with gRPC status mapping
//!
//! ## Example
//!
//! ```rust
//! use meshcfg_core::{Config, ConfigMeta, GroupVersionKind, Schemas, Spec};
//!
//! let schemas = Schemas::kube();
//! assert!(schemas.contains(&GroupVersionKind::SERVICE_ENTRY));
//!
//! let meta = ConfigMeta::new(GroupVersionKind::CONFIG_MAP, "default", "settings");
//! let cfg = Config::new(meta, Spec::Json(serde_json::json!({"k": "v"})));
//! assert_eq!(cfg.key(), "default/settings");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod event;
mod gvk;
mod schema;
mod version;

pub use config::{Config, ConfigMeta, Spec, RESOURCE_VERSION_ANNOTATION};
pub use error::ConfigError;
pub use event::{ConfigEvent, Event};
pub use gvk::GroupVersionKind;
pub use schema::{Schemas, SchemasBuilder};
pub use version::ResourceVersion;

/// Result type alias using [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
