//! # meshcfg-registry
//!
//! Deterministic conversion of native registry objects into the canonical
//! mesh model.
//!
//! - [`convert_service`] / [`convert_kube_service`] - Kubernetes `Service`
//!   (+ `Endpoints` + `Pod`) to [`Service`](meshcfg_types::Service)
//! - [`convert_service_entry`] - `ServiceEntry` to one service per host
//! - [`infer_protocol`] - port protocol inference
//! - [`JoinRetry`] - bounded wait for resources delivered out of order
//!
//! Every function here is free of side effects apart from the blocking
//! sleeps of [`JoinRetry`].
//!
//! ## Example
//!
//! ```rust
//! use meshcfg_core::{ConfigMeta, GroupVersionKind};
//! use meshcfg_registry::convert_service_entry;
//! use meshcfg_types::{ServiceEntrySpec, ServicePort, WorkloadEntry};
//!
//! let meta = ConfigMeta::new(GroupVersionKind::SERVICE_ENTRY, "default", "se1");
//! let se = ServiceEntrySpec {
//!     hosts: vec!["a.com".to_string()],
//!     ports: vec![ServicePort { number: 80, name: "http".to_string(), ..Default::default() }],
//!     endpoints: vec![WorkloadEntry { address: "10.0.0.1".to_string(), ..Default::default() }],
//!     ..Default::default()
//! };
//!
//! let services = convert_service_entry(&meta, &se);
//! assert_eq!(services[0].hostname, "a.com");
//! assert_eq!(services[0].endpoints[0].endpoint_port, 80);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod kube;
mod protocol;
mod retry;
mod service_entry;

pub use kube::{
    convert_endpoints, convert_kube_service, convert_service, endpoint_keys, service_hostname,
    KubeIndex, EXPORT_TO_ANNOTATION,
};
pub use protocol::{infer_protocol, protocol_from_port_name, service_entry_protocol};
pub use retry::JoinRetry;
pub use service_entry::{convert_service_entry, service_entry_endpoints};
