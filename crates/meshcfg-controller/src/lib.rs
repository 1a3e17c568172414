//! # meshcfg-controller
//!
//! Multi-source config controller.
//!
//! A [`ConfigController`] owns one
//! [`MonitorController`](meshcfg_store::MonitorController) per configured
//! source plus an always-present built-in controller for synthesized
//! canonical configs:
//!
//! - `k8s://` sources watch Pods, Endpoints, Services, ConfigMaps and
//!   ServiceEntries ([`KubeSource`])
//! - `xds://host:port?types=...` sources follow a remote MCP peer
//!   ([`XdsSource`])
//! - with `translate_services`, a [`TranslationPipeline`] mirrors registry
//!   objects into the built-in controller as `IstioService` /
//!   `IstioEndpoint` configs
//!
//! ## Example
//!
//! ```rust,no_run
//! use meshcfg_controller::{ConfigController, ControllerConfig};
//! use meshcfg_store::StopHandle;
//!
//! # async fn example() -> meshcfg_core::Result<()> {
//! let config = ControllerConfig::builder()
//!     .source("k8s://")
//!     .translate_services(true)
//!     .build()?;
//! let controller = ConfigController::new(config)?;
//!
//! let stop = StopHandle::new();
//! let signal = stop.signal();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     stop.stop();
//! });
//! controller.run(signal).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod controller;
mod initial;
pub mod source;
mod translate;

pub use builder::ConfigControllerBuilder;
pub use config::{ConfigSourceSpec, ControllerConfig, ControllerConfigBuilder};
pub use controller::ConfigController;
pub use initial::{filter_requests, initial_requests};
pub use source::{ConfigSource, KubeSource, McpConnector, McpStream, XdsSource};
pub use translate::{endpoint_config, fact_key, service_config, StoreIndex, TranslationPipeline};
