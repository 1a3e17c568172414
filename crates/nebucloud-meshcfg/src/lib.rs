//! # nebucloud-meshcfg
//!
//! Config aggregation layer for a service-mesh control plane.
//!
//! Mesh configuration (ServiceEntries, Kubernetes Services, Endpoints, Pods,
//! ConfigMaps and the canonical `IstioService` / `IstioEndpoint` model) is
//! collected from several sources, kept in versioned in-memory stores and
//! fanned out to subscribers as ordered add/update/delete events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nebucloud_meshcfg::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> ConfigResult<()> {
//! nebucloud_meshcfg::init_tracing();
//!
//! let config = ControllerConfig::builder()
//!     .source("k8s://")
//!     .translate_services(true)
//!     .build()?;
//! let controller = ConfigController::new(config)?;
//!
//! controller.register_event_handler(
//!     &GroupVersionKind::ISTIO_SERVICE,
//!     Arc::new(|ev: &ConfigEvent| println!("{} {}", ev.event(), ev.config().meta.key())),
//! )?;
//!
//! let stop = StopHandle::new();
//! controller.run(stop.signal()).await
//! # }
//! ```
//!
//! ## Architecture
//!
//! - `meshcfg-types` - MCP discovery messages and the canonical service model
//! - `meshcfg-core` - kinds, schemas, configs, events and errors
//! - `meshcfg-store` - versioned stores, monitors and the federated viewer
//! - `meshcfg-registry` - Service / ServiceEntry conversion
//! - `meshcfg-controller` - Kubernetes and MCP sources, translation pipeline
//!
//! This crate (`nebucloud-meshcfg`) re-exports all public APIs for convenience.
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - all errors are returned as `Result`
//! 2. **Handlers never block writers** - events are queued and dispatched by
//!    a single loop per monitor
//! 3. **Nothing is lost** - every store mutation produces exactly one event
//! 4. **Observable** - built-in metrics and tracing support

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use meshcfg_controller as controller;
pub use meshcfg_core as core;
pub use meshcfg_registry as registry;
pub use meshcfg_store as store;
pub use meshcfg_types as types;

/// Prelude module for convenient imports.
///
/// ```rust
/// use nebucloud_meshcfg::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use meshcfg_core::{
        Config, ConfigError, ConfigEvent, ConfigMeta, Event, GroupVersionKind,
        Result as ConfigResult, Schemas, Spec,
    };

    // Stores and monitors
    pub use meshcfg_store::{
        ConfigReader, ConfigStore, EventHandler, Listing, MemoryStore, MonitorController,
        SourceKind, StopHandle, StopSignal, SubscribableMap, ViewerStore,
    };

    // Conversion
    pub use meshcfg_registry::{convert_service, convert_service_entry, JoinRetry};

    // Controller
    pub use meshcfg_controller::{
        fact_key, ConfigController, ConfigControllerBuilder, ControllerConfig, McpConnector,
        McpStream,
    };

    // Model
    pub use meshcfg_types::{IstioEndpoint, Service, ServiceEntrySpec};
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`
/// (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("nebucloud-meshcfg {} (MSRV {})", VERSION, MSRV)
    }
}
