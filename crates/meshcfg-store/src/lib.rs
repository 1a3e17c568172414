//! # meshcfg-store
//!
//! The storage and notification layer of the config plane.
//!
//! - [`MemoryStore`] - namespace-partitioned versioned store behind the
//!   [`ConfigReader`] / [`ConfigStore`] traits
//! - [`Monitor`] - bounded, ordered event dispatch per store
//! - [`MonitorController`] - a store bound to its monitor; CRUD with events
//! - [`ViewerStore`] - read-only federation across several sources
//! - [`SubscribableMap`] - shared facts with change subscriptions
//! - [`StopHandle`] / [`StopSignal`] - cooperative stop
//!
//! ## Ordering and back-pressure
//!
//! Each monitor has exactly one consumer. Handlers for a kind observe events
//! in the order they were scheduled, and a handler that blocks holds up every
//! later event of that monitor. Writers wait when the queue is full.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use meshcfg_core::{Config, ConfigEvent, ConfigMeta, GroupVersionKind, Schemas, Spec};
//! use meshcfg_store::{MonitorController, SourceKind, StopHandle};
//!
//! # #[tokio::main]
//! # async fn main() -> meshcfg_core::Result<()> {
//! let controller = Arc::new(MonitorController::in_memory(SourceKind::Kubernetes, Schemas::kube()));
//! controller.register_event_handler(
//!     &GroupVersionKind::CONFIG_MAP,
//!     Arc::new(|event: &ConfigEvent| println!("{} {}", event.event(), event.config().key())),
//! )?;
//!
//! let stop = StopHandle::new();
//! let runner = tokio::spawn({
//!     let controller = Arc::clone(&controller);
//!     let signal = stop.signal();
//!     async move { controller.run(signal).await }
//! });
//!
//! let meta = ConfigMeta::new(GroupVersionKind::CONFIG_MAP, "default", "settings");
//! controller.create(Config::new(meta, Spec::Json(serde_json::json!({})))).await?;
//!
//! stop.stop();
//! runner.await.unwrap();
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod controller;
pub mod metrics;
mod monitor;
mod stats;
mod stop;
mod store;
mod subscribe;
mod viewer;

pub use controller::{MonitorController, SourceKind};
pub use metrics::ConfigMetrics;
pub use monitor::{EventHandler, Monitor, DEFAULT_EVENT_BUFFER};
pub use stats::MonitorStats;
pub use stop::{StopHandle, StopSignal};
pub use store::{ConfigReader, ConfigStore, MemoryStore, MemoryStoreBuilder};
pub use subscribe::{MapChange, SubscribableMap, Subscription};
pub use viewer::{Listing, ViewerStore};
