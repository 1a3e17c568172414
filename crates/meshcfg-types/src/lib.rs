//! # meshcfg-types
//!
//! Message and model types shared by every meshcfg crate.
//!
//! This crate has no internal dependencies. It provides:
//!
//! - [`mcp`] - MCP-over-xDS discovery messages (state-of-the-world and delta)
//! - [`model`] - the canonical, source-agnostic mesh model ([`Service`], [`IstioEndpoint`])
//! - [`networking`] - the `ServiceEntry` resource spec
//!
//! ## Wire Codec
//!
//! The discovery messages here match the API surface of the MCP protobuf
//! definitions, but encoding and transport are supplied by whatever protocol
//! library carries them. Resource bodies stay as [`prost_types::Any`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use prost_types::Any;

pub mod mcp;
pub mod model;
pub mod networking;

pub use mcp::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse, McpRequest,
    McpResource, McpResponse, Metadata, Node, Status,
};
pub use model::{
    IstioEndpoint, Port, Protocol, Registry, Resolution, Service, ServiceAttributes,
    UNSPECIFIED_IP,
};
pub use networking::{
    Location, ServiceEntryResolution, ServiceEntrySpec, ServicePort, WorkloadEntry,
    WorkloadSelector,
};
