//! Cross-crate tests for the meshcfg config plane.
//!
//! Run with: `cargo test --package integration-tests`

#[cfg(test)]
mod support;

#[cfg(test)]
mod controller_tests;
#[cfg(test)]
mod conversion_tests;
#[cfg(test)]
mod mcp_tests;
#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod store_tests;
#[cfg(test)]
mod viewer_tests;
