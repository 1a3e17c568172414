//! Metrics for the config plane.
//!
//! Emitted through the `metrics` facade; installing an exporter is left to
//! the embedding binary.
//!
//! - `meshcfg_store_ops_total{op, gvk, result}`
//! - `meshcfg_events_total{event, gvk}`
//! - `meshcfg_mirror_ops_total{op, kind, result}`
//! - `meshcfg_join_timeouts_total{what}`
//! - `meshcfg_source_ready{source}`

use meshcfg_core::{Event, GroupVersionKind};
use metrics::{counter, gauge};

/// Handle for recording config plane metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigMetrics;

fn result_label<T, E>(result: &std::result::Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "error"
    }
}

impl ConfigMetrics {
    /// Create a metrics handle.
    pub fn new() -> Self {
        Self
    }

    /// Record a store operation and its outcome.
    pub fn store_op<T, E>(&self, op: &'static str, gvk: &GroupVersionKind, result: &std::result::Result<T, E>) {
        counter!(
            "meshcfg_store_ops_total",
            "op" => op,
            "gvk" => gvk.to_string(),
            "result" => result_label(result)
        )
        .increment(1);
    }

    /// Record an event scheduled on a monitor.
    pub fn event(&self, event: Event, gvk: &GroupVersionKind) {
        counter!("meshcfg_events_total", "event" => event.as_str(), "gvk" => gvk.to_string())
            .increment(1);
    }

    /// Record a mirror write into the built-in store.
    pub fn mirror_op<T, E>(&self, op: &'static str, kind: &str, result: &std::result::Result<T, E>) {
        counter!(
            "meshcfg_mirror_ops_total",
            "op" => op,
            "kind" => kind.to_string(),
            "result" => result_label(result)
        )
        .increment(1);
    }

    /// Record an exhausted dependent-resource join.
    pub fn join_timeout(&self, what: &'static str) {
        counter!("meshcfg_join_timeouts_total", "what" => what).increment(1);
    }

    /// Publish a source's readiness.
    pub fn source_ready(&self, source: &str, ready: bool) {
        gauge!("meshcfg_source_ready", "source" => source.to_string()).set(if ready { 1.0 } else { 0.0 });
    }
}
