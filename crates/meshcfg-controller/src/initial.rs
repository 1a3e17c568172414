//! Initial MCP subscriptions.

use meshcfg_core::{GroupVersionKind, Schemas};
use meshcfg_types::{DiscoveryRequest, Node};

/// One wildcard subscription per kind of `schemas`, in schema order.
///
/// # Example
///
/// ```rust
/// use meshcfg_controller::initial_requests;
/// use meshcfg_core::Schemas;
///
/// let requests = initial_requests(&Schemas::builtin(), None);
/// assert_eq!(requests.len(), Schemas::builtin().len());
/// assert!(requests.iter().all(|r| r.resource_names.is_empty()));
/// ```
pub fn initial_requests(schemas: &Schemas, node: Option<Node>) -> Vec<DiscoveryRequest> {
    schemas
        .iter()
        .map(|gvk| DiscoveryRequest {
            node: node.clone(),
            ..DiscoveryRequest::subscribe(gvk.type_url())
        })
        .collect()
}

/// Keep the requests named by `types`.
///
/// An entry matches a request when it equals the type URL or, ignoring case,
/// the kind. An empty `types` keeps everything.
pub fn filter_requests(requests: Vec<DiscoveryRequest>, types: &[String]) -> Vec<DiscoveryRequest> {
    if types.is_empty() {
        return requests;
    }
    requests
        .into_iter()
        .filter(|req| {
            let gvk = req.type_url.parse::<GroupVersionKind>().ok();
            types.iter().any(|t| {
                *t == req.type_url || gvk.as_ref().is_some_and(|g| g.matches_kind(t))
            })
        })
        .collect()
}
