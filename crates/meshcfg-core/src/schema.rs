//! Schema registry: the ordered catalogue of known kinds.
//!
//! A [`Schemas`] value is built once and never mutated. [`Schemas::add`] and
//! [`Schemas::remove`] return new copies, so a store holding a `Schemas` can
//! rely on its kinds never changing.

use std::collections::HashSet;
use std::sync::Arc;

use crate::{ConfigError, GroupVersionKind, Result};

/// Ordered, immutable set of kinds.
///
/// Iteration follows insertion order, which keeps listing and initial
/// request construction deterministic.
///
/// # Example
///
/// ```rust
/// use meshcfg_core::{GroupVersionKind, Schemas};
///
/// let schemas = Schemas::builder()
///     .add(GroupVersionKind::SERVICE)
///     .unwrap()
///     .add(GroupVersionKind::ENDPOINTS)
///     .unwrap()
///     .build();
///
/// let kinds: Vec<_> = schemas.iter().map(|g| g.kind()).collect();
/// assert_eq!(kinds, ["Service", "Endpoints"]);
/// assert!(schemas.add(GroupVersionKind::SERVICE).is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schemas {
    kinds: Arc<Vec<GroupVersionKind>>,
}

impl Schemas {
    /// Create a builder.
    pub fn builder() -> SchemasBuilder {
        SchemasBuilder::default()
    }

    /// Kubernetes kinds watched by a cluster-backed source.
    pub fn kube() -> Self {
        Self::from_known(&[
            GroupVersionKind::POD,
            GroupVersionKind::ENDPOINTS,
            GroupVersionKind::SERVICE,
            GroupVersionKind::CONFIG_MAP,
            GroupVersionKind::SERVICE_ENTRY,
        ])
    }

    /// Istio configuration kinds served by a remote mesh peer.
    pub fn mesh() -> Self {
        Self::from_known(&[
            GroupVersionKind::VIRTUAL_SERVICE,
            GroupVersionKind::DESTINATION_RULE,
            GroupVersionKind::GATEWAY,
            GroupVersionKind::SERVICE_ENTRY,
            GroupVersionKind::SIDECAR,
            GroupVersionKind::ENVOY_FILTER,
            GroupVersionKind::WORKLOAD_ENTRY,
            GroupVersionKind::PEER_AUTHENTICATION,
            GroupVersionKind::AUTHORIZATION_POLICY,
        ])
    }

    /// The built-in schema: mesh kinds plus the canonical service model.
    pub fn builtin() -> Self {
        let mut kinds = Self::mesh().kinds.to_vec();
        kinds.push(GroupVersionKind::ISTIO_SERVICE);
        kinds.push(GroupVersionKind::ISTIO_ENDPOINT);
        Self { kinds: Arc::new(kinds) }
    }

    // Only called with literal, duplicate-free lists.
    fn from_known(kinds: &[GroupVersionKind]) -> Self {
        Self {
            kinds: Arc::new(kinds.to_vec()),
        }
    }

    /// Return a copy with `gvk` appended.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateType`] if `gvk` is already present.
    pub fn add(&self, gvk: GroupVersionKind) -> Result<Self> {
        if self.contains(&gvk) {
            return Err(ConfigError::DuplicateType { gvk });
        }
        let mut kinds = self.kinds.to_vec();
        kinds.push(gvk);
        Ok(Self { kinds: Arc::new(kinds) })
    }

    /// Return a copy without `gvk`. Removing an absent kind is a no-op.
    #[must_use]
    pub fn remove(&self, gvk: &GroupVersionKind) -> Self {
        let kinds: Vec<_> = self.kinds.iter().filter(|k| *k != gvk).cloned().collect();
        Self { kinds: Arc::new(kinds) }
    }

    /// Merge two sets, keeping `self`'s order and appending new kinds of `other`.
    #[must_use]
    pub fn union(&self, other: &Schemas) -> Self {
        let mut seen: HashSet<&GroupVersionKind> = self.kinds.iter().collect();
        let mut kinds = self.kinds.to_vec();
        for gvk in other.iter() {
            if seen.insert(gvk) {
                kinds.push(gvk.clone());
            }
        }
        Self { kinds: Arc::new(kinds) }
    }

    /// Whether `gvk` is known.
    pub fn contains(&self, gvk: &GroupVersionKind) -> bool {
        self.kinds.iter().any(|k| k == gvk)
    }

    /// Look up a kind by GVK.
    pub fn get(&self, gvk: &GroupVersionKind) -> Option<&GroupVersionKind> {
        self.kinds.iter().find(|k| *k == gvk)
    }

    /// First kind whose name matches `kind`, ignoring case.
    pub fn find_kind(&self, kind: &str) -> Option<&GroupVersionKind> {
        self.kinds.iter().find(|k| k.matches_kind(kind))
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.kinds.iter()
    }

    /// Number of kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether there are no kinds.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Builder for [`Schemas`].
#[derive(Debug, Default)]
pub struct SchemasBuilder {
    kinds: Vec<GroupVersionKind>,
}

impl SchemasBuilder {
    /// Append a kind.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateType`] if the kind was already added.
    pub fn add(mut self, gvk: GroupVersionKind) -> Result<Self> {
        if self.kinds.contains(&gvk) {
            return Err(ConfigError::DuplicateType { gvk });
        }
        self.kinds.push(gvk);
        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> Schemas {
        Schemas {
            kinds: Arc::new(self.kinds),
        }
    }
}
