//! Read-only federation across config sources.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use meshcfg_core::{Config, ConfigError, GroupVersionKind, Result, Schemas};
use tracing::{trace, warn};

use crate::store::ConfigReader;

/// Result of a federated list: whatever could be collected plus the errors
/// of the sources that failed.
#[derive(Debug, Default)]
pub struct Listing {
    /// Deduplicated configs, first source wins.
    pub configs: Vec<Config>,
    /// Per-source failures.
    pub errors: Vec<ConfigError>,
}

impl Listing {
    /// Whether every source answered.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Split into the collected configs and an aggregated error, if any.
    pub fn into_parts(self) -> (Vec<Config>, Option<ConfigError>) {
        (self.configs, ConfigError::aggregate(self.errors))
    }

    /// The configs if every source answered, otherwise the aggregated error.
    ///
    /// # Errors
    ///
    /// The aggregated per-source errors.
    pub fn into_result(self) -> Result<Vec<Config>> {
        match ConfigError::aggregate(self.errors) {
            None => Ok(self.configs),
            Some(err) => Err(err),
        }
    }
}

/// One logical view over several readers.
///
/// Readers are consulted in registration order: `get` returns the first hit,
/// `list` merges and keeps the first copy of each `(kind, namespace, name)`.
#[derive(Default)]
pub struct ViewerStore {
    schemas: Schemas,
    readers: HashMap<GroupVersionKind, Vec<Arc<dyn ConfigReader>>>,
}

impl fmt::Debug for ViewerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .readers
            .iter()
            .map(|(gvk, readers)| (gvk.to_string(), readers.len()))
            .collect();
        f.debug_struct("ViewerStore").field("readers", &counts).finish()
    }
}

impl ViewerStore {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `reader` for every kind of its schema.
    pub fn register(&mut self, reader: Arc<dyn ConfigReader>) {
        let schemas = reader.schemas();
        for gvk in schemas.iter() {
            self.readers
                .entry(gvk.clone())
                .or_default()
                .push(Arc::clone(&reader));
        }
        self.schemas = self.schemas.union(&schemas);
    }

    /// Union of the registered readers' kinds, in registration order.
    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    /// Number of readers registered for `gvk`.
    pub fn reader_count(&self, gvk: &GroupVersionKind) -> usize {
        self.readers.get(gvk).map_or(0, Vec::len)
    }

    /// First reader's copy of the config, if any has it.
    pub fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Option<Config> {
        let found = self
            .readers
            .get(gvk)?
            .iter()
            .find_map(|reader| reader.get(gvk, namespace, name));
        trace!(gvk = %gvk, namespace, name, hit = found.is_some(), "viewer get");
        found
    }

    /// Merge every reader's configs of `gvk` (all kinds when `None`).
    pub fn list(&self, gvk: Option<&GroupVersionKind>, namespace: &str) -> Listing {
        let kinds: Vec<&GroupVersionKind> = match gvk {
            Some(gvk) => vec![gvk],
            None => self.schemas.iter().collect(),
        };

        let mut listing = Listing::default();
        let mut seen = HashSet::new();
        for kind in kinds {
            let Some(readers) = self.readers.get(kind) else {
                continue;
            };
            for reader in readers {
                match reader.list(Some(kind), namespace) {
                    Ok(configs) => {
                        for cfg in configs {
                            let key = (cfg.gvk().clone(), cfg.namespace().to_string(), cfg.name().to_string());
                            if seen.insert(key) {
                                listing.configs.push(cfg);
                            }
                        }
                    }
                    Err(err) => {
                        warn!(gvk = %kind, error = %err, "source failed to list");
                        listing.errors.push(err);
                    }
                }
            }
        }
        listing
    }
}
