//! Config store traits and the in-memory store.
//!
//! [`MemoryStore`] indexes configs kind → namespace → name. The outer map is
//! guarded by a `RwLock`; each namespace bucket is a `DashMap` so lookups in
//! different namespaces never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use meshcfg_core::{
    Config, ConfigError, ConfigMeta, GroupVersionKind, ResourceVersion, Result, Schemas,
    RESOURCE_VERSION_ANNOTATION,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

/// Read side of a config store.
pub trait ConfigReader: Send + Sync {
    /// Kinds this store accepts.
    fn schemas(&self) -> Schemas;

    /// Look up one config.
    fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Option<Config>;

    /// List configs of `gvk`, or of every kind when `None`. An empty
    /// `namespace` matches all namespaces. Unknown kinds list as empty.
    fn list(&self, gvk: Option<&GroupVersionKind>, namespace: &str) -> Result<Vec<Config>>;
}

/// Write side of a config store.
pub trait ConfigStore: ConfigReader {
    /// Insert a new config and return its assigned version.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AlreadyExists`] on a key collision,
    /// [`ConfigError::UnknownType`] for a kind outside the schema.
    fn create(&self, cfg: Config) -> Result<ResourceVersion>;

    /// Replace an existing config and return its version.
    ///
    /// When the reserved version annotation equals the stored version the call
    /// changes nothing and returns that version.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotFound`] if the config does not exist.
    fn update(&self, cfg: Config) -> Result<ResourceVersion>;

    /// Remove a config.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotFound`] if the config does not exist.
    fn delete(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Result<()>;

    /// Metadata of configs deleted since the last [`gc_zombies`](Self::gc_zombies),
    /// stamped with the version of the deletion. Stores that do not retain
    /// deletions report none.
    fn zombies(&self, gvk: &GroupVersionKind) -> Vec<ConfigMeta> {
        let _ = gvk;
        Vec::new()
    }

    /// Drop all retained zombies. Returns how many were dropped.
    fn gc_zombies(&self) -> usize {
        0
    }
}

type Bucket = Arc<DashMap<String, Config>>;
type ZombieKey = (String, String);

/// In-memory, namespace-partitioned config store.
///
/// # Example
///
/// ```rust
/// use meshcfg_core::{Config, ConfigMeta, GroupVersionKind, Schemas, Spec};
/// use meshcfg_store::{ConfigReader, ConfigStore, MemoryStore};
///
/// let store = MemoryStore::new(Schemas::kube());
/// let meta = ConfigMeta::new(GroupVersionKind::CONFIG_MAP, "default", "settings");
/// let version = store
///     .create(Config::new(meta, Spec::Json(serde_json::json!({}))))
///     .unwrap();
///
/// let stored = store
///     .get(&GroupVersionKind::CONFIG_MAP, "default", "settings")
///     .unwrap();
/// assert_eq!(stored.resource_version(), version.as_str());
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    schemas: Schemas,
    data: RwLock<HashMap<GroupVersionKind, HashMap<String, Bucket>>>,
    zombies: Option<Mutex<HashMap<GroupVersionKind, HashMap<ZombieKey, ConfigMeta>>>>,
}

impl MemoryStore {
    /// Create a store accepting the kinds in `schemas`.
    pub fn new(schemas: Schemas) -> Self {
        Self::builder(schemas).build()
    }

    /// Create a builder.
    pub fn builder(schemas: Schemas) -> MemoryStoreBuilder {
        MemoryStoreBuilder {
            schemas,
            retain_zombies: false,
        }
    }

    /// Total number of live configs.
    pub fn len(&self) -> usize {
        self.data
            .read()
            .values()
            .flat_map(HashMap::values)
            .map(|b| b.len())
            .sum()
    }

    /// Whether the store holds no configs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_kind(&self, gvk: &GroupVersionKind) -> Result<()> {
        if self.schemas.contains(gvk) {
            Ok(())
        } else {
            Err(ConfigError::UnknownType { gvk: gvk.clone() })
        }
    }

    fn bury(&self, meta: ConfigMeta) {
        if let Some(zombies) = &self.zombies {
            let mut meta = meta;
            meta.resource_version = ResourceVersion::now().into_inner();
            let key = (meta.namespace.clone(), meta.name.clone());
            zombies
                .lock()
                .entry(meta.gvk.clone())
                .or_default()
                .insert(key, meta);
        }
    }

    fn unbury(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) {
        if let Some(zombies) = &self.zombies {
            if let Some(kind) = zombies.lock().get_mut(gvk) {
                kind.remove(&(namespace.to_string(), name.to_string()));
            }
        }
    }
}

/// Take the requested version out of the annotations, or stamp a fresh one.
fn assign_version(meta: &mut ConfigMeta) -> ResourceVersion {
    let requested = meta.annotations.remove(RESOURCE_VERSION_ANNOTATION);
    let version = match requested {
        Some(v) if !v.is_empty() => ResourceVersion::new(v),
        _ => ResourceVersion::now(),
    };
    meta.resource_version = version.as_str().to_string();
    version
}

impl ConfigReader for MemoryStore {
    fn schemas(&self) -> Schemas {
        self.schemas.clone()
    }

    fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Option<Config> {
        let bucket = self.data.read().get(gvk)?.get(namespace).cloned()?;
        let found = bucket.get(name).map(|r| r.value().clone());
        trace!(gvk = %gvk, namespace, name, hit = found.is_some(), "get");
        found
    }

    fn list(&self, gvk: Option<&GroupVersionKind>, namespace: &str) -> Result<Vec<Config>> {
        let data = self.data.read();
        let kinds: Vec<&GroupVersionKind> = match gvk {
            Some(gvk) => vec![gvk],
            None => self.schemas.iter().collect(),
        };

        let mut out = Vec::new();
        for kind in kinds {
            let Some(namespaces) = data.get(kind) else {
                continue;
            };
            if namespace.is_empty() {
                for bucket in namespaces.values() {
                    out.extend(bucket.iter().map(|r| r.value().clone()));
                }
            } else if let Some(bucket) = namespaces.get(namespace) {
                out.extend(bucket.iter().map(|r| r.value().clone()));
            }
        }
        Ok(out)
    }
}

impl ConfigStore for MemoryStore {
    fn create(&self, cfg: Config) -> Result<ResourceVersion> {
        let Config { mut meta, spec } = cfg;
        self.check_kind(&meta.gvk)?;

        let mut data = self.data.write();
        let bucket = data
            .entry(meta.gvk.clone())
            .or_default()
            .entry(meta.namespace.clone())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone();
        if bucket.contains_key(&meta.name) {
            return Err(ConfigError::already_exists(&meta.gvk, &meta.namespace, &meta.name));
        }

        let version = assign_version(&mut meta);
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Utc::now());
        }
        self.unbury(&meta.gvk, &meta.namespace, &meta.name);

        debug!(gvk = %meta.gvk, namespace = %meta.namespace, name = %meta.name, version = %version, "created config");
        bucket.insert(meta.name.clone(), Config { meta, spec });
        Ok(version)
    }

    fn update(&self, cfg: Config) -> Result<ResourceVersion> {
        let Config { mut meta, spec } = cfg;
        self.check_kind(&meta.gvk)?;

        let data = self.data.write();
        let Some(bucket) = data.get(&meta.gvk).and_then(|ns| ns.get(&meta.namespace)) else {
            return Err(ConfigError::not_found(&meta.gvk, &meta.namespace, &meta.name));
        };
        let Some(mut entry) = bucket.get_mut(&meta.name) else {
            return Err(ConfigError::not_found(&meta.gvk, &meta.namespace, &meta.name));
        };

        if meta.requested_version() == Some(entry.meta.resource_version.as_str()) {
            trace!(gvk = %meta.gvk, namespace = %meta.namespace, name = %meta.name, "update is a no-op");
            return Ok(ResourceVersion::new(entry.meta.resource_version.clone()));
        }

        let version = assign_version(&mut meta);
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = entry.meta.creation_timestamp;
        }

        debug!(gvk = %meta.gvk, namespace = %meta.namespace, name = %meta.name, version = %version, "updated config");
        *entry = Config { meta, spec };
        Ok(version)
    }

    fn delete(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Result<()> {
        self.check_kind(gvk)?;

        let data = self.data.write();
        let removed = data
            .get(gvk)
            .and_then(|ns| ns.get(namespace))
            .and_then(|bucket| bucket.remove(name));
        match removed {
            Some((_, cfg)) => {
                debug!(gvk = %gvk, namespace, name, "deleted config");
                self.bury(cfg.meta);
                Ok(())
            }
            None => Err(ConfigError::not_found(gvk, namespace, name)),
        }
    }

    fn zombies(&self, gvk: &GroupVersionKind) -> Vec<ConfigMeta> {
        let Some(zombies) = &self.zombies else {
            return Vec::new();
        };
        let zombies = zombies.lock();
        let mut out: Vec<_> = zombies
            .get(gvk)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        out
    }

    fn gc_zombies(&self) -> usize {
        let Some(zombies) = &self.zombies else {
            return 0;
        };
        let mut zombies = zombies.lock();
        let count = zombies.values().map(HashMap::len).sum();
        zombies.clear();
        if count > 0 {
            debug!(count, "collected zombie configs");
        }
        count
    }
}

/// Builder for [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryStoreBuilder {
    schemas: Schemas,
    retain_zombies: bool,
}

impl MemoryStoreBuilder {
    /// Keep metadata of deleted configs until [`ConfigStore::gc_zombies`].
    pub fn retain_zombies(mut self, retain: bool) -> Self {
        self.retain_zombies = retain;
        self
    }

    /// Build the store.
    pub fn build(self) -> MemoryStore {
        let data = self
            .schemas
            .iter()
            .map(|gvk| (gvk.clone(), HashMap::new()))
            .collect();
        MemoryStore {
            schemas: self.schemas,
            data: RwLock::new(data),
            zombies: self.retain_zombies.then(|| Mutex::new(HashMap::new())),
        }
    }
}
