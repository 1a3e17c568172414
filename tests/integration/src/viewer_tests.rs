//! Federated read view tests.

use std::sync::Arc;

use meshcfg_core::{Config, ConfigError, ConfigMeta, GroupVersionKind, Result, Schemas, Spec};
use meshcfg_store::{ConfigReader, ConfigStore, MemoryStore, ViewerStore};
use serde_json::json;

/// A reader whose listings always fail.
struct Broken;

impl ConfigReader for Broken {
    fn schemas(&self) -> Schemas {
        Schemas::builtin()
    }

    fn get(&self, _: &GroupVersionKind, _: &str, _: &str) -> Option<Config> {
        None
    }

    fn list(&self, _: Option<&GroupVersionKind>, _: &str) -> Result<Vec<Config>> {
        Err(ConfigError::Transport {
            message: "peer unavailable".into(),
            source: None,
        })
    }
}

fn gateway(namespace: &str, name: &str, owner: &str) -> Config {
    Config::new(
        ConfigMeta::new(GroupVersionKind::GATEWAY, namespace, name),
        Spec::Json(json!({ "owner": owner })),
    )
}

fn store_with(configs: &[Config]) -> Arc<MemoryStore> {
    let store = MemoryStore::new(Schemas::builtin());
    for cfg in configs {
        store.create(cfg.clone()).unwrap();
    }
    Arc::new(store)
}

#[test]
fn first_reader_wins_and_listings_merge() {
    let first = store_with(&[gateway("default", "gw", "first")]);
    let second = store_with(&[gateway("default", "gw", "second"), gateway("istio-system", "ingress", "second")]);

    let mut viewer = ViewerStore::new();
    viewer.register(first);
    viewer.register(second);

    let got = viewer.get(&GroupVersionKind::GATEWAY, "default", "gw").unwrap();
    assert_eq!(*got.spec, Spec::Json(json!({ "owner": "first" })));

    let listing = viewer.list(Some(&GroupVersionKind::GATEWAY), "");
    assert!(listing.is_complete());
    assert_eq!(listing.configs.len(), 2);

    let scoped = viewer.list(Some(&GroupVersionKind::GATEWAY), "istio-system");
    assert_eq!(scoped.configs.len(), 1);
    assert_eq!(scoped.configs[0].name(), "ingress");
}

#[test]
fn failing_reader_keeps_partial_results() {
    let healthy = store_with(&[gateway("default", "gw", "healthy")]);
    let mut viewer = ViewerStore::new();
    viewer.register(Arc::new(Broken));
    viewer.register(healthy);

    let listing = viewer.list(Some(&GroupVersionKind::GATEWAY), "");
    assert!(!listing.is_complete());
    assert_eq!(listing.errors.len(), 1);

    let (configs, err) = listing.into_parts();
    assert_eq!(configs.len(), 1);
    assert!(err.unwrap().to_string().contains("peer unavailable"));

    assert!(viewer
        .list(Some(&GroupVersionKind::GATEWAY), "")
        .into_result()
        .is_err());
}

#[test]
fn schemas_are_the_union_of_readers() {
    let mut viewer = ViewerStore::new();
    viewer.register(Arc::new(MemoryStore::new(Schemas::kube())));
    viewer.register(Arc::new(MemoryStore::new(Schemas::builtin())));

    let schemas = viewer.schemas();
    assert!(schemas.contains(&GroupVersionKind::POD));
    assert!(schemas.contains(&GroupVersionKind::ISTIO_SERVICE));
    assert_eq!(viewer.reader_count(&GroupVersionKind::SERVICE_ENTRY), 2);
    assert_eq!(viewer.reader_count(&GroupVersionKind::POD), 1);

    // Kinds nobody serves list as empty.
    let unknown = GroupVersionKind::new("example.com", "v1", "Widget");
    let listing = viewer.list(Some(&unknown), "");
    assert!(listing.is_complete());
    assert!(listing.configs.is_empty());
}
