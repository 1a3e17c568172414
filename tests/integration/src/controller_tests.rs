//! Config controller assembly and configuration.

use std::sync::Arc;

use meshcfg_controller::{ConfigController, ConfigSource, ControllerConfig};
use meshcfg_core::{Config, ConfigError, ConfigEvent, ConfigMeta, GroupVersionKind, Spec};
use meshcfg_store::SourceKind;

#[test]
fn config_document_with_defaults() {
    let config: ControllerConfig = serde_json::from_value(serde_json::json!({
        "configSources": [{ "address": "k8s://" }, { "address": "xds://istiod:15010?types=Sidecar" }],
        "joinRetry": { "attempts": 5 },
        "incrementalPush": true,
    }))
    .unwrap();

    assert_eq!(config.join_retry.attempts, 5);
    assert_eq!(config.join_retry.pause_ms, 1);
    assert_eq!(config.node_id, "meshcfg");
    assert!(!config.translate_services);
    assert!(config.incremental_push);

    let sources = config.sources().unwrap();
    assert!(matches!(sources[0], ConfigSource::Kubernetes { .. }));
    assert_eq!(
        sources[1],
        ConfigSource::Xds {
            address: "xds://istiod:15010?types=Sidecar".to_string(),
            endpoint: "istiod:15010".to_string(),
            types: vec!["Sidecar".to_string()],
        }
    );
}

#[test]
fn invalid_configs_are_rejected() {
    let bad_scheme = ControllerConfig::builder().source("ftp://nowhere").build().unwrap_err();
    assert!(matches!(bad_scheme, ConfigError::InvalidConfigSource { .. }));

    let no_buffer = ControllerConfig::builder()
        .source("k8s://")
        .event_buffer(0)
        .build()
        .unwrap_err();
    assert!(matches!(no_buffer, ConfigError::Configuration(_)));

    assert!(ControllerConfig::builder().build().is_err());
}

#[test]
fn handlers_reach_every_serving_controller() {
    let config = ControllerConfig::builder()
        .source("k8s://")
        .source("k8s://second")
        .build()
        .unwrap();
    let controller = ConfigController::new(config).unwrap();
    let handler = Arc::new(|_: &ConfigEvent| {});

    controller
        .register_event_handler(&GroupVersionKind::POD, handler.clone())
        .unwrap();
    let counts: Vec<usize> = controller
        .controllers()
        .iter()
        .map(|c| c.monitor().handler_count(&GroupVersionKind::POD))
        .collect();
    assert_eq!(counts, vec![0, 1, 1]);

    controller
        .register_event_handler(&GroupVersionKind::ISTIO_SERVICE, handler)
        .unwrap();
    assert_eq!(
        controller
            .builtin()
            .monitor()
            .handler_count(&GroupVersionKind::ISTIO_SERVICE),
        1
    );
}

#[test]
fn readiness_waits_for_every_source() {
    let config = ControllerConfig::builder()
        .source("k8s://")
        .source("k8s://second")
        .build()
        .unwrap();
    let controller = ConfigController::new(config).unwrap();
    assert!(!controller.init_ready());

    let sources: Vec<_> = controller
        .controllers()
        .iter()
        .filter(|c| c.kind() == SourceKind::Kubernetes)
        .cloned()
        .collect();
    sources[0].set_ready(true);
    assert!(!controller.init_ready());
    sources[1].set_ready(true);
    assert!(controller.init_ready());

    assert_eq!(sources[1].source(), Some("k8s://second"));
}

#[tokio::test]
async fn deletions_are_kept_as_zombies_for_incremental_push() {
    let config = ControllerConfig::builder()
        .source("k8s://")
        .incremental_push(true)
        .build()
        .unwrap();
    let controller = ConfigController::new(config).unwrap();
    let builtin = controller.builtin();
    for name in ["a", "b"] {
        let meta = ConfigMeta::new(GroupVersionKind::SIDECAR, "default", name);
        builtin
            .create(Config::new(meta, Spec::Json(serde_json::json!({}))))
            .await
            .unwrap();
    }
    builtin
        .delete(&GroupVersionKind::SIDECAR, "default", "a")
        .await
        .unwrap();

    let zombies = controller.zombies(&GroupVersionKind::SIDECAR);
    assert_eq!(zombies.len(), 1);
    assert_eq!(zombies[0].name, "a");
    assert!(!zombies[0].resource_version.is_empty());

    assert_eq!(controller.gc_zombies(), 1);
    assert!(controller.zombies(&GroupVersionKind::SIDECAR).is_empty());
    assert_eq!(controller.gc_zombies(), 0);
}

#[tokio::test]
async fn deletions_are_not_retained_without_incremental_push() {
    let controller = ConfigController::new(ControllerConfig::builder().source("k8s://").build().unwrap()).unwrap();
    let meta = ConfigMeta::new(GroupVersionKind::SIDECAR, "default", "a");
    controller
        .builtin()
        .create(Config::new(meta, Spec::Json(serde_json::json!({}))))
        .await
        .unwrap();
    controller
        .builtin()
        .delete(&GroupVersionKind::SIDECAR, "default", "a")
        .await
        .unwrap();

    assert!(controller.zombies(&GroupVersionKind::SIDECAR).is_empty());
    assert_eq!(controller.gc_zombies(), 0);
}
