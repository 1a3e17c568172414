//! Store and monitor integration tests.

use std::sync::Arc;

use meshcfg_core::{Config, ConfigError, ConfigMeta, Event, GroupVersionKind, Schemas, Spec};
use meshcfg_store::{ConfigReader, MemoryStore, MonitorController, SourceKind, StopHandle};
use serde_json::json;

use crate::support::Recorder;

fn sidecar(name: &str, egress: u32) -> Config {
    Config::new(
        ConfigMeta::new(GroupVersionKind::SIDECAR, "default", name),
        Spec::Json(json!({ "egress": egress })),
    )
}

fn started(controller: &Arc<MonitorController>, stop: &StopHandle) -> tokio::task::JoinHandle<()> {
    let (controller, signal) = (Arc::clone(controller), stop.signal());
    tokio::spawn(async move { controller.run(signal).await })
}

#[tokio::test]
async fn store_lifecycle_emits_one_event_per_change() {
    let controller = Arc::new(MonitorController::in_memory(SourceKind::Builtin, Schemas::builtin()));
    let recorder = Recorder::default();
    controller
        .register_event_handler(&GroupVersionKind::SIDECAR, recorder.handler())
        .unwrap();
    let stop = StopHandle::new();
    let task = started(&controller, &stop);

    let v1 = controller.create(sidecar("a", 1)).await.unwrap();

    // Writing back the stored version is a no-op.
    let mut same = sidecar("a", 2);
    same.meta = same.meta.with_resource_version(v1.as_str());
    assert_eq!(controller.update(same).await.unwrap(), v1);
    let stored = controller.get(&GroupVersionKind::SIDECAR, "default", "a").unwrap();
    assert_eq!(*stored.spec, Spec::Json(json!({ "egress": 1 })));

    let v2 = controller.update(sidecar("a", 3)).await.unwrap();
    assert_ne!(v1, v2);
    controller.delete(&GroupVersionKind::SIDECAR, "default", "a").await.unwrap();

    let events = recorder.wait_for(3).await;
    assert_eq!(
        events,
        vec![
            (Event::Add, "a".to_string()),
            (Event::Update, "a".to_string()),
            (Event::Delete, "a".to_string()),
        ]
    );

    let err = controller
        .delete(&GroupVersionKind::SIDECAR, "default", "a")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    stop.stop();
    task.await.unwrap();
}

#[tokio::test]
async fn events_are_delivered_in_write_order() {
    let controller = Arc::new(MonitorController::in_memory(SourceKind::Builtin, Schemas::builtin()));
    let recorder = Recorder::default();
    controller
        .register_event_handler(&GroupVersionKind::SIDECAR, recorder.handler())
        .unwrap();
    let stop = StopHandle::new();
    let task = started(&controller, &stop);

    let names: Vec<String> = (0..200).map(|i| format!("sc-{i:03}")).collect();
    for name in &names {
        controller.create(sidecar(name, 0)).await.unwrap();
    }

    let events = recorder.wait_for(names.len()).await;
    let delivered: Vec<String> = events.into_iter().map(|(_, name)| name).collect();
    assert_eq!(delivered, names);
    let stats = controller.monitor().stats();
    crate::support::wait_until(|| stats.delivered() == names.len() as u64).await;
    assert_eq!(stats.dropped(), 0);

    stop.stop();
    task.await.unwrap();
}

#[tokio::test]
async fn update_carries_previous_value() {
    let controller = Arc::new(MonitorController::in_memory(SourceKind::Builtin, Schemas::builtin()));
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller
        .register_event_handler(
            &GroupVersionKind::SIDECAR,
            Arc::new(move |ev: &meshcfg_core::ConfigEvent| {
                if let Some(old) = ev.old() {
                    sink.lock().push(((*old.spec).clone(), (*ev.config().spec).clone()));
                }
            }),
        )
        .unwrap();
    let stop = StopHandle::new();
    let task = started(&controller, &stop);

    controller.apply(sidecar("a", 1)).await.unwrap();
    controller.apply(sidecar("a", 2)).await.unwrap();

    crate::support::wait_until(|| !seen.lock().is_empty()).await;
    assert_eq!(
        seen.lock()[0],
        (Spec::Json(json!({ "egress": 1 })), Spec::Json(json!({ "egress": 2 })))
    );

    stop.stop();
    task.await.unwrap();
}

#[test]
fn unknown_kind_is_rejected() {
    let store = MemoryStore::new(Schemas::kube());
    let err = meshcfg_store::ConfigStore::create(&store, sidecar("a", 0)).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownType { .. }));
    assert!(store.list(Some(&GroupVersionKind::SIDECAR), "").unwrap().is_empty());
}

#[test]
fn zombies_are_retained_until_collected() {
    use meshcfg_store::ConfigStore;

    let store = MemoryStore::builder(Schemas::builtin()).retain_zombies(true).build();
    store.create(sidecar("a", 0)).unwrap();
    store.create(sidecar("b", 0)).unwrap();
    store.delete(&GroupVersionKind::SIDECAR, "default", "a").unwrap();

    let zombies = store.zombies(&GroupVersionKind::SIDECAR);
    assert_eq!(zombies.len(), 1);
    assert_eq!(zombies[0].name, "a");

    // Re-creating revives the key.
    store.create(sidecar("a", 1)).unwrap();
    assert!(store.zombies(&GroupVersionKind::SIDECAR).is_empty());

    store.delete(&GroupVersionKind::SIDECAR, "default", "b").unwrap();
    assert_eq!(store.gc_zombies(), 1);
    assert!(store.zombies(&GroupVersionKind::SIDECAR).is_empty());
}
