//! MCP-over-xDS sources driven through the config controller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshcfg_controller::source::codec::encode_resource;
use meshcfg_controller::{fact_key, ConfigController, ControllerConfig, McpConnector, McpStream};
use meshcfg_core::{Config, ConfigError, ConfigMeta, GroupVersionKind, Result};
use meshcfg_store::{ConfigReader, SourceKind, StopHandle};
use meshcfg_types::{
    DiscoveryResponse, McpRequest, McpResource, McpResponse, ServiceEntrySpec, ServicePort, WorkloadEntry,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::support::{init_tracing, wait_until};

struct ChannelStream {
    requests: mpsc::UnboundedSender<McpRequest>,
    responses: mpsc::UnboundedReceiver<McpResponse>,
}

#[async_trait]
impl McpStream for ChannelStream {
    async fn send(&mut self, request: McpRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|e| ConfigError::transport("peer gone", e))
    }

    async fn recv(&mut self) -> Result<Option<McpResponse>> {
        Ok(self.responses.recv().await)
    }
}

/// Hands out queued streams; `None` entries and an empty queue refuse.
#[derive(Default)]
struct ScriptedConnector {
    streams: Mutex<VecDeque<Option<ChannelStream>>>,
    attempts: AtomicUsize,
}

#[async_trait]
impl McpConnector for ScriptedConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn McpStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.streams.lock().pop_front().flatten() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(ConfigError::Transport {
                message: format!("{endpoint} refused"),
                source: None,
            }),
        }
    }
}

struct Peer {
    requests: mpsc::UnboundedReceiver<McpRequest>,
    responses: mpsc::UnboundedSender<McpResponse>,
}

impl Peer {
    async fn next_request(&mut self) -> McpRequest {
        tokio::time::timeout(Duration::from_secs(2), self.requests.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

fn stream() -> (ChannelStream, Peer) {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (resp_tx, resp_rx) = mpsc::unbounded_channel();
    (
        ChannelStream {
            requests: req_tx,
            responses: resp_rx,
        },
        Peer {
            requests: req_rx,
            responses: resp_tx,
        },
    )
}

fn service_entry(name: &str, host: &str) -> McpResource {
    let spec = ServiceEntrySpec {
        hosts: vec![host.to_string()],
        ports: vec![ServicePort {
            number: 443,
            name: "https".to_string(),
            protocol: "HTTPS".to_string(),
            ..Default::default()
        }],
        endpoints: vec![WorkloadEntry {
            address: "1.1.1.1".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let meta = ConfigMeta::new(GroupVersionKind::SERVICE_ENTRY, "external", name);
    encode_resource(&Config::new(meta, spec)).unwrap()
}

fn controller(connector: Arc<ScriptedConnector>) -> Arc<ConfigController> {
    init_tracing();
    let config = ControllerConfig::builder()
        .source("xds://mesh-peer:15010?types=ServiceEntry")
        .translate_services(true)
        .reconnect_backoff(Duration::from_millis(10))
        .build()
        .unwrap();
    let controller = ConfigController::builder()
        .config(config)
        .mcp_connector(connector)
        .build()
        .unwrap();
    Arc::new(controller)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_service_entries_are_stored_and_mirrored() {
    let (client, mut peer) = stream();
    let connector = Arc::new(ScriptedConnector::default());
    connector.streams.lock().push_back(Some(client));
    let controller = controller(Arc::clone(&connector));

    let stop = StopHandle::new();
    let running = {
        let (controller, signal) = (Arc::clone(&controller), stop.signal());
        tokio::spawn(async move { controller.run(signal).await })
    };

    let McpRequest::Sotw(sub) = peer.next_request().await else {
        panic!("expected a state-of-the-world subscription");
    };
    assert_eq!(sub.type_url, GroupVersionKind::SERVICE_ENTRY.type_url());
    assert_eq!(sub.node.as_ref().map(|n| n.id.as_str()), Some("meshcfg"));
    assert!(!controller.init_ready());

    peer.responses
        .send(McpResponse::Sotw(DiscoveryResponse {
            version_info: "v1".into(),
            resources: vec![service_entry("api", "api.example.com")],
            type_url: sub.type_url.clone(),
            nonce: "n1".into(),
        }))
        .unwrap();
    let McpRequest::Sotw(ack) = peer.next_request().await else {
        panic!("expected an ack");
    };
    assert_eq!(ack.response_nonce, "n1");
    assert!(ack.error_detail.is_none());
    assert!(controller.init_ready());

    let remote = controller.controller(SourceKind::Xds).unwrap();
    let stored = remote
        .get(&GroupVersionKind::SERVICE_ENTRY, "external", "api")
        .unwrap();
    assert_eq!(stored.spec.as_service_entry().map(|se| se.hosts.clone()), Some(vec!["api.example.com".to_string()]));
    assert!(controller
        .get(&GroupVersionKind::SERVICE_ENTRY, "external", "api")
        .is_some());

    let key = fact_key("external", "api.example.com");
    wait_until(|| controller.shared_facts().get(&key).is_some()).await;
    assert!(controller
        .builtin()
        .get(&GroupVersionKind::ISTIO_SERVICE, "external", "api.example.com")
        .is_some());

    stop.stop();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connections_are_retried() {
    let (client, mut peer) = stream();
    let connector = Arc::new(ScriptedConnector::default());
    {
        let mut streams = connector.streams.lock();
        streams.push_back(None);
        streams.push_back(None);
        streams.push_back(Some(client));
    }
    let controller = controller(Arc::clone(&connector));

    let stop = StopHandle::new();
    let running = {
        let (controller, signal) = (Arc::clone(&controller), stop.signal());
        tokio::spawn(async move { controller.run(signal).await })
    };

    let sub = peer.next_request().await;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(sub.type_url(), GroupVersionKind::SERVICE_ENTRY.type_url());

    stop.stop();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
