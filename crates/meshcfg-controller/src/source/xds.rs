//! MCP-over-xDS source.
//!
//! The session subscribes to every wanted collection, then applies each
//! response to the source's controller and acknowledges it:
//!
//! - state-of-the-world responses replace the whole collection
//! - delta responses add, update and remove individual resources
//! - a response that fails to decode changes nothing and is NACKed
//!
//! The controller becomes ready once every subscribed collection has seen a
//! first response. A failed session is retried after a fixed backoff until
//! stop is requested.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshcfg_core::{Config, ConfigError, GroupVersionKind, Result};
use meshcfg_store::{ConfigReader, MonitorController, StopSignal};
use meshcfg_types::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse, McpRequest,
    McpResource, McpResponse, Node, Status,
};
use tracing::{debug, info, warn};

use super::codec::decode_resource;
use crate::initial::{filter_requests, initial_requests};

/// gRPC `INVALID_ARGUMENT`, sent with NACKs.
const INVALID_ARGUMENT: i32 = 3;

/// Opens MCP streams.
///
/// The gRPC binding lives outside this crate; tests use in-memory channels.
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Open a stream to `endpoint` (`host:port`).
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn McpStream>>;
}

/// One bidirectional MCP stream.
#[async_trait]
pub trait McpStream: Send {
    /// Send a request.
    async fn send(&mut self, request: McpRequest) -> Result<()>;

    /// Next response, or `None` once the peer closed the stream.
    async fn recv(&mut self) -> Result<Option<McpResponse>>;
}

/// Mirrors a remote MCP peer into a [`MonitorController`].
pub struct XdsSource {
    controller: Arc<MonitorController>,
    endpoint: String,
    types: Vec<String>,
    connector: Arc<dyn McpConnector>,
    node: Node,
    incremental: bool,
    backoff: Duration,
}

impl fmt::Debug for XdsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XdsSource")
            .field("endpoint", &self.endpoint)
            .field("types", &self.types)
            .field("incremental", &self.incremental)
            .finish()
    }
}

impl XdsSource {
    /// Create a source dialing `endpoint` and writing into `controller`.
    pub fn new(
        controller: Arc<MonitorController>,
        endpoint: impl Into<String>,
        types: Vec<String>,
        connector: Arc<dyn McpConnector>,
    ) -> Self {
        Self {
            controller,
            endpoint: endpoint.into(),
            types,
            connector,
            node: Node::default(),
            incremental: false,
            backoff: Duration::from_secs(1),
        }
    }

    /// Identify as `node`.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.node = node;
        self
    }

    /// Use delta requests.
    #[must_use]
    pub fn incremental(mut self, enabled: bool) -> Self {
        self.incremental = enabled;
        self
    }

    /// Wait `backoff` between sessions.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Subscriptions sent at the start of every session.
    pub fn initial_requests(&self) -> Vec<DiscoveryRequest> {
        filter_requests(
            initial_requests(&self.controller.schemas(), Some(self.node.clone())),
            &self.types,
        )
    }

    /// Run sessions until `stop` fires.
    pub async fn run(self, stop: StopSignal) {
        info!(endpoint = %self.endpoint, incremental = self.incremental, "starting xds source");
        while !stop.is_stopped() {
            let outcome = match self.connector.connect(&self.endpoint).await {
                Ok(stream) => self.session(stream, &stop).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => break,
                Err(err) => {
                    warn!(endpoint = %self.endpoint, error = %err, backoff = ?self.backoff, "xds session failed");
                }
            }
            tokio::select! {
                _ = stop.clone().wait() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
        info!(endpoint = %self.endpoint, "xds source stopped");
    }

    async fn session(&self, mut stream: Box<dyn McpStream>, stop: &StopSignal) -> Result<()> {
        let requests = self.initial_requests();
        if requests.is_empty() {
            warn!(endpoint = %self.endpoint, types = ?self.types, "no collections to subscribe");
            self.controller.set_ready(true);
            stop.clone().wait().await;
            return Ok(());
        }

        let mut pending: HashSet<String> = requests.iter().map(|r| r.type_url.clone()).collect();
        let mut accepted: HashMap<String, String> = HashMap::new();
        for request in requests {
            let request = if self.incremental {
                McpRequest::Delta(request.to_delta())
            } else {
                McpRequest::Sotw(request)
            };
            stream.send(request).await?;
        }
        info!(endpoint = %self.endpoint, collections = pending.len(), "subscribed");

        let stopped = stop.clone().wait();
        tokio::pin!(stopped);
        loop {
            let response = tokio::select! {
                _ = &mut stopped => return Ok(()),
                response = stream.recv() => response?,
            };
            let Some(response) = response else {
                return Err(ConfigError::Transport {
                    message: format!("stream to {} closed by peer", self.endpoint),
                    source: None,
                });
            };

            let type_url = response.type_url().to_string();
            let reply = match response {
                McpResponse::Sotw(r) => McpRequest::Sotw(self.apply_sotw(r, &mut accepted).await?),
                McpResponse::Delta(r) => McpRequest::Delta(self.apply_delta(r).await?),
            };
            // A rejected response leaves the collection unsynced.
            if !reply.is_nack() && pending.remove(&type_url) && pending.is_empty() {
                info!(endpoint = %self.endpoint, "initial sync complete");
                self.controller.set_ready(true);
            }
            stream.send(reply).await?;
        }
    }

    fn collection(&self, type_url: &str) -> Result<GroupVersionKind> {
        let gvk: GroupVersionKind = type_url.parse()?;
        if !self.controller.schemas().contains(&gvk) {
            return Err(ConfigError::UnknownType { gvk });
        }
        Ok(gvk)
    }

    fn decode_all(&self, gvk: &GroupVersionKind, resources: &[McpResource]) -> Result<Vec<Config>> {
        let mut configs = Vec::with_capacity(resources.len());
        for resource in resources {
            if let Some(cfg) = decode_resource(gvk, resource)? {
                configs.push(cfg);
            }
        }
        Ok(configs)
    }

    /// Write `configs`, logging failures. Only shutdown aborts.
    async fn write_all(&self, configs: Vec<Config>) -> Result<()> {
        for cfg in configs {
            let key = cfg.meta.key();
            match self.controller.apply(cfg).await {
                Ok(_) => {}
                Err(ConfigError::Shutdown) => return Err(ConfigError::Shutdown),
                Err(err) => warn!(key = %key, error = %err, "failed to apply mcp resource"),
            }
        }
        Ok(())
    }

    async fn remove(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Result<()> {
        match self.controller.delete(gvk, namespace, name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(ConfigError::Shutdown) => Err(ConfigError::Shutdown),
            Err(err) => {
                warn!(gvk = %gvk, namespace, name, error = %err, "failed to remove mcp resource");
                Ok(())
            }
        }
    }

    async fn apply_sotw(
        &self,
        response: DiscoveryResponse,
        accepted: &mut HashMap<String, String>,
    ) -> Result<DiscoveryRequest> {
        let decoded = self
            .collection(&response.type_url)
            .and_then(|gvk| Ok((self.decode_all(&gvk, &response.resources)?, gvk)));
        let (configs, gvk) = match decoded {
            Ok(ok) => ok,
            Err(err) => {
                warn!(type_url = %response.type_url, nonce = %response.nonce, error = %err, "rejecting response");
                return Ok(DiscoveryRequest {
                    version_info: accepted.get(&response.type_url).cloned().unwrap_or_default(),
                    node: Some(self.node.clone()),
                    type_url: response.type_url,
                    response_nonce: response.nonce,
                    error_detail: Some(nack(&err)),
                    ..Default::default()
                });
            }
        };

        let keep: HashSet<(String, String)> = configs
            .iter()
            .map(|c| (c.namespace().to_string(), c.name().to_string()))
            .collect();
        debug!(type_url = %response.type_url, resources = configs.len(), "applying snapshot");
        self.write_all(configs).await?;

        for stale in self.controller.list(Some(&gvk), "")? {
            if !keep.contains(&(stale.namespace().to_string(), stale.name().to_string())) {
                self.remove(&gvk, stale.namespace(), stale.name()).await?;
            }
        }

        accepted.insert(response.type_url.clone(), response.version_info.clone());
        Ok(DiscoveryRequest {
            version_info: response.version_info,
            node: Some(self.node.clone()),
            type_url: response.type_url,
            response_nonce: response.nonce,
            ..Default::default()
        })
    }

    async fn apply_delta(&self, response: DeltaDiscoveryResponse) -> Result<DeltaDiscoveryRequest> {
        let decoded = self
            .collection(&response.type_url)
            .and_then(|gvk| Ok((self.decode_all(&gvk, &response.resources)?, gvk)));
        let (configs, gvk) = match decoded {
            Ok(ok) => ok,
            Err(err) => {
                warn!(type_url = %response.type_url, nonce = %response.nonce, error = %err, "rejecting delta");
                return Ok(DeltaDiscoveryRequest {
                    node: Some(self.node.clone()),
                    type_url: response.type_url,
                    response_nonce: response.nonce,
                    error_detail: Some(nack(&err)),
                    ..Default::default()
                });
            }
        };

        debug!(
            type_url = %response.type_url,
            changed = configs.len(),
            removed = response.removed_resources.len(),
            "applying delta"
        );
        self.write_all(configs).await?;
        for removed in &response.removed_resources {
            let (namespace, name) = removed.split_once('/').unwrap_or(("", removed.as_str()));
            self.remove(&gvk, namespace, name).await?;
        }

        Ok(DeltaDiscoveryRequest {
            node: Some(self.node.clone()),
            type_url: response.type_url,
            response_nonce: response.nonce,
            ..Default::default()
        })
    }
}

fn nack(err: &ConfigError) -> Status {
    Status {
        code: INVALID_ARGUMENT,
        message: err.to_string(),
    }
}
