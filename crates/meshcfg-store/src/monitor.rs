//! Per-store event dispatch.
//!
//! A [`Monitor`] owns a bounded queue of [`ConfigEvent`]s and one handler list
//! per kind of its store's schema. [`Monitor::run`] is the single consumer:
//! it takes events in the order they were scheduled and calls every handler
//! registered for the event's kind, in registration order.
//!
//! Handlers run on the blocking thread pool and the loop waits for them
//! before taking the next event. A slow handler therefore delays every later
//! event of the same monitor, whatever its kind, and a full queue makes
//! [`Monitor::schedule_process_event`] wait. Handlers may block, but must not
//! schedule events on the monitor that is calling them.

use std::collections::HashMap;
use std::sync::Arc;

use meshcfg_core::{ConfigError, ConfigEvent, GroupVersionKind, Result, Schemas};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::stats::MonitorStats;
use crate::stop::StopSignal;

/// Default queue capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// Callback invoked for each event of a kind.
pub type EventHandler = Arc<dyn Fn(&ConfigEvent) + Send + Sync>;

/// Bounded, single-consumer event dispatcher.
pub struct Monitor {
    handlers: RwLock<HashMap<GroupVersionKind, Vec<EventHandler>>>,
    tx: mpsc::Sender<ConfigEvent>,
    rx: Mutex<Option<mpsc::Receiver<ConfigEvent>>>,
    stats: MonitorStats,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("kinds", &self.handlers.read().len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Monitor {
    /// Create a monitor for `schemas` with the default queue capacity.
    pub fn new(schemas: &Schemas) -> Self {
        Self::with_buffer_size(schemas, DEFAULT_EVENT_BUFFER)
    }

    /// Create a monitor with a custom queue capacity (minimum 1).
    pub fn with_buffer_size(schemas: &Schemas, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handlers = schemas.iter().map(|gvk| (gvk.clone(), Vec::new())).collect();
        Self {
            handlers: RwLock::new(handlers),
            tx,
            rx: Mutex::new(Some(rx)),
            stats: MonitorStats::new(),
        }
    }

    /// Register `handler` for events of `gvk`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownType`] if `gvk` is not in the schema.
    pub fn append_event_handler(&self, gvk: &GroupVersionKind, handler: EventHandler) -> Result<()> {
        let mut handlers = self.handlers.write();
        let list = handlers
            .get_mut(gvk)
            .ok_or_else(|| ConfigError::UnknownType { gvk: gvk.clone() })?;
        list.push(handler);
        debug!(gvk = %gvk, handlers = list.len(), "registered event handler");
        Ok(())
    }

    /// Number of handlers registered for `gvk`.
    pub fn handler_count(&self, gvk: &GroupVersionKind) -> usize {
        self.handlers.read().get(gvk).map_or(0, Vec::len)
    }

    /// Enqueue an event, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Shutdown`] once the monitor loop has exited.
    pub async fn schedule_process_event(&self, event: ConfigEvent) -> Result<()> {
        trace!(gvk = %event.gvk(), event = %event.event(), "scheduling event");
        self.tx.send(event).await.map_err(|_| ConfigError::Shutdown)?;
        self.stats.record_scheduled();
        Ok(())
    }

    /// Statistics.
    #[inline]
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Drain the queue until `stop` fires.
    ///
    /// Only the first call runs; later calls return immediately.
    pub async fn run(&self, stop: StopSignal) {
        let Some(mut rx) = self.rx.lock().take() else {
            warn!("monitor is already running");
            return;
        };

        info!("monitor started");
        let stopped = stop.wait();
        tokio::pin!(stopped);

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                event = rx.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
            }
        }

        // Dropping the receiver makes later schedules fail fast.
        rx.close();
        info!("monitor stopped");
    }

    async fn dispatch(&self, event: ConfigEvent) {
        let handlers = match self.handlers.read().get(event.gvk()) {
            Some(handlers) => handlers.clone(),
            None => {
                warn!(gvk = %event.gvk(), event = %event.event(), "dropping event for unknown kind");
                self.stats.record_dropped();
                return;
            }
        };

        let count = handlers.len() as u64;
        if count > 0 {
            let gvk = event.gvk().clone();
            let task = tokio::task::spawn_blocking(move || {
                for handler in &handlers {
                    handler(&event);
                }
            });
            if let Err(err) = task.await {
                error!(gvk = %gvk, error = %err, "event handler failed");
            }
        }
        self.stats.record_delivered(count);
    }
}
