//! Cooperative stop signalling.
//!
//! A [`StopHandle`] owns the sending side; every long-running loop holds a
//! [`StopSignal`] and selects on [`StopSignal::wait`].
//!
//! # Example
//!
//! ```rust
//! use meshcfg_store::StopHandle;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handle = StopHandle::new();
//! let signal = handle.signal();
//!
//! let task = tokio::spawn(async move { signal.wait().await });
//! handle.stop();
//! task.await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Owner of the stop channel.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    /// Create a handle that has not stopped.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A signal observing this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every observer to stop. Idempotent.
    pub fn stop(&self) {
        if !self.tx.send_replace(true) {
            info!("stop requested");
        }
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving side of a stop channel.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Whether stop has already been requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once stop is requested or the handle is dropped.
    pub async fn wait(mut self) {
        // An Err means every handle is gone; treat that as a stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
