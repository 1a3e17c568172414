//! Bounded busy-wait join across independently delivered resources.
//!
//! Endpoints and the pods behind them arrive on separate watches in no
//! particular order. Conversion waits for a missing dependency by polling a
//! lookup a fixed number of times with a short sleep between attempts. The
//! wait blocks the calling thread and cannot be cancelled; with the defaults
//! it gives up after roughly 100ms.

use std::thread;
use std::time::Duration;

use meshcfg_core::{ConfigError, Result};
use serde::Deserialize;
use tracing::{trace, warn};

/// Retry policy for dependent-resource lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JoinRetry {
    /// Lookups to attempt before giving up.
    pub attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub pause_ms: u64,
}

impl Default for JoinRetry {
    fn default() -> Self {
        Self {
            attempts: 100,
            pause_ms: 1,
        }
    }
}

impl JoinRetry {
    /// A policy that looks up once and never sleeps.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            pause_ms: 0,
        }
    }

    /// Pause between attempts.
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    /// Call `lookup` until it yields a value or the attempts run out.
    ///
    /// # Errors
    ///
    /// [`ConfigError::JoinTimeout`] naming `what` once every attempt missed.
    pub fn join<T>(&self, what: &str, mut lookup: impl FnMut() -> Option<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(found) = lookup() {
                if attempt > 1 {
                    trace!(what, attempt, "dependency resolved after retry");
                }
                return Ok(found);
            }
            if attempt < attempts {
                thread::sleep(self.pause());
            }
        }
        warn!(what, attempts, "gave up waiting for dependency");
        Err(ConfigError::JoinTimeout {
            what: what.to_string(),
            attempts,
        })
    }
}
