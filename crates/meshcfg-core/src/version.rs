//! Resource version stamps.
//!
//! Stores stamp every write with a [`ResourceVersion`]. Unless the caller
//! supplies its own through the reserved annotation, the stamp is a wall-clock
//! nanosecond timestamp that never goes backwards within the process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Opaque version of a stored config.
///
/// Consumers may only compare versions for equality.
///
/// # Example
///
/// ```rust
/// use meshcfg_core::ResourceVersion;
///
/// let a = ResourceVersion::now();
/// let b = ResourceVersion::now();
/// assert_ne!(a, b);
/// assert_eq!(ResourceVersion::new("7").as_str(), "7");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// Wrap an existing version string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// A fresh, process-unique stamp derived from the current time.
    #[must_use]
    pub fn now() -> Self {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0);
        let mut last = LAST_STAMP.load(Ordering::Relaxed);
        loop {
            let next = now.max(last.saturating_add(1));
            match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self(next.to_string()),
                Err(actual) => last = actual,
            }
        }
    }

    /// Whether no version has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ResourceVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceVersion {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<ResourceVersion> for String {
    fn from(v: ResourceVersion) -> Self {
        v.0
    }
}

impl AsRef<str> for ResourceVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
