//! Error types for config plane operations.
//!
//! [`ConfigError`] covers store misses and collisions, schema violations,
//! source configuration problems, dependent-resource join timeouts and
//! transport failures. It converts to and from [`tonic::Status`] so errors can
//! cross the protocol boundary in both directions.

use crate::GroupVersionKind;

/// Error type for config plane operations.
///
/// # Example
///
/// ```rust
/// use meshcfg_core::{ConfigError, GroupVersionKind};
///
/// let err = ConfigError::not_found(&GroupVersionKind::SERVICE, "default", "reviews");
/// assert!(err.is_not_found());
/// assert!(err.to_string().contains("default/reviews"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Get, Update or Delete missed.
    #[error("{gvk} {namespace}/{name} does not exist")]
    NotFound {
        /// Kind of the missing object.
        gvk: GroupVersionKind,
        /// Namespace of the missing object.
        namespace: String,
        /// Name of the missing object.
        name: String,
    },

    /// Create collided with an existing object.
    #[error("{gvk} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Kind of the object.
        gvk: GroupVersionKind,
        /// Namespace of the object.
        namespace: String,
        /// Name of the object.
        name: String,
    },

    /// The store's schema does not include this kind.
    #[error("unknown type {gvk}")]
    UnknownType {
        /// The unrecognised kind.
        gvk: GroupVersionKind,
    },

    /// A kind was added to a schema set twice.
    #[error("duplicate type {gvk}")]
    DuplicateType {
        /// The duplicated kind.
        gvk: GroupVersionKind,
    },

    /// Unsupported scheme or malformed source address.
    #[error("invalid config source {address}: {reason}")]
    InvalidConfigSource {
        /// The offending address.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Bounded retry exhausted while resolving a dependent resource.
    #[error("timed out after {attempts} attempts waiting for {what}")]
    JoinTimeout {
        /// The resource being waited for.
        what: String,
        /// Attempts made.
        attempts: u32,
    },

    /// A resource body could not be decoded.
    #[error("decoding error for {type_url}: {message}")]
    Decode {
        /// Collection of the resource.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// Peer transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Several independent operations failed.
    #[error("{} errors occurred: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<ConfigError>),

    /// The config plane is stopping.
    #[error("config plane is shutting down")]
    Shutdown,
}

fn join_errors(errs: &[ConfigError]) -> String {
    errs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    /// Create a [`ConfigError::NotFound`].
    pub fn not_found(gvk: &GroupVersionKind, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            gvk: gvk.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Create a [`ConfigError::AlreadyExists`].
    pub fn already_exists(gvk: &GroupVersionKind, namespace: &str, name: &str) -> Self {
        Self::AlreadyExists {
            gvk: gvk.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Create a [`ConfigError::InvalidConfigSource`].
    pub fn invalid_source(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfigSource {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error from any error type.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Collapse a list of errors: `None` when empty, the error itself when
    /// there is exactly one, [`ConfigError::Aggregate`] otherwise.
    pub fn aggregate(mut errs: Vec<ConfigError>) -> Option<Self> {
        match errs.len() {
            0 => None,
            1 => errs.pop(),
            _ => Some(Self::Aggregate(errs)),
        }
    }

    /// Whether this is a [`ConfigError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a [`ConfigError::AlreadyExists`].
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Convert to tonic::Status so store errors can be surfaced to peers.
impl From<ConfigError> for tonic::Status {
    fn from(err: ConfigError) -> Self {
        match &err {
            ConfigError::NotFound { .. } => tonic::Status::not_found(err.to_string()),
            ConfigError::AlreadyExists { .. } => tonic::Status::already_exists(err.to_string()),
            ConfigError::UnknownType { .. }
            | ConfigError::DuplicateType { .. }
            | ConfigError::InvalidConfigSource { .. }
            | ConfigError::Decode { .. }
            | ConfigError::Configuration(_) => tonic::Status::invalid_argument(err.to_string()),
            ConfigError::JoinTimeout { .. } => tonic::Status::deadline_exceeded(err.to_string()),
            ConfigError::Transport { .. } | ConfigError::Shutdown => {
                tonic::Status::unavailable(err.to_string())
            }
            ConfigError::Aggregate(_) => tonic::Status::internal(err.to_string()),
        }
    }
}

impl From<tonic::Status> for ConfigError {
    fn from(status: tonic::Status) -> Self {
        let message = format!("{:?}: {}", status.code(), status.message());
        Self::transport(message, status)
    }
}
