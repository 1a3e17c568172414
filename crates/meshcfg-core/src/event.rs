//! Change notifications.

use std::fmt;

use crate::{Config, GroupVersionKind};

/// Kind of change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A config appeared.
    Add,
    /// A config changed.
    Update,
    /// A config went away.
    Delete,
}

impl Event {
    /// Lowercase name, for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to one config, as delivered to handlers.
///
/// `Update` carries both the previous and the new value; the others carry the
/// affected config only.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigEvent {
    /// A new config.
    Add(Config),
    /// A changed config.
    Update {
        /// Value before the change.
        old: Config,
        /// Value after the change.
        new: Config,
    },
    /// A removed config, as it was last stored.
    Delete(Config),
}

impl ConfigEvent {
    /// The kind of change.
    pub fn event(&self) -> Event {
        match self {
            Self::Add(_) => Event::Add,
            Self::Update { .. } => Event::Update,
            Self::Delete(_) => Event::Delete,
        }
    }

    /// The current config: the added one, the new one, or the deleted one.
    pub fn config(&self) -> &Config {
        match self {
            Self::Add(cfg) | Self::Delete(cfg) => cfg,
            Self::Update { new, .. } => new,
        }
    }

    /// The previous value, for updates.
    pub fn old(&self) -> Option<&Config> {
        match self {
            Self::Update { old, .. } => Some(old),
            _ => None,
        }
    }

    /// Kind of the affected config.
    pub fn gvk(&self) -> &GroupVersionKind {
        self.config().gvk()
    }
}
