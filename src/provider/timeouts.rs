//! Per-operation timeouts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout used for any operation a resource does not configure.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// A CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create.
    Create,
    /// Read.
    Read,
    /// Update.
    Update,
    /// Delete.
    Delete,
}

impl Operation {
    /// Returns the lowercase name used in documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// User-supplied timeout overrides, written as human-readable durations.
///
/// ```yaml
/// timeouts:
///   create: 10m
///   delete: 1h 30m
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timeouts {
    /// Create timeout.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub create: Option<Duration>,
    /// Read timeout.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub read: Option<Duration>,
    /// Update timeout.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub update: Option<Duration>,
    /// Delete timeout.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Duration>,
}

impl Timeouts {
    /// Iterates over the configured overrides.
    pub fn iter(&self) -> impl Iterator<Item = (Operation, Duration)> + '_ {
        [
            (Operation::Create, self.create),
            (Operation::Read, self.read),
            (Operation::Update, self.update),
            (Operation::Delete, self.delete),
        ]
        .into_iter()
        .filter_map(|(op, d)| d.map(|d| (op, d)))
    }
}

/// Timeouts a resource applies when the user configures none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutDefaults {
    /// Create timeout.
    pub create: Duration,
    /// Read timeout.
    pub read: Duration,
    /// Update timeout.
    pub update: Duration,
    /// Delete timeout.
    pub delete: Duration,
}

impl Default for TimeoutDefaults {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

impl TimeoutDefaults {
    /// Uses the same timeout for every operation.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    /// Sets the create timeout.
    #[must_use]
    pub const fn with_create(mut self, timeout: Duration) -> Self {
        self.create = timeout;
        self
    }

    /// Sets the update timeout.
    #[must_use]
    pub const fn with_update(mut self, timeout: Duration) -> Self {
        self.update = timeout;
        self
    }

    /// Sets the delete timeout.
    #[must_use]
    pub const fn with_delete(mut self, timeout: Duration) -> Self {
        self.delete = timeout;
        self
    }

    /// Returns the timeout for `operation`.
    #[must_use]
    pub const fn get(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Applies user overrides on top of these defaults.
    #[must_use]
    pub fn resolve(&self, overrides: &Timeouts) -> Self {
        Self {
            create: overrides.create.unwrap_or(self.create),
            read: overrides.read.unwrap_or(self.read),
            update: overrides.update.unwrap_or(self.update),
            delete: overrides.delete.unwrap_or(self.delete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_humantime() {
        let timeouts: Timeouts = serde_yaml::from_str("create: 10m\ndelete: 1h 30m\n")
            .unwrap_or_default();

        assert_eq!(timeouts.create, Some(Duration::from_secs(600)));
        assert_eq!(timeouts.delete, Some(Duration::from_secs(5400)));
        assert_eq!(timeouts.read, None);
    }

    #[test]
    fn test_resolve_overrides() {
        let defaults = TimeoutDefaults::uniform(Duration::from_secs(300))
            .with_delete(Duration::from_secs(3600));
        let overrides = Timeouts {
            create: Some(Duration::from_secs(60)),
            ..Timeouts::default()
        };

        let resolved = defaults.resolve(&overrides);
        assert_eq!(resolved.get(Operation::Create), Duration::from_secs(60));
        assert_eq!(resolved.get(Operation::Read), Duration::from_secs(300));
        assert_eq!(resolved.get(Operation::Delete), Duration::from_secs(3600));
    }

    #[test]
    fn test_default_is_twenty_minutes() {
        assert_eq!(TimeoutDefaults::default().update, Duration::from_secs(1200));
    }
}
