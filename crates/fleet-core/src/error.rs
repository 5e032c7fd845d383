//! Error types for fleet collaborators
//!
//! - Directory failures (lookups, reads, writes against the platform)
//! - Instance configuration construction failures

use std::fmt;

/// Kind of resource a directory lookup targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Managed feature-toggle instance
    Instance,
    /// Release channel
    Channel,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => f.write_str("instance"),
            Self::Channel => f.write_str("channel"),
        }
    }
}

/// Errors raised by instance and channel directories
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Resource does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    /// Platform could not be reached or returned a transient failure
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// Platform rejected a configuration write
    #[error("write rejected for {name}: {reason}")]
    Rejected { name: String, reason: String },

    /// Stored configuration could not be decoded
    #[error("malformed configuration for {name}: {reason}")]
    Malformed { name: String, reason: String },
}

impl DirectoryError {
    /// Create a not-found error for an instance
    #[inline]
    pub fn instance_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Instance,
            name: name.into(),
        }
    }

    /// Create a not-found error for a channel
    #[inline]
    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Channel,
            name: name.into(),
        }
    }

    /// Check if the resource was missing
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors building an instance configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Release channel name is blank
    #[error("release channel name must not be empty")]
    EmptyChannelName,

    /// Custom version is blank
    #[error("custom version must not be empty")]
    EmptyCustomVersion,

    /// Federation enabled without any namespace to federate
    #[error("federation enabled for {0} without namespaces")]
    FederationWithoutNamespaces(String),
}
