//! Error types for fleet migrations
//!
//! Errors are split by where they stop propagating:
//! - Batch-level errors abort a run before any mutation
//! - Apply, health gate and rollback errors are per candidate and end up
//!   as a status plus a log record
//! - Transition errors flag misuse of the state tracker

use crate::state::MigrationStatus;
use fleet_core::{ConfigError, DirectoryError};
use std::time::Duration;

/// Batch-level configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// Migration map could not be parsed
    #[error("invalid migration map: {0}")]
    Mapping(#[from] MappingError),

    /// Strategy enabled without a target
    #[error("{strategy} migration enabled but no target configured")]
    MissingTarget { strategy: &'static str },

    /// Channel named in the configuration does not exist
    #[error("unknown release channel: {channel}")]
    UnknownChannel { channel: String },

    /// Channel directory failed while validating configuration
    #[error("looking up channel {channel} failed: {source}")]
    ChannelLookup {
        channel: String,
        #[source]
        source: DirectoryError,
    },

    /// Instance listing failed during candidate discovery
    #[error("listing instances failed: {0}")]
    ListInstances(#[source] DirectoryError),
}

impl BatchError {
    /// Check if the error stems from operator configuration
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Mapping(_) | Self::MissingTarget { .. } | Self::UnknownChannel { .. }
        )
    }
}

/// Migration map parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Entry is not a single `source:target` pair
    #[error("entry {entry:?} is not of the form source:target")]
    InvalidFormat { entry: String },

    /// Source channel token is empty
    #[error("entry {entry:?} has an empty source channel")]
    EmptySource { entry: String },

    /// Target channel token is empty
    #[error("entry {entry:?} has an empty target channel")]
    EmptyTarget { entry: String },

    /// Source and target are the same channel
    #[error("channel {channel} is mapped to itself")]
    SelfMapping { channel: String },

    /// Source channel appears more than once
    #[error("channel {channel} is mapped to both {first} and {second}")]
    DuplicateSource {
        channel: String,
        first: String,
        second: String,
    },
}

/// Failures applying a configuration change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// Instance could not be fetched before migrating
    #[error("fetching {instance} failed: {source}")]
    Fetch {
        instance: String,
        #[source]
        source: DirectoryError,
    },

    /// Current configuration could not be read
    #[error("reading configuration of {instance} failed: {source}")]
    ReadConfig {
        instance: String,
        #[source]
        source: DirectoryError,
    },

    /// New configuration could not be built
    #[error("building configuration for {instance} failed: {source}")]
    BuildConfig {
        instance: String,
        #[source]
        source: ConfigError,
    },

    /// New configuration was not written
    #[error("writing configuration of {instance} failed: {source}")]
    WriteConfig {
        instance: String,
        #[source]
        source: DirectoryError,
    },
}

/// Health gate results other than success
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HealthGateError {
    /// Instance did not report ready before the deadline
    #[error("{instance} not ready after {}s", .timeout.as_secs())]
    Timeout { instance: String, timeout: Duration },

    /// Wait aborted by cancellation
    #[error("health wait for {instance} cancelled")]
    Cancelled { instance: String },
}

impl HealthGateError {
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Rollback failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    /// Restoring the original configuration failed
    #[error("restoring original version source failed: {0}")]
    Apply(#[from] ApplyError),

    /// Instance stayed unhealthy after restoring
    #[error("instance unhealthy after rollback: {0}")]
    Health(#[from] HealthGateError),
}

impl RollbackError {
    /// Check if the rollback was interrupted rather than failed
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Health(e) if e.is_cancelled())
    }
}

/// State tracker misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition not in the status graph
    #[error("illegal transition for {instance}: {from} -> {to}")]
    IllegalTransition {
        instance: String,
        from: MigrationStatus,
        to: MigrationStatus,
    },

    /// Candidate was never registered for this batch
    #[error("unknown candidate: {0}")]
    UnknownCandidate(String),
}

/// Invalid migration settings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// Settings file could not be parsed
    #[error("invalid settings: {0}")]
    Parse(String),

    /// Health timeout of zero never observes readiness
    #[error("health timeout must be greater than zero")]
    ZeroHealthTimeout,
}
