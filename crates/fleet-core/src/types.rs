//! Core fleet types
//!
//! Defines the fundamental types shared by the control plane:
//! - Version sources (pinned version or release channel)
//! - Observed instances
//! - Full instance configuration snapshots
//! - Release channels

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mechanism selecting the version an instance runs
///
/// A pinned version and a channel subscription are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum VersionSource {
    /// Pinned image version
    CustomVersion(String),
    /// Subscription to a named release channel
    ReleaseChannel(String),
    /// Neither set; the platform default applies
    #[default]
    Unset,
}

impl VersionSource {
    /// Pinned version source
    #[inline]
    pub fn custom(version: impl Into<String>) -> Self {
        Self::CustomVersion(version.into())
    }

    /// Channel subscription
    #[inline]
    pub fn channel(name: impl Into<String>) -> Self {
        Self::ReleaseChannel(name.into())
    }

    /// Channel name, if subscribed to one
    #[inline]
    #[must_use]
    pub fn channel_name(&self) -> Option<&str> {
        match self {
            Self::ReleaseChannel(name) => Some(name),
            _ => None,
        }
    }

    /// Pinned version, if any
    #[inline]
    #[must_use]
    pub fn custom_version(&self) -> Option<&str> {
        match self {
            Self::CustomVersion(version) => Some(version),
            _ => None,
        }
    }

    /// Check if this source subscribes to a channel
    #[inline]
    #[must_use]
    pub fn is_channel(&self) -> bool {
        matches!(self, Self::ReleaseChannel(_))
    }

    /// Check if this source pins a version
    #[inline]
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::CustomVersion(_))
    }

    /// Reject blank names and versions
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::CustomVersion(v) if v.trim().is_empty() => Err(ConfigError::EmptyCustomVersion),
            Self::ReleaseChannel(c) if c.trim().is_empty() => Err(ConfigError::EmptyChannelName),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomVersion(v) => write!(f, "custom-version:{v}"),
            Self::ReleaseChannel(c) => write!(f, "release-channel:{c}"),
            Self::Unset => f.write_str("unset"),
        }
    }
}

/// Observed state of a managed instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique, stable name
    pub name: String,
    /// Readiness as last reported by the platform
    pub is_ready: bool,
    /// Current version source
    #[serde(default)]
    pub version_source: VersionSource,
}

impl Instance {
    /// Create a ready instance
    #[inline]
    pub fn new(name: impl Into<String>, version_source: VersionSource) -> Self {
        Self {
            name: name.into(),
            is_ready: true,
            version_source,
        }
    }

    /// Set readiness
    #[inline]
    #[must_use]
    pub fn with_ready(mut self, ready: bool) -> Self {
        self.is_ready = ready;
        self
    }
}

/// Federation settings carried through migrations untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationConfig {
    pub enabled: bool,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub allowed_clusters: Vec<String>,
}

/// Database connection pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 3,
            idle_timeout_secs: 1800,
        }
    }
}

/// Full configuration snapshot of an instance
///
/// Migrations load the current snapshot, replace only the version source
/// and write it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance name
    pub name: String,
    /// Version selection
    #[serde(default)]
    pub version_source: VersionSource,
    /// Federation settings
    #[serde(default)]
    pub federation: FederationConfig,
    /// Database pool settings
    #[serde(default)]
    pub database_pool: DatabasePoolConfig,
    /// Free-form platform labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl InstanceConfig {
    /// Create configuration with defaults for everything but the version source
    pub fn new(name: impl Into<String>, version_source: VersionSource) -> Self {
        Self {
            name: name.into(),
            version_source,
            federation: FederationConfig::default(),
            database_pool: DatabasePoolConfig::default(),
            labels: BTreeMap::new(),
        }
    }

    /// With federation settings
    #[inline]
    #[must_use]
    pub fn with_federation(mut self, federation: FederationConfig) -> Self {
        self.federation = federation;
        self
    }

    /// With a label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Copy of this configuration with only the version source replaced
    ///
    /// # Errors
    /// - `ConfigError::EmptyChannelName` / `EmptyCustomVersion` for blank sources
    /// - `ConfigError::FederationWithoutNamespaces` if the carried federation
    ///   settings are themselves inconsistent
    pub fn with_version_source(&self, source: VersionSource) -> Result<Self, ConfigError> {
        source.validate()?;
        self.validate_federation()?;

        let mut next = self.clone();
        next.version_source = source;
        Ok(next)
    }

    fn validate_federation(&self) -> Result<(), ConfigError> {
        if self.federation.enabled && self.federation.namespaces.is_empty() {
            return Err(ConfigError::FederationWithoutNamespaces(self.name.clone()));
        }
        Ok(())
    }
}

/// Release channel resolved to a target version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub target_version: String,
}

impl Channel {
    #[inline]
    pub fn new(name: impl Into<String>, target_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_version: target_version.into(),
        }
    }
}
