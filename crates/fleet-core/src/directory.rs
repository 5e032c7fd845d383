//! Collaborator interfaces owned by the infrastructure layer
//!
//! The reconciler only reads instances and rewrites their configuration;
//! provisioning and resource construction live behind these traits.

use crate::error::DirectoryError;
use crate::types::{Channel, Instance, InstanceConfig};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Exclusion filter applied when listing instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Skip instances already subscribed to a release channel
    pub exclude_channel_subscribers: bool,
    /// Skip instances by name
    pub exclude_names: BTreeSet<String>,
}

impl ListFilter {
    /// Filter that excludes nothing
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Exclude channel subscribers
    #[inline]
    #[must_use]
    pub fn without_channel_subscribers(mut self) -> Self {
        self.exclude_channel_subscribers = true;
        self
    }

    /// Exclude a named instance
    #[inline]
    #[must_use]
    pub fn excluding(mut self, name: impl Into<String>) -> Self {
        self.exclude_names.insert(name.into());
        self
    }

    /// Check if an instance passes the filter
    #[must_use]
    pub fn admits(&self, instance: &Instance) -> bool {
        if self.exclude_channel_subscribers && instance.version_source.is_channel() {
            return false;
        }
        !self.exclude_names.contains(&instance.name)
    }
}

/// Read/write access to managed instances
#[async_trait::async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// List instances passing `filter`
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Instance>, DirectoryError>;

    /// Fetch one instance with fresh readiness
    async fn get(&self, name: &str) -> Result<Instance, DirectoryError>;

    /// Load the full configuration of an instance
    async fn read_config(&self, name: &str) -> Result<InstanceConfig, DirectoryError>;

    /// Replace the configuration of an instance
    ///
    /// On error the stored configuration is unchanged.
    async fn write_config(&self, name: &str, config: InstanceConfig) -> Result<(), DirectoryError>;
}

/// Read-only release channel lookup
#[async_trait::async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Resolve a channel by name
    async fn get(&self, name: &str) -> Result<Channel, DirectoryError>;
}

#[async_trait::async_trait]
impl<T: InstanceDirectory + ?Sized> InstanceDirectory for Arc<T> {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Instance>, DirectoryError> {
        (**self).list(filter).await
    }

    async fn get(&self, name: &str) -> Result<Instance, DirectoryError> {
        (**self).get(name).await
    }

    async fn read_config(&self, name: &str) -> Result<InstanceConfig, DirectoryError> {
        (**self).read_config(name).await
    }

    async fn write_config(&self, name: &str, config: InstanceConfig) -> Result<(), DirectoryError> {
        (**self).write_config(name, config).await
    }
}

#[async_trait::async_trait]
impl<T: ChannelDirectory + ?Sized> ChannelDirectory for Arc<T> {
    async fn get(&self, name: &str) -> Result<Channel, DirectoryError> {
        (**self).get(name).await
    }
}
