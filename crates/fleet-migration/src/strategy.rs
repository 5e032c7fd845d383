//! Migration strategies
//!
//! A strategy supplies the two variant-specific steps of a batch:
//! - which instances are candidates, and what each should move to
//! - how the target configuration is built from the current one
//!
//! The state machine, health gate and rollback are shared by every
//! strategy through [`crate::engine::MigrationEngine`].

use crate::config::{ChannelMigrationSettings, CustomVersionMigrationSettings};
use crate::error::BatchError;
use crate::mapping::ChannelMap;
use fleet_core::{ChannelDirectory, ConfigError, Instance, InstanceConfig, ListFilter, VersionSource};
use serde::{Deserialize, Serialize};

/// Instance selected for migration in the current batch
///
/// Computed once from the directory listing; not re-validated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationCandidate {
    pub instance_name: String,
    pub original_version_source: VersionSource,
    pub target_version_source: VersionSource,
}

impl MigrationCandidate {
    pub fn new(
        instance_name: impl Into<String>,
        original_version_source: VersionSource,
        target_version_source: VersionSource,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            original_version_source,
            target_version_source,
        }
    }
}

/// Decides whether an instance is a candidate
pub trait CandidateSelector: Send + Sync {
    /// Target version source if `instance` should migrate
    fn target_for(&self, instance: &Instance) -> Option<VersionSource>;
}

/// Variant-specific steps of a migration batch
#[async_trait::async_trait]
pub trait MigrationStrategy: Send + Sync {
    /// Selector produced by a successful [`Self::prepare`]
    type Selector: CandidateSelector;

    /// Name used in logs and reports
    fn name(&self) -> &'static str;

    /// Whether the variant is switched on
    fn is_enabled(&self) -> bool;

    /// Validate configuration against the channel directory
    ///
    /// Must not mutate anything.
    ///
    /// # Errors
    /// Configuration errors abort the batch before any write.
    async fn prepare(&self, channels: &dyn ChannelDirectory) -> Result<Self::Selector, BatchError>;

    /// Listing filter used for candidate discovery
    fn list_filter(&self) -> ListFilter {
        ListFilter::all()
    }

    /// Build the configuration to write for `target`
    fn build_config(
        &self,
        current: &InstanceConfig,
        target: &VersionSource,
    ) -> Result<InstanceConfig, ConfigError> {
        current.with_version_source(target.clone())
    }
}

async fn require_channel(channels: &dyn ChannelDirectory, name: &str) -> Result<(), BatchError> {
    match channels.get(name).await {
        Ok(channel) => {
            tracing::debug!(
                channel = %channel.name,
                target_version = %channel.target_version,
                "Validated release channel"
            );
            Ok(())
        }
        Err(e) if e.is_not_found() => Err(BatchError::UnknownChannel {
            channel: name.to_string(),
        }),
        Err(e) => Err(BatchError::ChannelLookup {
            channel: name.to_string(),
            source: e,
        }),
    }
}

/// Moves every pinned-version instance onto one release channel
#[derive(Debug, Clone)]
pub struct CustomVersionToChannel {
    settings: CustomVersionMigrationSettings,
}

impl CustomVersionToChannel {
    #[inline]
    #[must_use]
    pub fn new(settings: CustomVersionMigrationSettings) -> Self {
        Self { settings }
    }
}

/// Selects instances with a custom version and no channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    channel: String,
}

impl CandidateSelector for ChannelTarget {
    fn target_for(&self, instance: &Instance) -> Option<VersionSource> {
        instance
            .version_source
            .is_custom()
            .then(|| VersionSource::channel(&self.channel))
    }
}

#[async_trait::async_trait]
impl MigrationStrategy for CustomVersionToChannel {
    type Selector = ChannelTarget;

    fn name(&self) -> &'static str {
        "custom-version-to-channel"
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    async fn prepare(&self, channels: &dyn ChannelDirectory) -> Result<ChannelTarget, BatchError> {
        let channel = self.settings.target_channel.trim();
        if channel.is_empty() {
            return Err(BatchError::MissingTarget {
                strategy: self.name(),
            });
        }
        require_channel(channels, channel).await?;
        Ok(ChannelTarget {
            channel: channel.to_string(),
        })
    }

    fn list_filter(&self) -> ListFilter {
        ListFilter::all().without_channel_subscribers()
    }
}

/// Moves channel subscribers from one channel to another
#[derive(Debug, Clone)]
pub struct ChannelToChannel {
    settings: ChannelMigrationSettings,
}

impl ChannelToChannel {
    #[inline]
    #[must_use]
    pub fn new(settings: ChannelMigrationSettings) -> Self {
        Self { settings }
    }
}

impl CandidateSelector for ChannelMap {
    fn target_for(&self, instance: &Instance) -> Option<VersionSource> {
        let source = instance.version_source.channel_name()?;
        self.target_for(source).map(VersionSource::channel)
    }
}

#[async_trait::async_trait]
impl MigrationStrategy for ChannelToChannel {
    type Selector = ChannelMap;

    fn name(&self) -> &'static str {
        "channel-to-channel"
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    async fn prepare(&self, channels: &dyn ChannelDirectory) -> Result<ChannelMap, BatchError> {
        let map = ChannelMap::parse(&self.settings.mapping)?;
        if map.is_empty() {
            return Err(BatchError::MissingTarget {
                strategy: self.name(),
            });
        }

        for channel in map.channels() {
            require_channel(channels, channel).await?;
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_target_selects_only_custom_versions() {
        let selector = ChannelTarget {
            channel: "stable".into(),
        };

        assert_eq!(
            selector.target_for(&Instance::new("a", VersionSource::custom("5.1.0"))),
            Some(VersionSource::channel("stable"))
        );
        assert_eq!(
            selector.target_for(&Instance::new("b", VersionSource::channel("rapid"))),
            None
        );
        assert_eq!(selector.target_for(&Instance::new("c", VersionSource::Unset)), None);
    }

    #[test]
    fn channel_map_selects_exact_sources() {
        let map = ChannelMap::parse("stable-v5:stable-v6").unwrap();

        assert_eq!(
            CandidateSelector::target_for(
                &map,
                &Instance::new("a", VersionSource::channel("stable-v5"))
            ),
            Some(VersionSource::channel("stable-v6"))
        );
        assert_eq!(
            CandidateSelector::target_for(
                &map,
                &Instance::new("b", VersionSource::channel("stable-v6"))
            ),
            None
        );
        assert_eq!(
            CandidateSelector::target_for(&map, &Instance::new("c", VersionSource::custom("stable-v5"))),
            None
        );
    }

    #[test]
    fn custom_strategy_lists_without_channel_subscribers() {
        let strategy = CustomVersionToChannel::new(CustomVersionMigrationSettings {
            enabled: true,
            target_channel: "stable".into(),
        });
        assert!(strategy.list_filter().exclude_channel_subscribers);
        assert!(strategy.is_enabled());

        let channel = ChannelToChannel::new(ChannelMigrationSettings::default());
        assert!(!channel.list_filter().exclude_channel_subscribers);
        assert!(!channel.is_enabled());
    }
}
