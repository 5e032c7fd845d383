//! Migration settings
//!
//! Operator-facing knobs for both migration variants plus the shared
//! timing policy (health timeout, inter-step delay, poll cadence).

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default health check timeout in seconds
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 300;

/// Default pause between candidates in seconds
pub const DEFAULT_STEP_DELAY_SECS: u64 = 30;

/// Default readiness poll cadence in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Settings for the custom-version to channel migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomVersionMigrationSettings {
    pub enabled: bool,
    /// Channel every pinned instance moves to
    pub target_channel: String,
}

/// Settings for the channel to channel migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMigrationSettings {
    pub enabled: bool,
    /// Comma-separated `source:target` pairs
    pub mapping: String,
}

/// Migration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Time an instance has to become ready after a change
    pub health_timeout_secs: u64,
    /// Pause between candidates
    pub step_delay_secs: u64,
    /// Readiness poll cadence
    pub poll_interval_ms: u64,
    pub custom_version: CustomVersionMigrationSettings,
    pub channel: ChannelMigrationSettings,
}

impl MigrationSettings {
    /// Create default settings (both variants disabled)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from TOML
    ///
    /// # Errors
    /// - `SettingsError::Parse` on malformed TOML
    /// - `SettingsError::ZeroHealthTimeout` if the timeout is zero
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(raw).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check timing invariants
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.health_timeout_secs == 0 {
            return Err(SettingsError::ZeroHealthTimeout);
        }
        Ok(())
    }

    /// With health timeout
    #[inline]
    #[must_use]
    pub fn with_health_timeout_secs(mut self, secs: u64) -> Self {
        self.health_timeout_secs = secs;
        self
    }

    /// With inter-step delay
    #[inline]
    #[must_use]
    pub fn with_step_delay_secs(mut self, secs: u64) -> Self {
        self.step_delay_secs = secs;
        self
    }

    /// With poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Enable the custom-version migration towards `channel`
    #[inline]
    #[must_use]
    pub fn with_custom_version_target(mut self, channel: impl Into<String>) -> Self {
        self.custom_version = CustomVersionMigrationSettings {
            enabled: true,
            target_channel: channel.into(),
        };
        self
    }

    /// Enable the channel migration with `mapping`
    #[inline]
    #[must_use]
    pub fn with_channel_mapping(mut self, mapping: impl Into<String>) -> Self {
        self.channel = ChannelMigrationSettings {
            enabled: true,
            mapping: mapping.into(),
        };
        self
    }

    #[inline]
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn step_delay(&self) -> Duration {
        Duration::from_secs(self.step_delay_secs)
    }

    /// Poll interval, never longer than the health timeout and never zero
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
            .min(self.health_timeout())
            .max(Duration::from_millis(1))
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            health_timeout_secs: DEFAULT_HEALTH_TIMEOUT_SECS,
            step_delay_secs: DEFAULT_STEP_DELAY_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            custom_version: CustomVersionMigrationSettings::default(),
            channel: ChannelMigrationSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_throttle_the_platform() {
        let settings = MigrationSettings::new();
        assert_eq!(settings.health_timeout(), Duration::from_secs(300));
        assert_eq!(settings.step_delay(), Duration::from_secs(30));
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert!(!settings.custom_version.enabled);
        assert!(!settings.channel.enabled);
    }

    #[test]
    fn poll_interval_clamped_to_timeout() {
        let settings = MigrationSettings::new()
            .with_health_timeout_secs(2)
            .with_poll_interval_ms(10_000);
        assert_eq!(settings.poll_interval(), Duration::from_secs(2));

        let settings = MigrationSettings::new().with_poll_interval_ms(0);
        assert_eq!(settings.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn parses_toml_with_partial_sections() {
        let settings = MigrationSettings::from_toml_str(
            r#"
            health_timeout_secs = 120

            [channel]
            enabled = true
            mapping = "stable-v5:stable-v6"
            "#,
        )
        .unwrap();

        assert_eq!(settings.health_timeout_secs, 120);
        assert_eq!(settings.step_delay_secs, DEFAULT_STEP_DELAY_SECS);
        assert!(settings.channel.enabled);
        assert_eq!(settings.channel.mapping, "stable-v5:stable-v6");
        assert!(!settings.custom_version.enabled);
    }

    #[test]
    fn rejects_zero_timeout_and_bad_toml() {
        assert_eq!(
            MigrationSettings::from_toml_str("health_timeout_secs = 0"),
            Err(SettingsError::ZeroHealthTimeout)
        );
        assert!(matches!(
            MigrationSettings::from_toml_str("health_timeout_secs = \"soon\""),
            Err(SettingsError::Parse(_))
        ));
    }
}
