//! Settings loading and command-line overrides

use anyhow::Context;
use fleet_migration::MigrationSettings;
use std::path::Path;

/// Flags layered over the settings file
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Enable the custom-version migration towards this channel
    #[arg(long, value_name = "CHANNEL")]
    pub custom_target: Option<String>,

    /// Enable the channel migration with this `source:target,...` map
    #[arg(long, value_name = "MAP")]
    pub channel_mapping: Option<String>,

    /// Disable the custom-version migration
    #[arg(long)]
    pub no_custom: bool,

    /// Disable the channel migration
    #[arg(long)]
    pub no_channel: bool,

    /// Seconds an instance has to become ready after a change
    #[arg(long, value_name = "SECS")]
    pub health_timeout_secs: Option<u64>,

    /// Pause between candidates, in seconds
    #[arg(long, value_name = "SECS")]
    pub step_delay_secs: Option<u64>,
}

impl Overrides {
    /// Apply the flags to `settings`
    #[must_use]
    pub fn apply(&self, mut settings: MigrationSettings) -> MigrationSettings {
        if let Some(channel) = &self.custom_target {
            settings = settings.with_custom_version_target(channel.clone());
        }
        if let Some(mapping) = &self.channel_mapping {
            settings = settings.with_channel_mapping(mapping.clone());
        }
        if self.no_custom {
            settings.custom_version.enabled = false;
        }
        if self.no_channel {
            settings.channel.enabled = false;
        }
        if let Some(secs) = self.health_timeout_secs {
            settings = settings.with_health_timeout_secs(secs);
        }
        if let Some(secs) = self.step_delay_secs {
            settings = settings.with_step_delay_secs(secs);
        }
        settings
    }
}

/// Load settings from `path`, or defaults when no file is given, then apply `overrides`
///
/// # Errors
/// Unreadable or invalid settings files, or overrides producing invalid settings.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<MigrationSettings> {
    let settings = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            MigrationSettings::from_toml_str(&raw)
                .with_context(|| format!("parsing settings from {}", path.display()))?
        }
        None => MigrationSettings::default(),
    };

    let settings = overrides.apply(settings);
    settings.validate().context("invalid settings after overrides")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_then_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "step_delay_secs = 10\n\n[channel]\nenabled = true\nmapping = \"stable-v5:stable-v6\""
        )
        .unwrap();

        let overrides = Overrides {
            custom_target: Some("stable".into()),
            no_channel: true,
            ..Overrides::default()
        };
        let settings = load(Some(file.path()), &overrides).unwrap();

        assert_eq!(settings.step_delay_secs, 10);
        assert!(settings.custom_version.enabled);
        assert_eq!(settings.custom_version.target_channel, "stable");
        assert!(!settings.channel.enabled);
        assert_eq!(settings.channel.mapping, "stable-v5:stable-v6");
    }

    #[test]
    fn defaults_without_file() {
        let settings = load(None, &Overrides::default()).unwrap();
        assert_eq!(settings, MigrationSettings::default());
    }

    #[test]
    fn zero_timeout_override_is_rejected() {
        let overrides = Overrides {
            health_timeout_secs: Some(0),
            ..Overrides::default()
        };
        assert!(load(None, &overrides).is_err());
    }
}
