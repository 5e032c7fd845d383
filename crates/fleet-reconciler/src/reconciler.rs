//! Runs both migration variants against one fleet
//!
//! The custom-version and channel batches are independent and run side by
//! side, sharing only the cancellation token.

use anyhow::Context;
use fleet_core::{ChannelDirectory, InstanceDirectory};
use fleet_migration::{
    BatchError, BatchOrchestrator, BatchReport, CancellationToken, ChannelToChannel,
    CustomVersionToChannel, MigrationCandidate, MigrationSettings,
};
use serde::Serialize;
use std::sync::Arc;

/// Candidates each variant would migrate; `None` when disabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetPlan {
    pub custom_version: Option<Vec<MigrationCandidate>>,
    pub channel: Option<Vec<MigrationCandidate>>,
}

/// Result of running both variants
#[derive(Debug)]
pub struct FleetOutcome {
    pub custom_version: Result<BatchReport, BatchError>,
    pub channel: Result<BatchReport, BatchError>,
}

impl FleetOutcome {
    /// Reports of the batches that ran
    pub fn reports(&self) -> impl Iterator<Item = &BatchReport> {
        [&self.custom_version, &self.channel]
            .into_iter()
            .filter_map(|r| r.as_ref().ok())
    }

    /// True if both batches ran to completion with nothing left for an operator
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.custom_version.is_ok()
            && self.channel.is_ok()
            && self
                .reports()
                .all(|r| !r.was_cancelled() && r.needs_attention().is_empty())
    }
}

/// Both migration orchestrators over one fleet
pub struct Reconciler {
    custom_version: BatchOrchestrator<CustomVersionToChannel>,
    channel: BatchOrchestrator<ChannelToChannel>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        settings: &MigrationSettings,
        instances: Arc<dyn InstanceDirectory>,
        channels: Arc<dyn ChannelDirectory>,
    ) -> Self {
        Self {
            custom_version: BatchOrchestrator::new(
                CustomVersionToChannel::new(settings.custom_version.clone()),
                instances.clone(),
                channels.clone(),
                settings.clone(),
            ),
            channel: BatchOrchestrator::new(
                ChannelToChannel::new(settings.channel.clone()),
                instances,
                channels,
                settings.clone(),
            ),
        }
    }

    /// Dry run of both variants
    ///
    /// # Errors
    /// First configuration or listing error of either variant.
    pub async fn plan(&self) -> anyhow::Result<FleetPlan> {
        let (custom_version, channel) =
            tokio::join!(self.custom_version.plan(), self.channel.plan());

        Ok(FleetPlan {
            custom_version: custom_version.context("planning custom-version migration")?,
            channel: channel.context("planning channel migration")?,
        })
    }

    /// Run both variants until done or cancelled
    pub async fn run(&self, cancel: &CancellationToken) -> FleetOutcome {
        let (custom_version, channel) = tokio::join!(
            self.custom_version.run(cancel.clone()),
            self.channel.run(cancel.clone())
        );
        FleetOutcome {
            custom_version,
            channel,
        }
    }
}
