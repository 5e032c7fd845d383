//! Batch orchestrator
//!
//! One batch run:
//! 1. Validate configuration against the channel directory
//! 2. Discover candidates and sort them by name
//! 3. Register every candidate as pending before the first write
//! 4. Migrate candidates one at a time with a pause between them
//! 5. Log and return the summary
//!
//! Candidates are never processed concurrently within a batch. Separate
//! orchestrators (one per strategy) may run side by side.

use crate::config::MigrationSettings;
use crate::engine::{MigrationEngine, MigrationOutcome};
use crate::error::BatchError;
use crate::state::StateTracker;
use crate::strategy::{CandidateSelector, MigrationCandidate, MigrationStrategy};
use crate::summary::{BatchDisposition, BatchId, BatchReport};
use chrono::{DateTime, Utc};
use fleet_core::{ChannelDirectory, InstanceDirectory};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Drives one migration strategy across the fleet
pub struct BatchOrchestrator<S> {
    strategy: S,
    instances: Arc<dyn InstanceDirectory>,
    channels: Arc<dyn ChannelDirectory>,
    settings: MigrationSettings,
    tracker: StateTracker,
}

impl<S: MigrationStrategy> BatchOrchestrator<S> {
    #[must_use]
    pub fn new(
        strategy: S,
        instances: Arc<dyn InstanceDirectory>,
        channels: Arc<dyn ChannelDirectory>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            strategy,
            instances,
            channels,
            settings,
            tracker: StateTracker::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    /// Handle to the state of the current (or last) batch
    ///
    /// Safe to read while [`Self::run`] is in flight.
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> StateTracker {
        self.tracker.clone()
    }

    /// Validate configuration and list the candidates a run would process
    ///
    /// Returns `None` when the strategy is disabled. Never writes.
    ///
    /// # Errors
    /// Same configuration and listing errors as [`Self::run`].
    pub async fn plan(&self) -> Result<Option<Vec<MigrationCandidate>>, BatchError> {
        self.discover().await
    }

    /// Run one batch
    ///
    /// # Errors
    /// Configuration or listing errors, always before any write. Failures of
    /// individual candidates are reported in the returned [`BatchReport`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<BatchReport, BatchError> {
        let batch_id = BatchId::new();
        let span = tracing::info_span!(
            "migration_batch",
            batch = %batch_id,
            strategy = self.strategy.name()
        );
        self.run_batch(batch_id, &cancel).instrument(span).await
    }

    async fn run_batch(
        &self,
        batch_id: BatchId,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        let started_at = Utc::now();
        let strategy = self.strategy.name();
        // Early returns must not leave the last batch visible
        self.tracker.init(&[]);

        let candidates = match self.discover().await {
            Ok(Some(candidates)) => candidates,
            Ok(None) => {
                info!("Migration disabled; nothing to do");
                return Ok(BatchReport::empty(
                    batch_id,
                    strategy,
                    BatchDisposition::Disabled,
                    started_at,
                ));
            }
            Err(e) => {
                error!(error = %e, "Migration batch aborted before any change");
                return Err(e);
            }
        };

        if candidates.is_empty() {
            info!("No migration candidates found");
            return Ok(BatchReport::empty(
                batch_id,
                strategy,
                BatchDisposition::NoCandidates,
                started_at,
            ));
        }

        self.tracker.init(&candidates);
        info!(candidates = candidates.len(), "Starting migration batch");

        let engine = MigrationEngine::new(
            self.instances.clone(),
            self.tracker.clone(),
            self.settings.health_timeout(),
            self.settings.poll_interval(),
        );
        let step_delay = self.settings.step_delay();
        let mut disposition = BatchDisposition::Finished;

        for (index, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                disposition = BatchDisposition::Cancelled;
                break;
            }

            let outcome = engine.migrate(&self.strategy, candidate, cancel).await;
            if outcome == MigrationOutcome::Interrupted {
                disposition = BatchDisposition::Cancelled;
                break;
            }

            let is_last = index + 1 == candidates.len();
            if !is_last && !step_delay.is_zero() {
                debug!(delay_secs = step_delay.as_secs(), "Pausing before next candidate");
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        disposition = BatchDisposition::Cancelled;
                        break;
                    }

                    () = tokio::time::sleep(step_delay) => {}
                }
            }
        }

        if disposition == BatchDisposition::Cancelled {
            self.log_cancellation();
        }

        Ok(self.report(batch_id, disposition, started_at))
    }

    async fn discover(&self) -> Result<Option<Vec<MigrationCandidate>>, BatchError> {
        if !self.strategy.is_enabled() {
            return Ok(None);
        }

        let selector = self.strategy.prepare(self.channels.as_ref()).await?;

        let instances = self
            .instances
            .list(&self.strategy.list_filter())
            .await
            .map_err(BatchError::ListInstances)?;

        let mut candidates: Vec<MigrationCandidate> = instances
            .into_iter()
            .filter_map(|instance| {
                let target = selector.target_for(&instance)?;
                Some(MigrationCandidate::new(
                    instance.name,
                    instance.version_source,
                    target,
                ))
            })
            .collect();

        candidates.sort_by(|a, b| a.instance_name.cmp(&b.instance_name));
        candidates.dedup_by(|a, b| a.instance_name == b.instance_name);

        for candidate in &candidates {
            debug!(
                instance = %candidate.instance_name,
                from = %candidate.original_version_source,
                to = %candidate.target_version_source,
                "Selected migration candidate"
            );
        }
        Ok(Some(candidates))
    }

    fn log_cancellation(&self) {
        let unresolved = self.tracker.pending_states();
        warn!(pending = unresolved.len(), "Migration batch cancelled");

        for (instance, state) in unresolved {
            warn!(
                instance = %instance,
                status = %state.status,
                original = %state.original_version_source,
                target = %state.target_version_source,
                detail = state.detail.as_deref().unwrap_or(""),
                "Unresolved candidate"
            );
        }
    }

    fn report(
        &self,
        batch_id: BatchId,
        disposition: BatchDisposition,
        started_at: DateTime<Utc>,
    ) -> BatchReport {
        let summary = self.tracker.summary();
        summary.log(self.strategy.name());

        BatchReport {
            batch_id,
            strategy: self.strategy.name().to_string(),
            disposition,
            started_at,
            finished_at: Utc::now(),
            summary,
            states: self.tracker.snapshot(),
            pending: self.tracker.pending(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelMigrationSettings, CustomVersionMigrationSettings};
    use crate::strategy::{ChannelToChannel, CustomVersionToChannel};
    use fleet_core::{InstanceConfig, VersionSource};
    use fleet_test_utils::{FakeChannelDirectory, FakeInstanceDirectory};

    fn channels() -> Arc<FakeChannelDirectory> {
        Arc::new(
            FakeChannelDirectory::new()
                .with_channel("stable", "5.12.0")
                .with_channel("stable-v5", "5.12.0")
                .with_channel("stable-v6", "6.1.0"),
        )
    }

    #[tokio::test]
    async fn plan_sorts_and_filters_custom_versions() {
        let instances = Arc::new(
            FakeInstanceDirectory::new()
                .with_instance(InstanceConfig::new("charlie", VersionSource::custom("5.1.0")))
                .with_instance(InstanceConfig::new("alpha", VersionSource::custom("5.2.0")))
                .with_instance(InstanceConfig::new("bravo", VersionSource::channel("stable")))
                .with_instance(InstanceConfig::new("delta", VersionSource::Unset)),
        );
        let settings = MigrationSettings::new().with_custom_version_target("stable");
        let orchestrator = BatchOrchestrator::new(
            CustomVersionToChannel::new(settings.custom_version.clone()),
            instances.clone(),
            channels(),
            settings,
        );

        let plan = orchestrator.plan().await.unwrap().unwrap();

        let names: Vec<_> = plan.iter().map(|c| c.instance_name.as_str()).collect();
        assert_eq!(names, ["alpha", "charlie"]);
        assert_eq!(plan[0].original_version_source, VersionSource::custom("5.2.0"));
        assert_eq!(plan[0].target_version_source, VersionSource::channel("stable"));
        assert_eq!(instances.write_count(), 0);
    }

    #[tokio::test]
    async fn plan_is_none_when_disabled() {
        let orchestrator = BatchOrchestrator::new(
            ChannelToChannel::new(ChannelMigrationSettings {
                enabled: false,
                mapping: "stable-v5:stable-v6".into(),
            }),
            Arc::new(FakeInstanceDirectory::new()),
            channels(),
            MigrationSettings::new(),
        );

        assert_eq!(orchestrator.plan().await, Ok(None));
    }

    #[tokio::test]
    async fn unknown_target_channel_aborts_plan() {
        let orchestrator = BatchOrchestrator::new(
            CustomVersionToChannel::new(CustomVersionMigrationSettings {
                enabled: true,
                target_channel: "missing".into(),
            }),
            Arc::new(FakeInstanceDirectory::new()),
            channels(),
            MigrationSettings::new(),
        );

        assert_eq!(
            orchestrator.plan().await,
            Err(BatchError::UnknownChannel {
                channel: "missing".into()
            })
        );
    }
}
