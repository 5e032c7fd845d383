//! Migration engine
//!
//! Drives one candidate through its lifecycle:
//! 1. Precondition: the instance must be ready before it is touched
//! 2. Apply: read the full configuration, replace the version source, write
//! 3. Verify: wait on the health gate
//! 4. Compensate: roll back on health timeout
//!
//! Every failure ends as a status in the [`StateTracker`] plus a log record;
//! nothing propagates past [`MigrationEngine::migrate`].

use crate::error::ApplyError;
use crate::health::HealthGate;
use crate::rollback::RollbackController;
use crate::state::{MigrationStatus, StateTracker};
use crate::strategy::{MigrationCandidate, MigrationStrategy};
use fleet_core::{ConfigError, InstanceConfig, InstanceDirectory};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of migrating one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Candidate reached this status
    Resolved(MigrationStatus),
    /// Cancellation stopped the candidate mid-flight; it stays `in-progress`
    Interrupted,
}

/// Read the configuration of `instance`, rebuild it with `build` and write it back
///
/// On error the instance configuration is assumed unchanged.
pub(crate) async fn rewrite_config<F>(
    directory: &dyn InstanceDirectory,
    instance: &str,
    build: F,
) -> Result<(), ApplyError>
where
    F: FnOnce(&InstanceConfig) -> Result<InstanceConfig, ConfigError>,
{
    let current = directory
        .read_config(instance)
        .await
        .map_err(|source| ApplyError::ReadConfig {
            instance: instance.to_string(),
            source,
        })?;

    let next = build(&current).map_err(|source| ApplyError::BuildConfig {
        instance: instance.to_string(),
        source,
    })?;

    directory
        .write_config(instance, next)
        .await
        .map_err(|source| ApplyError::WriteConfig {
            instance: instance.to_string(),
            source,
        })
}

/// Per-candidate migration lifecycle
#[derive(Clone)]
pub struct MigrationEngine {
    directory: Arc<dyn InstanceDirectory>,
    health_gate: HealthGate,
    rollback: RollbackController,
    tracker: StateTracker,
    health_timeout: Duration,
}

impl MigrationEngine {
    /// Create an engine recording into `tracker`
    #[must_use]
    pub fn new(
        directory: Arc<dyn InstanceDirectory>,
        tracker: StateTracker,
        health_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        let health_gate = HealthGate::new(directory.clone(), poll_interval);
        let rollback = RollbackController::new(directory.clone(), health_gate.clone(), health_timeout);
        Self {
            directory,
            health_gate,
            rollback,
            tracker,
            health_timeout,
        }
    }

    /// Migrate one candidate
    ///
    /// The candidate must already be registered with the tracker.
    pub async fn migrate<S: MigrationStrategy>(
        &self,
        strategy: &S,
        candidate: &MigrationCandidate,
        cancel: &CancellationToken,
    ) -> MigrationOutcome {
        let instance = candidate.instance_name.as_str();

        match self.directory.get(instance).await {
            Ok(observed) if !observed.is_ready => {
                info!(instance, "Instance unhealthy before migration, skipping");
                return self.resolve(
                    instance,
                    MigrationStatus::SkippedUnhealthy,
                    Some("instance not ready before migration".to_string()),
                );
            }
            Ok(_) => {}
            Err(source) => {
                let err = ApplyError::Fetch {
                    instance: instance.to_string(),
                    source,
                };
                warn!(instance, error = %err, "Precondition check failed");
                return self.resolve(instance, MigrationStatus::Failed, Some(err.to_string()));
            }
        }

        self.record(instance, MigrationStatus::InProgress, None);
        info!(
            instance,
            from = %candidate.original_version_source,
            to = %candidate.target_version_source,
            "Migrating instance"
        );

        let applied = rewrite_config(self.directory.as_ref(), instance, |current| {
            strategy.build_config(current, &candidate.target_version_source)
        })
        .await;
        if let Err(err) = applied {
            warn!(instance, error = %err, "Applying target configuration failed");
            return self.resolve(instance, MigrationStatus::Failed, Some(err.to_string()));
        }

        match self
            .health_gate
            .await_ready(instance, self.health_timeout, cancel)
            .await
        {
            Ok(()) => {
                info!(instance, to = %candidate.target_version_source, "Migration completed");
                self.resolve(instance, MigrationStatus::Completed, None)
            }
            Err(err) if err.is_cancelled() => {
                warn!(instance, "Cancelled while awaiting health; instance left in progress");
                MigrationOutcome::Interrupted
            }
            Err(err) => {
                warn!(instance, error = %err, "Health check failed after migration");
                self.roll_back(candidate, err.to_string(), cancel).await
            }
        }
    }

    async fn roll_back(
        &self,
        candidate: &MigrationCandidate,
        cause: String,
        cancel: &CancellationToken,
    ) -> MigrationOutcome {
        let instance = candidate.instance_name.as_str();

        match self
            .rollback
            .rollback(instance, &candidate.original_version_source, cancel)
            .await
        {
            Ok(()) => self.resolve(instance, MigrationStatus::RolledBack, Some(cause)),
            Err(err) if err.is_cancelled() => {
                warn!(instance, "Cancelled during rollback; instance left in progress");
                MigrationOutcome::Interrupted
            }
            Err(err) => {
                error!(
                    instance,
                    original = %candidate.original_version_source,
                    target = %candidate.target_version_source,
                    error = %err,
                    "Rollback failed; instance state is ambiguous and needs manual intervention"
                );
                self.resolve(
                    instance,
                    MigrationStatus::RollbackFailed,
                    Some(format!("{cause}; {err}")),
                )
            }
        }
    }

    fn resolve(
        &self,
        instance: &str,
        status: MigrationStatus,
        detail: Option<String>,
    ) -> MigrationOutcome {
        self.record(instance, status, detail);
        MigrationOutcome::Resolved(status)
    }

    fn record(&self, instance: &str, status: MigrationStatus, detail: Option<String>) {
        if let Err(e) = self.tracker.transition(instance, status, detail) {
            error!(instance, error = %e, "State tracker rejected transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelMigrationSettings;
    use crate::strategy::ChannelToChannel;
    use fleet_core::{FederationConfig, VersionSource};
    use fleet_test_utils::FakeInstanceDirectory;

    const TIMEOUT: Duration = Duration::from_secs(60);
    const POLL: Duration = Duration::from_secs(5);

    fn stable_v5() -> VersionSource {
        VersionSource::channel("stable-v5")
    }

    fn stable_v6() -> VersionSource {
        VersionSource::channel("stable-v6")
    }

    fn strategy() -> ChannelToChannel {
        ChannelToChannel::new(ChannelMigrationSettings {
            enabled: true,
            mapping: "stable-v5:stable-v6".into(),
        })
    }

    fn candidate(name: &str) -> MigrationCandidate {
        MigrationCandidate::new(name, stable_v5(), stable_v6())
    }

    struct Harness {
        directory: Arc<FakeInstanceDirectory>,
        tracker: StateTracker,
        engine: MigrationEngine,
    }

    fn harness(directory: FakeInstanceDirectory, names: &[&str]) -> Harness {
        let directory = Arc::new(directory);
        let tracker = StateTracker::new();
        let candidates: Vec<_> = names.iter().map(|n| candidate(n)).collect();
        tracker.init(&candidates);
        let engine = MigrationEngine::new(directory.clone(), tracker.clone(), TIMEOUT, POLL);
        Harness {
            directory,
            tracker,
            engine,
        }
    }

    fn on_v5(name: &str) -> InstanceConfig {
        InstanceConfig::new(name, stable_v5())
    }

    async fn migrate(h: &Harness, name: &str) -> MigrationOutcome {
        h.engine
            .migrate(&strategy(), &candidate(name), &CancellationToken::new())
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn success_writes_once_and_completes() {
        let h = harness(
            FakeInstanceDirectory::new()
                .with_instance(on_v5("a"))
                .with_warmup("a", 2),
            &["a"],
        );

        let outcome = migrate(&h, "a").await;

        assert_eq!(outcome, MigrationOutcome::Resolved(MigrationStatus::Completed));
        assert_eq!(h.directory.write_count(), 1);
        assert_eq!(h.directory.config("a").unwrap().version_source, stable_v6());
        assert!(!h.tracker.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_instance_is_never_written() {
        let h = harness(
            FakeInstanceDirectory::new().with_instance(on_v5("a")).unhealthy("a"),
            &["a"],
        );

        let outcome = migrate(&h, "a").await;

        assert_eq!(
            outcome,
            MigrationOutcome::Resolved(MigrationStatus::SkippedUnhealthy)
        );
        assert_eq!(h.directory.write_count(), 0);
        assert!(!h.tracker.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_instance_fails_without_write() {
        let h = harness(FakeInstanceDirectory::new(), &["ghost"]);

        let outcome = migrate(&h, "ghost").await;

        assert_eq!(outcome, MigrationOutcome::Resolved(MigrationStatus::Failed));
        assert_eq!(h.directory.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_fails() {
        let h = harness(
            FakeInstanceDirectory::new().with_instance(on_v5("a")).fail_read("a"),
            &["a"],
        );

        let outcome = migrate(&h, "a").await;

        assert_eq!(outcome, MigrationOutcome::Resolved(MigrationStatus::Failed));
        assert_eq!(h.directory.write_count(), 0);
        let detail = h.tracker.state("a").unwrap().detail.unwrap();
        assert!(detail.contains("reading configuration of a failed"), "{detail}");
    }

    #[tokio::test(start_paused = true)]
    async fn build_failure_fails() {
        let broken = on_v5("a").with_federation(FederationConfig {
            enabled: true,
            ..FederationConfig::default()
        });
        let h = harness(FakeInstanceDirectory::new().with_instance(broken), &["a"]);

        let outcome = migrate(&h, "a").await;

        assert_eq!(outcome, MigrationOutcome::Resolved(MigrationStatus::Failed));
        assert_eq!(h.directory.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_fails_and_leaves_config() {
        let h = harness(
            FakeInstanceDirectory::new()
                .with_instance(on_v5("a"))
                .fail_write("a", 1),
            &["a"],
        );

        let outcome = migrate(&h, "a").await;

        assert_eq!(outcome, MigrationOutcome::Resolved(MigrationStatus::Failed));
        assert_eq!(h.directory.config("a").unwrap().version_source, stable_v5());
        assert!(!h.tracker.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn health_timeout_rolls_back() {
        let h = harness(
            FakeInstanceDirectory::new()
                .with_instance(on_v5("a"))
                .breaks_on("a", stable_v6()),
            &["a"],
        );

        let outcome = migrate(&h, "a").await;

        assert_eq!(outcome, MigrationOutcome::Resolved(MigrationStatus::RolledBack));
        assert_eq!(h.directory.writes_for("a"), vec![stable_v6(), stable_v5()]);
        assert_eq!(h.directory.config("a").unwrap().version_source, stable_v5());
        assert!(!h.tracker.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_write_failure_stays_pending() {
        let h = harness(
            FakeInstanceDirectory::new()
                .with_instance(on_v5("a"))
                .breaks_on("a", stable_v6())
                .fail_write("a", 2),
            &["a"],
        );

        let outcome = migrate(&h, "a").await;

        assert_eq!(
            outcome,
            MigrationOutcome::Resolved(MigrationStatus::RollbackFailed)
        );
        assert_eq!(h.directory.writes_for("a"), vec![stable_v6()]);
        assert!(h.tracker.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_health_failure_is_rollback_failed() {
        let h = harness(
            FakeInstanceDirectory::new()
                .with_instance(on_v5("a"))
                .breaks_on("a", stable_v6())
                .breaks_on("a", stable_v5()),
            &["a"],
        );

        let outcome = migrate(&h, "a").await;

        assert_eq!(
            outcome,
            MigrationOutcome::Resolved(MigrationStatus::RollbackFailed)
        );
        assert_eq!(h.directory.write_count(), 2);
        assert!(h.tracker.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_health_wait_leaves_in_progress() {
        let cancel = CancellationToken::new();
        let h = harness(
            FakeInstanceDirectory::new()
                .with_instance(on_v5("a"))
                .breaks_on("a", stable_v6())
                .cancel_after_writes(1, cancel.clone()),
            &["a"],
        );

        let outcome = h.engine.migrate(&strategy(), &candidate("a"), &cancel).await;

        assert_eq!(outcome, MigrationOutcome::Interrupted);
        assert_eq!(h.tracker.status("a"), Some(MigrationStatus::InProgress));
        assert!(h.tracker.is_pending("a"));
        // No rollback attempted
        assert_eq!(h.directory.write_count(), 1);
    }
}
