//! Rollback controller
//!
//! Restores a candidate's original version source after a failed health
//! check, then verifies the restored instance with the same health policy
//! as the forward migration.

use crate::engine::rewrite_config;
use crate::error::RollbackError;
use crate::health::HealthGate;
use fleet_core::{InstanceDirectory, VersionSource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Reapplies pre-migration version sources
#[derive(Clone)]
pub struct RollbackController {
    directory: Arc<dyn InstanceDirectory>,
    health_gate: HealthGate,
    health_timeout: Duration,
}

impl RollbackController {
    #[must_use]
    pub fn new(
        directory: Arc<dyn InstanceDirectory>,
        health_gate: HealthGate,
        health_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            health_gate,
            health_timeout,
        }
    }

    /// Restore `original` on `instance` and wait for it to be ready
    ///
    /// # Errors
    /// - `RollbackError::Apply` if the re-read, rebuild or write fails
    /// - `RollbackError::Health` if the restored instance never becomes
    ///   ready, or the wait is cancelled
    pub async fn rollback(
        &self,
        instance: &str,
        original: &VersionSource,
        cancel: &CancellationToken,
    ) -> Result<(), RollbackError> {
        info!(instance, to = %original, "Rolling back version source");

        rewrite_config(self.directory.as_ref(), instance, |current| {
            current.with_version_source(original.clone())
        })
        .await?;

        self.health_gate
            .await_ready(instance, self.health_timeout, cancel)
            .await?;

        info!(instance, "Rollback verified healthy");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApplyError, HealthGateError};
    use fleet_core::InstanceConfig;
    use fleet_test_utils::FakeInstanceDirectory;

    fn controller(directory: &Arc<FakeInstanceDirectory>) -> RollbackController {
        let gate = HealthGate::new(directory.clone(), Duration::from_secs(5));
        RollbackController::new(directory.clone(), gate, Duration::from_secs(30))
    }

    fn migrated(name: &str) -> InstanceConfig {
        InstanceConfig::new(name, VersionSource::channel("stable-v6")).with_label("team", "a")
    }

    #[tokio::test(start_paused = true)]
    async fn restores_original_and_keeps_other_fields() {
        let directory = Arc::new(FakeInstanceDirectory::new().with_instance(migrated("a")));
        let original = VersionSource::channel("stable-v5");

        controller(&directory)
            .rollback("a", &original, &CancellationToken::new())
            .await
            .unwrap();

        let config = directory.config("a").unwrap();
        assert_eq!(config.version_source, original);
        assert_eq!(config.labels.get("team").map(String::as_str), Some("a"));
        assert_eq!(directory.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_is_reported() {
        let directory = Arc::new(
            FakeInstanceDirectory::new()
                .with_instance(migrated("a"))
                .fail_write("a", 1),
        );

        let result = controller(&directory)
            .rollback("a", &VersionSource::channel("stable-v5"), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RollbackError::Apply(ApplyError::WriteConfig { .. }))
        ));
        assert_eq!(directory.config("a").unwrap().version_source, VersionSource::channel("stable-v6"));
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_is_reported() {
        let directory = Arc::new(
            FakeInstanceDirectory::new()
                .with_instance(migrated("a"))
                .fail_read("a"),
        );

        let result = controller(&directory)
            .rollback("a", &VersionSource::channel("stable-v5"), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RollbackError::Apply(ApplyError::ReadConfig { .. }))
        ));
        assert_eq!(directory.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_after_restore_is_reported() {
        let directory = Arc::new(
            FakeInstanceDirectory::new()
                .with_instance(migrated("a"))
                .unhealthy("a"),
        );

        let result = controller(&directory)
            .rollback("a", &VersionSource::channel("stable-v5"), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RollbackError::Health(HealthGateError::Timeout { .. }))
        ));
    }
}
