//! Health gate
//!
//! Polls an instance's readiness at a fixed cadence until it reports ready,
//! an absolute deadline passes, or the batch is cancelled. Fetch errors are
//! treated as "not ready yet" and retried on the next tick.

use crate::error::HealthGateError;
use fleet_core::InstanceDirectory;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Readiness poller shared by forward migration and rollback
#[derive(Clone)]
pub struct HealthGate {
    directory: Arc<dyn InstanceDirectory>,
    poll_interval: Duration,
}

impl std::fmt::Debug for HealthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthGate")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl HealthGate {
    /// Create a gate polling every `poll_interval` (minimum 1ms)
    #[must_use]
    pub fn new(directory: Arc<dyn InstanceDirectory>, poll_interval: Duration) -> Self {
        Self {
            directory,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `instance` reports ready
    ///
    /// The deadline is fixed at `now + timeout` when called. The first poll
    /// happens one interval after the call.
    ///
    /// # Errors
    /// - `HealthGateError::Timeout` once the deadline has passed
    /// - `HealthGateError::Cancelled` as soon as `cancel` fires
    pub async fn await_ready(
        &self,
        instance: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), HealthGateError> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut ticker = tokio::time::interval_at(start + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0u32;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(instance, polls, "Health wait cancelled");
                    return Err(HealthGateError::Cancelled {
                        instance: instance.to_string(),
                    });
                }

                _ = ticker.tick() => {}
            }

            if Instant::now() > deadline {
                return Err(HealthGateError::Timeout {
                    instance: instance.to_string(),
                    timeout,
                });
            }

            polls += 1;
            match self.directory.get(instance).await {
                Ok(observed) if observed.is_ready => {
                    debug!(
                        instance,
                        polls,
                        elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Instance ready"
                    );
                    return Ok(());
                }
                Ok(_) => trace!(instance, polls, "Instance not ready yet"),
                Err(e) => warn!(instance, polls, error = %e, "Readiness check failed, retrying"),
            }
        }
    }
}
