//! Batch summaries and reports
//!
//! A summary counts final statuses; its severity drives the level of the
//! closing log record. A report is what `run` hands back to the caller.

use crate::state::{MigrationState, MigrationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique batch identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Ulid);

impl BatchId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity of a batch summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SummarySeverity {
    Info,
    Warning,
    Error,
}

/// Status counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped_unhealthy: usize,
    pub rolled_back: usize,
    pub rollback_failed: usize,
}

impl BatchSummary {
    /// Count statuses
    pub fn from_statuses(statuses: impl IntoIterator<Item = MigrationStatus>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            let slot = match status {
                MigrationStatus::Pending => &mut summary.pending,
                MigrationStatus::InProgress => &mut summary.in_progress,
                MigrationStatus::Completed => &mut summary.completed,
                MigrationStatus::Failed => &mut summary.failed,
                MigrationStatus::SkippedUnhealthy => &mut summary.skipped_unhealthy,
                MigrationStatus::RolledBack => &mut summary.rolled_back,
                MigrationStatus::RollbackFailed => &mut summary.rollback_failed,
            };
            *slot += 1;
        }
        summary
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.pending
            + self.in_progress
            + self.completed
            + self.failed
            + self.skipped_unhealthy
            + self.rolled_back
            + self.rollback_failed
    }

    /// Rollback failures outrank failures and rollbacks
    #[must_use]
    pub fn severity(&self) -> SummarySeverity {
        if self.rollback_failed > 0 {
            SummarySeverity::Error
        } else if self.failed > 0 || self.rolled_back > 0 {
            SummarySeverity::Warning
        } else {
            SummarySeverity::Info
        }
    }

    /// Emit the summary at its severity
    pub fn log(&self, strategy: &str) {
        let Self {
            completed,
            failed,
            skipped_unhealthy,
            rolled_back,
            rollback_failed,
            ..
        } = *self;
        let unresolved = self.pending + self.in_progress;

        match self.severity() {
            SummarySeverity::Error => tracing::error!(
                strategy,
                completed,
                failed,
                skipped_unhealthy,
                rolled_back,
                rollback_failed,
                unresolved,
                "Migration batch finished; rollback failures need operator attention"
            ),
            SummarySeverity::Warning => tracing::warn!(
                strategy,
                completed,
                failed,
                skipped_unhealthy,
                rolled_back,
                rollback_failed,
                unresolved,
                "Migration batch finished with failures"
            ),
            SummarySeverity::Info => tracing::info!(
                strategy,
                completed,
                failed,
                skipped_unhealthy,
                rolled_back,
                rollback_failed,
                unresolved,
                "Migration batch finished"
            ),
        }
    }
}

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchDisposition {
    /// Strategy disabled in configuration
    Disabled,
    /// Nothing matched the migration source
    NoCandidates,
    /// Every candidate was attempted
    Finished,
    /// Cancellation stopped the batch early
    Cancelled,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub strategy: String,
    pub disposition: BatchDisposition,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BatchSummary,
    /// Final state of every candidate, in processing order
    pub states: Vec<(String, MigrationState)>,
    /// Candidates left unresolved, including rollback failures
    pub pending: Vec<String>,
}

impl BatchReport {
    /// Report for a batch that never reached any candidate
    #[must_use]
    pub fn empty(
        batch_id: BatchId,
        strategy: &str,
        disposition: BatchDisposition,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id,
            strategy: strategy.to_string(),
            disposition,
            started_at,
            finished_at: Utc::now(),
            summary: BatchSummary::default(),
            states: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Final status of one candidate
    #[must_use]
    pub fn status_of(&self, instance: &str) -> Option<MigrationStatus> {
        self.states
            .iter()
            .find(|(name, _)| name == instance)
            .map(|(_, state)| state.status)
    }

    #[inline]
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.disposition == BatchDisposition::Cancelled
    }

    /// Candidates an operator must look at
    #[must_use]
    pub fn needs_attention(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| {
                matches!(
                    s.status,
                    MigrationStatus::RollbackFailed | MigrationStatus::InProgress
                )
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
