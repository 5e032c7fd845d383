//! Per-candidate migration state
//!
//! Each candidate moves through:
//!
//! ```text
//! pending -> in-progress -> completed
//! pending -> in-progress -> rolled-back
//! pending -> in-progress -> rollback-failed
//! pending -> failed
//! pending -> in-progress -> failed
//! pending -> skipped-unhealthy
//! ```
//!
//! The batch loop is the only writer. [`StateTracker`] is a cheap clone
//! handle so observers can read snapshots while a batch runs.

use crate::error::TransitionError;
use crate::strategy::MigrationCandidate;
use crate::summary::BatchSummary;
use chrono::{DateTime, Utc};
use fleet_core::VersionSource;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Migration status of a single candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    SkippedUnhealthy,
    RolledBack,
    RollbackFailed,
}

impl MigrationStatus {
    /// All statuses in graph order
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
        Self::SkippedUnhealthy,
        Self::RolledBack,
        Self::RollbackFailed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::SkippedUnhealthy => "skipped-unhealthy",
            Self::RolledBack => "rolled-back",
            Self::RollbackFailed => "rollback-failed",
        }
    }

    /// No further transitions allowed
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }

    /// Entering this status removes the candidate from the pending set
    ///
    /// `rollback-failed` is terminal but stays pending: the instance is in
    /// an ambiguous state and needs an operator.
    #[inline]
    #[must_use]
    pub fn resolves_pending(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::SkippedUnhealthy | Self::RolledBack
        )
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses reachable from `from`
#[must_use]
pub fn allowed_transitions(from: MigrationStatus) -> &'static [MigrationStatus] {
    use MigrationStatus::*;
    match from {
        Pending => &[InProgress, Failed, SkippedUnhealthy],
        InProgress => &[Completed, Failed, RolledBack, RollbackFailed],
        Completed | Failed | SkippedUnhealthy | RolledBack | RollbackFailed => &[],
    }
}

/// Check a transition against the status graph
#[inline]
#[must_use]
pub fn is_allowed(from: MigrationStatus, to: MigrationStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// State of one candidate within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    /// Version source before the batch touched the instance
    pub original_version_source: VersionSource,
    /// Version source the batch moves the instance to
    pub target_version_source: VersionSource,
    pub status: MigrationStatus,
    /// Last error or note recorded with a transition
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    states: IndexMap<String, MigrationState>,
    pending: IndexSet<String>,
}

/// Shared handle to the state of the current batch
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    inner: Arc<RwLock<TrackerInner>>,
}

impl StateTracker {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the tracker with every candidate `pending`, in order
    pub fn init(&self, candidates: &[MigrationCandidate]) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.states.clear();
        inner.pending.clear();

        for candidate in candidates {
            inner.states.insert(
                candidate.instance_name.clone(),
                MigrationState {
                    original_version_source: candidate.original_version_source.clone(),
                    target_version_source: candidate.target_version_source.clone(),
                    status: MigrationStatus::Pending,
                    detail: None,
                    updated_at: now,
                },
            );
            inner.pending.insert(candidate.instance_name.clone());
        }
    }

    /// Move `instance` to `to`
    ///
    /// Returns the previous status.
    ///
    /// # Errors
    /// - `TransitionError::UnknownCandidate` if `instance` is not tracked
    /// - `TransitionError::IllegalTransition` if the graph forbids the move
    pub fn transition(
        &self,
        instance: &str,
        to: MigrationStatus,
        detail: Option<String>,
    ) -> Result<MigrationStatus, TransitionError> {
        let mut inner = self.inner.write();
        let state = inner
            .states
            .get_mut(instance)
            .ok_or_else(|| TransitionError::UnknownCandidate(instance.to_string()))?;

        let from = state.status;
        if !is_allowed(from, to) {
            return Err(TransitionError::IllegalTransition {
                instance: instance.to_string(),
                from,
                to,
            });
        }

        state.status = to;
        state.updated_at = Utc::now();
        if detail.is_some() {
            state.detail = detail;
        }

        if to.resolves_pending() {
            inner.pending.shift_remove(instance);
        }
        Ok(from)
    }

    #[must_use]
    pub fn status(&self, instance: &str) -> Option<MigrationStatus> {
        self.inner.read().states.get(instance).map(|s| s.status)
    }

    #[must_use]
    pub fn state(&self, instance: &str) -> Option<MigrationState> {
        self.inner.read().states.get(instance).cloned()
    }

    /// Copy of every candidate's state, in batch order
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, MigrationState)> {
        self.inner
            .read()
            .states
            .iter()
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect()
    }

    /// Candidates not yet resolved, in batch order
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.inner.read().pending.iter().cloned().collect()
    }

    /// States of the pending candidates, in batch order
    ///
    /// Includes `rollback-failed` candidates alongside unstarted ones.
    #[must_use]
    pub fn pending_states(&self) -> Vec<(String, MigrationState)> {
        let inner = self.inner.read();
        inner
            .pending
            .iter()
            .filter_map(|name| Some((name.clone(), inner.states.get(name)?.clone())))
            .collect()
    }

    #[must_use]
    pub fn is_pending(&self, instance: &str) -> bool {
        self.inner.read().pending.contains(instance)
    }

    /// Status counts
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_statuses(self.inner.read().states.values().map(|s| s.status))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().states.is_empty()
    }
}
