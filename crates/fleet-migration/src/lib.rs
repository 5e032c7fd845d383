//! Fleet Migration - supervised version-source migrations
//!
//! Moves instances from one version-selection configuration to another as
//! a sequential, health-gated, rollback-capable batch:
//! - custom pinned version to a release channel
//! - release channel to release channel, driven by a `source:target` map
//!
//! # Example
//!
//! ```rust
//! use fleet_migration::ChannelMap;
//!
//! let map: ChannelMap = "stable-v5:stable-v6, rapid-v5:rapid-v6,".parse().unwrap();
//! assert_eq!(map.target_for("stable-v5"), Some("stable-v6"));
//! assert_eq!(map.len(), 2);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod mapping;
pub mod orchestrator;
pub mod rollback;
pub mod state;
pub mod strategy;
pub mod summary;

pub use config::{ChannelMigrationSettings, CustomVersionMigrationSettings, MigrationSettings};
pub use engine::{MigrationEngine, MigrationOutcome};
pub use error::{
    ApplyError, BatchError, HealthGateError, MappingError, RollbackError, SettingsError,
    TransitionError,
};
pub use health::HealthGate;
pub use mapping::ChannelMap;
pub use orchestrator::BatchOrchestrator;
pub use rollback::RollbackController;
pub use state::{allowed_transitions, is_allowed, MigrationState, MigrationStatus, StateTracker};
pub use strategy::{
    CandidateSelector, ChannelTarget, ChannelToChannel, CustomVersionToChannel,
    MigrationCandidate, MigrationStrategy,
};
pub use summary::{BatchDisposition, BatchId, BatchReport, BatchSummary, SummarySeverity};

pub use tokio_util::sync::CancellationToken;
