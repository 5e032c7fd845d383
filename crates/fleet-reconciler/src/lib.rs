//! Fleet Reconciler - operator entry point for fleet migrations
//!
//! Loads migration settings and a fleet manifest, then plans or runs the
//! custom-version and channel migrations.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod logging;
pub mod manifest;
pub mod reconciler;
pub mod settings;

pub use logging::LogFormat;
pub use manifest::{Manifest, ManifestDirectory, ManifestError, ManifestInstance};
pub use reconciler::{FleetOutcome, FleetPlan, Reconciler};
pub use settings::Overrides;
