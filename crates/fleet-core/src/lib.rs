//! Fleet Core - data model for the feature-toggle fleet control plane
//!
//! Provides:
//! - Instance and version-source types
//! - Instance configuration snapshots that can be rewritten in place
//! - Release channel lookups
//! - The directory traits the infrastructure layer implements
//!
//! # Example
//!
//! ```rust
//! use fleet_core::{InstanceConfig, VersionSource};
//!
//! let config = InstanceConfig::new("team-a", VersionSource::custom("5.10.2"));
//! let migrated = config
//!     .with_version_source(VersionSource::channel("stable"))
//!     .unwrap();
//!
//! assert_eq!(migrated.version_source.channel_name(), Some("stable"));
//! assert_eq!(migrated.name, "team-a");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod directory;
pub mod error;
pub mod types;

pub use directory::{ChannelDirectory, InstanceDirectory, ListFilter};
pub use error::{ConfigError, DirectoryError, ResourceKind};
pub use types::{
    Channel, DatabasePoolConfig, FederationConfig, Instance, InstanceConfig, VersionSource,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
