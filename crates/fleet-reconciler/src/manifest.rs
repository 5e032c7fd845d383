//! File-backed fleet manifest
//!
//! A YAML document listing instances and release channels. Serves both
//! directory traits; every successful configuration write is persisted back
//! to the file before it is acknowledged.
//!
//! ```yaml
//! channels:
//!   - name: stable
//!     target_version: 5.12.0
//! instances:
//!   - name: team-a
//!     ready: true
//!     version_source: { kind: custom_version, value: 5.10.2 }
//! ```

use fleet_core::{
    Channel, ChannelDirectory, DirectoryError, Instance, InstanceConfig, InstanceDirectory,
    ListFilter,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Manifest loading and persistence errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("reading manifest {path} failed: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing manifest {path} failed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("instance {0} listed twice")]
    DuplicateInstance(String),
}

/// One instance entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInstance {
    /// Readiness reported to the health gate
    #[serde(default = "default_ready")]
    pub ready: bool,
    #[serde(flatten)]
    pub config: InstanceConfig,
}

fn default_ready() -> bool {
    true
}

/// Whole manifest document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub instances: Vec<ManifestInstance>,
}

impl Manifest {
    fn instance(&self, name: &str) -> Result<&ManifestInstance, DirectoryError> {
        self.instances
            .iter()
            .find(|i| i.config.name == name)
            .ok_or_else(|| DirectoryError::instance_not_found(name))
    }
}

/// Instance and channel directory backed by a manifest file
#[derive(Debug)]
pub struct ManifestDirectory {
    path: PathBuf,
    manifest: Mutex<Manifest>,
}

impl ManifestDirectory {
    /// Load the manifest at `path`
    ///
    /// # Errors
    /// Unreadable or malformed files, or duplicate instance names.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ManifestError::Read {
                path: path.clone(),
                source,
            })?;
        let manifest: Manifest =
            serde_yaml::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;

        let mut seen = std::collections::BTreeSet::new();
        for instance in &manifest.instances {
            if !seen.insert(instance.config.name.as_str()) {
                return Err(ManifestError::DuplicateInstance(instance.config.name.clone()));
            }
        }

        tracing::debug!(
            path = %path.display(),
            instances = manifest.instances.len(),
            channels = manifest.channels.len(),
            "Loaded fleet manifest"
        );
        Ok(Self {
            path,
            manifest: Mutex::new(manifest),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the in-memory manifest
    pub async fn manifest(&self) -> Manifest {
        self.manifest.lock().await.clone()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Replace the manifest file atomically via a sibling temp file
    async fn persist(&self, raw: String) -> Result<(), DirectoryError> {
        let temp_path = self.temp_path();
        let unavailable =
            |e: std::io::Error| DirectoryError::Unavailable(format!("{}: {e}", self.path.display()));

        if let Err(e) = tokio::fs::write(&temp_path, raw).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(unavailable(e));
        }
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(unavailable)
    }
}

#[async_trait::async_trait]
impl InstanceDirectory for ManifestDirectory {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Instance>, DirectoryError> {
        let manifest = self.manifest.lock().await;
        Ok(manifest
            .instances
            .iter()
            .map(|i| {
                Instance::new(&i.config.name, i.config.version_source.clone()).with_ready(i.ready)
            })
            .filter(|i| filter.admits(i))
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Instance, DirectoryError> {
        let manifest = self.manifest.lock().await;
        let entry = manifest.instance(name)?;
        Ok(Instance::new(name, entry.config.version_source.clone()).with_ready(entry.ready))
    }

    async fn read_config(&self, name: &str) -> Result<InstanceConfig, DirectoryError> {
        let manifest = self.manifest.lock().await;
        Ok(manifest.instance(name)?.config.clone())
    }

    async fn write_config(&self, name: &str, config: InstanceConfig) -> Result<(), DirectoryError> {
        if config.name != name {
            return Err(DirectoryError::Rejected {
                name: name.to_string(),
                reason: format!("configuration names {}", config.name),
            });
        }

        // Held across the file write so concurrent batches persist in order
        let mut manifest = self.manifest.lock().await;
        let mut next = manifest.clone();
        let slot = next
            .instances
            .iter_mut()
            .find(|i| i.config.name == name)
            .ok_or_else(|| DirectoryError::instance_not_found(name))?;
        slot.config = config;

        let raw = serde_yaml::to_string(&next).map_err(|e| DirectoryError::Malformed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.persist(raw).await?;

        *manifest = next;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChannelDirectory for ManifestDirectory {
    async fn get(&self, name: &str) -> Result<Channel, DirectoryError> {
        let manifest = self.manifest.lock().await;
        manifest
            .channels
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| DirectoryError::channel_not_found(name))
    }
}
