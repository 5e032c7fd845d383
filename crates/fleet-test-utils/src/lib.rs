//! Testing utilities for the fleet workspace
//!
//! In-memory directory fakes with scripted readiness, injectable failures
//! and a write journal.

#![allow(missing_docs)]

use async_trait::async_trait;
use fleet_core::{
    Channel, ChannelDirectory, DirectoryError, Instance, InstanceConfig, InstanceDirectory,
    ListFilter, VersionSource,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

/// One successful configuration write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub instance: String,
    pub version_source: VersionSource,
}

#[derive(Debug)]
struct FakeInstance {
    config: InstanceConfig,
    healthy: bool,
    /// Never ready on these sources once a write installed them
    breaks_on: Vec<VersionSource>,
    written: bool,
    warmup_polls: u32,
    warmup_remaining: u32,
    flaky_gets: u32,
    fail_read: bool,
    failing_writes: BTreeSet<u32>,
    write_attempts: u32,
    gets: usize,
}

impl FakeInstance {
    fn new(config: InstanceConfig) -> Self {
        Self {
            config,
            healthy: true,
            breaks_on: Vec::new(),
            written: false,
            warmup_polls: 0,
            warmup_remaining: 0,
            flaky_gets: 0,
            fail_read: false,
            failing_writes: BTreeSet::new(),
            write_attempts: 0,
            gets: 0,
        }
    }

    fn is_broken(&self) -> bool {
        self.written && self.breaks_on.contains(&self.config.version_source)
    }

    fn snapshot(&self, is_ready: bool) -> Instance {
        Instance::new(&self.config.name, self.config.version_source.clone()).with_ready(is_ready)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    instances: Vec<FakeInstance>,
    writes: Vec<WriteRecord>,
    list_error: Option<DirectoryError>,
    cancel_after_writes: Option<(usize, CancellationToken)>,
}

impl FakeState {
    fn find_mut(&mut self, name: &str) -> Option<&mut FakeInstance> {
        self.instances.iter_mut().find(|i| i.config.name == name)
    }

    fn find(&self, name: &str) -> Option<&FakeInstance> {
        self.instances.iter().find(|i| i.config.name == name)
    }
}

/// Scripted in-memory instance directory
///
/// Instances are listed in insertion order.
#[derive(Debug, Default)]
pub struct FakeInstanceDirectory {
    state: Mutex<FakeState>,
}

impl FakeInstanceDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ready instance
    #[must_use]
    pub fn with_instance(self, config: InstanceConfig) -> Self {
        self.state.lock().instances.push(FakeInstance::new(config));
        self
    }

    /// Instance never reports ready
    #[must_use]
    pub fn unhealthy(self, name: &str) -> Self {
        self.configure(name, |i| i.healthy = false)
    }

    /// Instance never reports ready after a write installs `source`
    #[must_use]
    pub fn breaks_on(self, name: &str, source: VersionSource) -> Self {
        self.configure(name, |i| i.breaks_on.push(source))
    }

    /// Instance reports not ready for `polls` gets after every write
    #[must_use]
    pub fn with_warmup(self, name: &str, polls: u32) -> Self {
        self.configure(name, |i| i.warmup_polls = polls)
    }

    /// Next `count` gets fail with `DirectoryError::Unavailable`
    #[must_use]
    pub fn with_flaky_gets(self, name: &str, count: u32) -> Self {
        self.configure(name, |i| i.flaky_gets = count)
    }

    /// Every configuration read fails
    #[must_use]
    pub fn fail_read(self, name: &str) -> Self {
        self.configure(name, |i| i.fail_read = true)
    }

    /// The `attempt`-th write (1-based) to this instance is rejected
    #[must_use]
    pub fn fail_write(self, name: &str, attempt: u32) -> Self {
        self.configure(name, |i| {
            i.failing_writes.insert(attempt);
        })
    }

    /// Listing fails with `error`
    #[must_use]
    pub fn fail_list(self, error: DirectoryError) -> Self {
        self.state.lock().list_error = Some(error);
        self
    }

    /// Cancel `token` once `writes` writes have succeeded
    #[must_use]
    pub fn cancel_after_writes(self, writes: usize, token: CancellationToken) -> Self {
        self.state.lock().cancel_after_writes = Some((writes, token));
        self
    }

    /// Arm the warmup countdown without a write
    pub fn start_warmup(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(instance) = state.find_mut(name) {
            instance.warmup_remaining = instance.warmup_polls;
        }
    }

    /// Stored configuration
    #[must_use]
    pub fn config(&self, name: &str) -> Option<InstanceConfig> {
        self.state.lock().find(name).map(|i| i.config.clone())
    }

    /// Number of gets served for `name`, failed ones included
    #[must_use]
    pub fn get_count(&self, name: &str) -> usize {
        self.state.lock().find(name).map_or(0, |i| i.gets)
    }

    /// Successful writes across all instances, in order
    #[must_use]
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Version sources written to `name`, in order
    #[must_use]
    pub fn writes_for(&self, name: &str) -> Vec<VersionSource> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.instance == name)
            .map(|w| w.version_source.clone())
            .collect()
    }

    /// Instance names in the order they were first written
    #[must_use]
    pub fn write_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for write in &self.state.lock().writes {
            if !order.contains(&write.instance) {
                order.push(write.instance.clone());
            }
        }
        order
    }

    fn configure(self, name: &str, f: impl FnOnce(&mut FakeInstance)) -> Self {
        {
            let mut state = self.state.lock();
            let instance = state
                .find_mut(name)
                .unwrap_or_else(|| panic!("fake instance {name} not registered"));
            f(instance);
        }
        self
    }
}

#[async_trait]
impl InstanceDirectory for FakeInstanceDirectory {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Instance>, DirectoryError> {
        let state = self.state.lock();
        if let Some(error) = &state.list_error {
            return Err(error.clone());
        }
        Ok(state
            .instances
            .iter()
            .map(|i| i.snapshot(i.healthy && !i.is_broken()))
            .filter(|i| filter.admits(i))
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Instance, DirectoryError> {
        let mut state = self.state.lock();
        let instance = state
            .find_mut(name)
            .ok_or_else(|| DirectoryError::instance_not_found(name))?;

        instance.gets += 1;
        if instance.flaky_gets > 0 {
            instance.flaky_gets -= 1;
            return Err(DirectoryError::Unavailable(format!("flaky get for {name}")));
        }

        let warming = instance.warmup_remaining > 0;
        if warming {
            instance.warmup_remaining -= 1;
        }
        let ready = instance.healthy && !instance.is_broken() && !warming;
        Ok(instance.snapshot(ready))
    }

    async fn read_config(&self, name: &str) -> Result<InstanceConfig, DirectoryError> {
        let state = self.state.lock();
        let instance = state
            .find(name)
            .ok_or_else(|| DirectoryError::instance_not_found(name))?;
        if instance.fail_read {
            return Err(DirectoryError::Unavailable(format!("read of {name} failed")));
        }
        Ok(instance.config.clone())
    }

    async fn write_config(&self, name: &str, config: InstanceConfig) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        let instance = state
            .find_mut(name)
            .ok_or_else(|| DirectoryError::instance_not_found(name))?;

        instance.write_attempts += 1;
        if instance.failing_writes.contains(&instance.write_attempts) {
            return Err(DirectoryError::Rejected {
                name: name.to_string(),
                reason: format!("write attempt {} rejected", instance.write_attempts),
            });
        }

        let version_source = config.version_source.clone();
        instance.config = config;
        instance.written = true;
        instance.warmup_remaining = instance.warmup_polls;

        state.writes.push(WriteRecord {
            instance: name.to_string(),
            version_source,
        });

        let written = state.writes.len();
        if let Some((threshold, token)) = &state.cancel_after_writes {
            if written >= *threshold {
                token.cancel();
            }
        }
        Ok(())
    }
}

/// In-memory channel directory
#[derive(Debug, Default)]
pub struct FakeChannelDirectory {
    channels: BTreeMap<String, Channel>,
    unavailable: bool,
    lookups: Mutex<Vec<String>>,
}

impl FakeChannelDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_channel(mut self, name: &str, target_version: &str) -> Self {
        self.channels
            .insert(name.to_string(), Channel::new(name, target_version));
        self
    }

    /// Every lookup fails with `DirectoryError::Unavailable`
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Channel names looked up so far
    #[must_use]
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl ChannelDirectory for FakeChannelDirectory {
    async fn get(&self, name: &str) -> Result<Channel, DirectoryError> {
        self.lookups.lock().push(name.to_string());
        if self.unavailable {
            return Err(DirectoryError::Unavailable("channel directory down".into()));
        }
        self.channels
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::channel_not_found(name))
    }
}
