//! Reconciler runs against a manifest-backed fleet

use fleet_core::VersionSource;
use fleet_migration::{BatchDisposition, CancellationToken, MigrationSettings, MigrationStatus};
use fleet_reconciler::{ManifestDirectory, Reconciler};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const FLEET: &str = r"
channels:
  - name: stable
    target_version: 5.12.0
  - name: stable-v5
    target_version: 5.12.0
  - name: stable-v6
    target_version: 6.1.0
instances:
  - name: payments
    version_source: { kind: custom_version, value: 5.10.2 }
  - name: search
    version_source: { kind: release_channel, value: stable-v5 }
  - name: billing
    ready: false
    version_source: { kind: custom_version, value: 5.9.0 }
  - name: ledger
    version_source: { kind: release_channel, value: stable }
";

fn settings() -> MigrationSettings {
    MigrationSettings::new()
        .with_health_timeout_secs(5)
        .with_step_delay_secs(0)
        .with_poll_interval_ms(10)
        .with_custom_version_target("stable")
        .with_channel_mapping("stable-v5:stable-v6")
}

async fn fleet() -> (tempfile::TempDir, Arc<ManifestDirectory>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.yaml");
    std::fs::write(&path, FLEET).unwrap();
    let directory = Arc::new(ManifestDirectory::load(&path).await.unwrap());
    (dir, directory)
}

#[tokio::test]
async fn plan_lists_both_variants_without_writing() {
    let (dir, directory) = fleet().await;
    let reconciler = Reconciler::new(&settings(), directory.clone(), directory.clone());

    let plan = reconciler.plan().await.unwrap();

    let custom: Vec<_> = plan
        .custom_version
        .unwrap()
        .into_iter()
        .map(|c| c.instance_name)
        .collect();
    assert_eq!(custom, ["billing", "payments"]);
    let channel = plan.channel.unwrap();
    assert_eq!(channel.len(), 1);
    assert_eq!(channel[0].target_version_source, VersionSource::channel("stable-v6"));

    let on_disk = std::fs::read_to_string(dir.path().join("fleet.yaml")).unwrap();
    assert_eq!(on_disk, FLEET);
}

#[tokio::test]
async fn run_migrates_and_persists_manifest() {
    let (dir, directory) = fleet().await;
    let reconciler = Reconciler::new(&settings(), directory.clone(), directory.clone());

    let outcome = reconciler.run(&CancellationToken::new()).await;

    let custom = outcome.custom_version.as_ref().unwrap();
    assert_eq!(custom.disposition, BatchDisposition::Finished);
    assert_eq!(custom.status_of("payments"), Some(MigrationStatus::Completed));
    assert_eq!(custom.status_of("billing"), Some(MigrationStatus::SkippedUnhealthy));
    let channel = outcome.channel.as_ref().unwrap();
    assert_eq!(channel.status_of("search"), Some(MigrationStatus::Completed));
    assert!(outcome.is_clean());

    let reloaded = ManifestDirectory::load(dir.path().join("fleet.yaml")).await.unwrap();
    let manifest = reloaded.manifest().await;
    let source_of = |name: &str| {
        manifest
            .instances
            .iter()
            .find(|i| i.config.name == name)
            .map(|i| i.config.version_source.clone())
            .unwrap()
    };
    assert_eq!(source_of("payments"), VersionSource::channel("stable"));
    assert_eq!(source_of("search"), VersionSource::channel("stable-v6"));
    assert_eq!(source_of("billing"), VersionSource::custom("5.9.0"));
    assert_eq!(source_of("ledger"), VersionSource::channel("stable"));
}

#[tokio::test]
async fn bad_mapping_fails_plan() {
    let (_dir, directory) = fleet().await;
    let settings = settings().with_channel_mapping("stable-v5:stable-v9");
    let reconciler = Reconciler::new(&settings, directory.clone(), directory.clone());

    let err = reconciler.plan().await.unwrap_err();
    assert!(format!("{err:#}").contains("stable-v9"));
}
