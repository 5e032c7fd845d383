//! fleet-reconciler - migrate fleet instances between version sources

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_migration::{BatchReport, CancellationToken};
use fleet_reconciler::{logging, settings, LogFormat, ManifestDirectory, Overrides, Reconciler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// fleet-reconciler - supervised version-source migrations
#[derive(Parser, Debug)]
#[command(name = "fleet-reconciler")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Migration settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fleet manifest (YAML)
    #[arg(short, long, default_value = "fleet.yaml")]
    fleet: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the candidates each migration would process, without writing
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run both migrations
    Run {
        /// Print the batch reports as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.log_level.as_deref())?;

    let settings = settings::load(cli.config.as_deref(), &cli.overrides)?;
    let directory = Arc::new(
        ManifestDirectory::load(&cli.fleet)
            .await
            .context("loading fleet manifest")?,
    );
    let reconciler = Reconciler::new(&settings, directory.clone(), directory);

    match cli.command {
        Commands::Plan { json } => {
            let plan = reconciler.plan().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan("custom-version-to-channel", plan.custom_version.as_deref());
                print_plan("channel-to-channel", plan.channel.as_deref());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { json } => {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, cancelling migrations");
                    trigger.cancel();
                }
            });

            let outcome = reconciler.run(&cancel).await;

            for result in [&outcome.custom_version, &outcome.channel] {
                match result {
                    Ok(report) if json => println!("{}", serde_json::to_string_pretty(report)?),
                    Ok(report) => print_report(report),
                    Err(e) => eprintln!("error: {e}"),
                }
            }

            Ok(if outcome.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn print_plan(strategy: &str, candidates: Option<&[fleet_migration::MigrationCandidate]>) {
    match candidates {
        None => println!("{strategy}: disabled"),
        Some([]) => println!("{strategy}: no candidates"),
        Some(candidates) => {
            println!("{strategy}: {} candidate(s)", candidates.len());
            for c in candidates {
                println!(
                    "  {}  {} -> {}",
                    c.instance_name, c.original_version_source, c.target_version_source
                );
            }
        }
    }
}

fn print_report(report: &BatchReport) {
    let s = &report.summary;
    println!(
        "{} [{}] {:?}: completed={} failed={} skipped-unhealthy={} rolled-back={} rollback-failed={}",
        report.strategy,
        report.batch_id,
        report.disposition,
        s.completed,
        s.failed,
        s.skipped_unhealthy,
        s.rolled_back,
        s.rollback_failed,
    );
    for name in report.needs_attention() {
        println!("  needs attention: {name}");
    }
    if !report.pending.is_empty() {
        println!("  pending: {}", report.pending.join(", "));
    }
}
