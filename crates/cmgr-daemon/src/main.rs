//! cmgr — cluster-management reconciliation daemon
//!
//! Reconciles a batch scheduler's node inventory with a cloud provider's
//! instance fleet: launches replacements for unhealthy static nodes, drains
//! nodes behind failing instances, and terminates orphaned or inactive-
//! partition instances.

use clap::{Parser, Subcommand};
use cmgr_cloud::{testing::InMemoryCloudClient, CloudClient, RetryingCloudClient};
use cmgr_config::EngineConfig;
use cmgr_core::Reconciler;
use cmgr_scheduler::{testing::InMemorySchedulerClient, RetryingSchedulerClient, SchedulerClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cmgr")]
#[command(about = "Cluster-management reconciliation daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load config, wire adapters, and run the tick/sleep loop until terminated.
    Run {
        #[arg(short, long, default_value = "/etc/cmgr/config.json")]
        config: PathBuf,
    },

    /// Run exactly one tick and exit.
    Tick {
        #[arg(short, long, default_value = "/etc/cmgr/config.json")]
        config: PathBuf,
    },

    /// Write a sample config file with documented defaults.
    InitConfig {
        #[arg(short, long, default_value = "/etc/cmgr/config.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cmgr=info".parse()?))
        .init();

    match cli.command {
        Commands::Run { config } => run_daemon(config).await?,
        Commands::Tick { config } => run_single_tick(config).await?,
        Commands::InitConfig { output } => init_config(output)?,
    }

    Ok(())
}

// ─── Adapter wiring ───────────────────────────────────────────────────────────

/// Wires the scheduler/cloud adapters the daemon drives. This build ships
/// only the in-memory fakes (see `cmgr-scheduler`/`cmgr-cloud`'s `testing`
/// modules) wrapped in the bounded-retry decorators; a real deployment would
/// substitute adapters that shell out to the scheduler and call the cloud
/// provider's API behind the same trait boundary.
fn wire_adapters() -> (Arc<dyn SchedulerClient>, Arc<dyn CloudClient>) {
    let scheduler = RetryingSchedulerClient::new(InMemorySchedulerClient::default());
    let cloud = RetryingCloudClient::new(InMemoryCloudClient::default());
    (Arc::new(scheduler), Arc::new(cloud))
}

// ─── Run ──────────────────────────────────────────────────────────────────────

async fn run_daemon(config_path: PathBuf) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting cmgr");

    let config = EngineConfig::load(&config_path)?;
    info!(
        region = %config.region,
        cluster_name = %config.cluster_name,
        loop_time_secs = config.loop_time_secs,
        "loaded config"
    );

    let (scheduler, cloud) = wire_adapters();
    let mut reconciler = Reconciler::new(scheduler, cloud);

    loop {
        reconciler.tick(&config).await;
        tokio::time::sleep(std::time::Duration::from_secs(config.loop_time_secs)).await;
    }
}

// ─── Tick ─────────────────────────────────────────────────────────────────────

async fn run_single_tick(config_path: PathBuf) -> anyhow::Result<()> {
    let config = EngineConfig::load(&config_path)?;
    let (scheduler, cloud) = wire_adapters();
    let mut reconciler = Reconciler::new(scheduler, cloud);
    reconciler.tick(&config).await;
    Ok(())
}

// ─── InitConfig ───────────────────────────────────────────────────────────────

fn init_config(output: PathBuf) -> anyhow::Result<()> {
    let config = EngineConfig {
        region: "us-east-1".to_string(),
        cluster_name: "my-cluster".to_string(),
        ..EngineConfig::default()
    };

    config.save(&output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Edit the file to set region/cluster_name, then run:");
    println!("  cmgr run --config {}", output.display());

    Ok(())
}
