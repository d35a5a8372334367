//! nodescaled — the nodescale daemon.
//!
//! # Usage
//!
//! ```text
//! nodescaled check-config --config nodescale.toml
//! nodescaled simulate --config nodescale.toml --snapshot cluster.json [--loop]
//! ```
//!
//! `simulate` serves the cloud state in the snapshot through the in-memory
//! control planes, so a config can be exercised end to end without cloud
//! credentials.

mod simulate;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nodescale_core::NodescaleConfig;

const DEFAULT_FILTER: &str = "info,nodescale=debug,nodescaled=debug";

#[derive(Parser)]
#[command(name = "nodescaled", about = "nodescale cluster autoscaler daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and validate a config file.
    CheckConfig {
        #[arg(long, default_value = "nodescale.toml")]
        config: PathBuf,
    },
    /// Run scale-up against a cluster snapshot and in-memory cloud state.
    Simulate {
        #[arg(long, default_value = "nodescale.toml")]
        config: PathBuf,

        /// JSON snapshot with `nodes`, `pods`, `aws_groups` and `gce_groups`.
        #[arg(long)]
        snapshot: PathBuf,

        /// Keep running cycles at the configured interval until Ctrl-C.
        #[arg(long = "loop")]
        run_loop: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    match cli.command {
        Command::CheckConfig { config } => check_config(&config),
        Command::Simulate {
            config,
            snapshot,
            run_loop,
        } => simulate::run(&config, &snapshot, run_loop).await,
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = NodescaleConfig::from_file(path)?;
    config.validate()?;
    info!(path = %path.display(), providers = config.providers.len(), "config is valid");

    println!(
        "scale-up every {:?}, cache refresh every {:?}, expander {:?}, resize mode {:?}",
        config.scale_up_interval()?,
        config.refresh_interval()?,
        config.scale_up.expander,
        config.scale_up.resize_mode,
    );
    for provider in &config.providers {
        println!("{}:", provider.kind.as_str());
        for group in &provider.node_groups {
            println!("  {group}");
        }
    }
    Ok(())
}
