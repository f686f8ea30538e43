//! CLI definition and command dispatch.
//!
//! Settings layer in order: built-in defaults, then the YAML config file
//! when given, then individual flags. The run continues until interrupted
//! or, with `--duration`, until the deadline triggers the same graceful
//! shutdown path.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::harness::{Harness, HarnessConfig};

#[derive(Debug, Parser)]
#[command(
    name = "paceline",
    about = "Closed-loop HTTP load harness that paces itself toward a latency SLO",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a paced load test against a target
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target URL, including scheme
    #[arg(long)]
    pub url: Option<String>,

    /// YAML config file; flags override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Size of the request worker pool
    #[arg(long)]
    pub workers: Option<usize>,

    /// Latency objective in seconds
    #[arg(long)]
    pub slo: Option<f64>,

    /// Pacing delay in seconds before the first control step
    #[arg(long)]
    pub initial_delay: Option<f64>,

    /// Retry passes before a job is dropped
    #[arg(long)]
    pub retry_budget: Option<u32>,

    /// Centroid budget of each latency digest
    #[arg(long)]
    pub digest_compression: Option<f64>,

    /// Samples in the controller's trailing window
    #[arg(long)]
    pub window_capacity: Option<usize>,

    /// End-to-end bound on one request, in seconds
    #[arg(long)]
    pub request_timeout: Option<f64>,

    /// Stop after this many seconds; runs until interrupted when unset
    #[arg(long)]
    pub duration: Option<f64>,

    /// Extra header as NAME:VALUE, repeatable
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses the process arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Dispatches a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run(args).await,
    }
}

fn build_config(args: &RunArgs) -> anyhow::Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(url) = &args.url {
        config.target_url = url.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(slo) = args.slo {
        config.slo_secs = slo;
    }
    if let Some(initial_delay) = args.initial_delay {
        config.initial_delay_secs = initial_delay;
    }
    if let Some(retry_budget) = args.retry_budget {
        config.retry_budget = retry_budget;
    }
    if let Some(digest_compression) = args.digest_compression {
        config.digest_compression = digest_compression;
    }
    if let Some(window_capacity) = args.window_capacity {
        config.window_capacity = window_capacity;
    }
    if let Some(request_timeout) = args.request_timeout {
        config.request_timeout_secs = request_timeout;
    }
    for (name, value) in &args.headers {
        config.headers.insert(name.clone(), value.clone());
    }

    Ok(config)
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let harness = Harness::from_config(config).context("building harness")?;
    let trigger = harness.shutdown_trigger();

    {
        let trigger = trigger.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                trigger.trigger();
            }
        });
    }

    if let Some(seconds) = args.duration {
        let trigger = trigger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            info!(duration_secs = seconds, "deadline reached, shutting down");
            trigger.trigger();
        });
    }

    harness.run().await.context("running harness")
}
