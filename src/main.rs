//! steadfast command-line entry point.
//!
//! ```text
//! steadfast [--config PATH] validate
//!     → load + validate config → print effective config as JSON
//!
//! steadfast [--config PATH] simulate --items N --failure-rate P --seed S [--metrics]
//!     → seeded flaky workload through pool → breaker → retry → timeout
//!     → print JSON report (and Prometheus text with --metrics)
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use steadfast::config::{load_config, ToolkitConfig};
use steadfast::observability::{logging, metrics};
use steadfast::simulation::{run_simulation, SimulationParams};

#[derive(Parser)]
#[command(name = "steadfast")]
#[command(about = "Validate toolkit configs and exercise the resilience primitives")]
#[command(long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration, then print it
    Validate,
    /// Run a seeded flaky workload and report the outcome
    Simulate {
        /// Number of work items
        #[arg(long, default_value_t = 50)]
        items: usize,

        /// Probability that a single attempt fails (0.0 to 1.0)
        #[arg(long, default_value_t = 0.2)]
        failure_rate: f64,

        /// Mean latency of a single attempt in milliseconds
        #[arg(long, default_value_t = 10)]
        latency_ms: u64,

        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Also print the Prometheus exposition of the run's counters
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ToolkitConfig::default(),
    };

    // A subscriber may already be installed when embedded; keep going.
    if let Err(err) = logging::init_logging(&config.observability) {
        eprintln!("logging not initialized: {err}");
    }

    match cli.command {
        Commands::Validate => {
            tracing::info!("Configuration is valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate {
            items,
            failure_rate,
            latency_ms,
            seed,
            metrics: show_metrics,
        } => {
            let recorder = if show_metrics && config.observability.metrics_enabled {
                Some(metrics::install_recorder()?)
            } else {
                None
            };

            let params = SimulationParams {
                items,
                failure_rate,
                latency: Duration::from_millis(latency_ms),
                seed,
            };
            let report = run_simulation(&config, &params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Some(handle) = recorder {
                println!("{}", handle.render());
            }
        }
    }

    Ok(())
}
