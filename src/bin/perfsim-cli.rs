//! Perfsim CLI - Command-line interface for running behavior simulations
//!
//! Provides subcommands for validating models, writing a default
//! configuration and running a simulation with a simple open workload.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use perfsim::simulation::config::{load_model, write_json};
use perfsim::simulation::{RequestSpec, RequestStatus, Simulation, SimulationConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "perfsim")]
#[command(about = "Simulate performance-annotated component behavior models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default simulation config
    InitConfig {
        /// Target file
        #[arg(short, long, default_value = "simulation.json")]
        path: PathBuf,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check a system model for consistency
    Validate {
        /// System model (JSON)
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Simulate requests against one entry service
    Run {
        /// System model (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Simulation config (JSON), defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Entry assembly context id
        #[arg(long)]
        entry: String,

        /// Service called on the entry context
        #[arg(long)]
        service: String,

        /// Number of requests
        #[arg(short, long, default_value = "1")]
        requests: usize,

        /// Simulated seconds between request arrivals
        #[arg(long, default_value = "1.0")]
        interarrival: f64,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Run {
            config: Some(path), ..
        } => SimulationConfig::load(path)?,
        _ => SimulationConfig::default(),
    };
    let level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::InitConfig { path, seed } => {
            let mut config = SimulationConfig::default();
            if let Some(seed) = seed {
                config.seed = seed;
            }
            config.save(&path)?;
            println!("Wrote simulation config to {:?}", path);
        }

        Commands::Validate { model } => {
            let model = load_model(&model)?;
            println!(
                "Model '{}' is valid: {} components, {} assembly contexts, {} containers",
                model.name,
                model.components.len(),
                model.assembly_contexts.len(),
                model.containers.len()
            );
        }

        Commands::Run {
            model,
            entry,
            service,
            requests,
            interarrival,
            seed,
            output,
            ..
        } => {
            if !(interarrival >= 0.0 && interarrival.is_finite()) {
                bail!("Interarrival time must be a non-negative number");
            }
            let mut config = config;
            if let Some(seed) = seed {
                config.seed = seed;
            }

            let model = load_model(&model)?;
            let mut simulation =
                Simulation::new(config, model).context("Failed to set up simulation")?;
            for index in 0..requests {
                let request = RequestSpec::new(entry.as_str(), service.as_str())
                    .arriving_at(index as f64 * interarrival);
                simulation
                    .submit(request)
                    .with_context(|| format!("Failed to submit request {}", index))?;
            }

            let report = simulation.run();
            println!("Simulated time: {}", report.simulated_time);
            println!(
                "Requests: {} completed, {} failed, {} incomplete",
                report.count(RequestStatus::Completed),
                report.count(RequestStatus::Failed),
                report.count(RequestStatus::Incomplete)
            );
            if let Some(mean) = report.mean_response_time() {
                println!("Mean response time: {:.6}s", mean);
            }
            for stats in &report.resources {
                println!(
                    "  {}/{}: {} demands, busy {:.6}s, waiting {:.6}s",
                    stats.container,
                    stats.resource,
                    stats.demands_served,
                    stats.busy_time,
                    stats.waiting_time
                );
            }
            if let Some(path) = output {
                write_json(&path, &report)?;
                println!("Wrote report to {:?}", path);
            }
        }
    }

    Ok(())
}
