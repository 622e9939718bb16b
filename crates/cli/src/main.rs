//! Command-line front end for the cell-list particle simulation
//!
//! Flags override the values of an optional JSON configuration file, which
//! in turn overrides the built-in defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kernel::TextTrajectory;
use orchestrator::config::DEFAULT_CHUNK;
use orchestrator::{BackendConfig, Schedule, SimulationConfig};

/// Worker or rank count when a backend is named without `-p`
const DEFAULT_PARALLELISM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One thread
    Serial,
    /// Barrier-synchronized worker threads
    Threads,
    /// Chunked loops on a work-stealing pool
    WorkStealing,
    /// Ranks holding the full cell list
    Replicated,
    /// Ranks computing from a packed grid
    Partitioned,
}

#[derive(Parser, Debug)]
#[command(name = "cellsim", version, about = "2-D short-range particle simulation")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of particles
    #[arg(short = 'n')]
    particles: Option<usize>,

    /// Number of worker threads or ranks
    #[arg(short = 'p')]
    parallelism: Option<usize>,

    /// Trajectory output file
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Seed for the initial placement
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Number of steps
    #[arg(long)]
    steps: Option<u64>,

    /// Save a frame every this many steps
    #[arg(long)]
    save_every: Option<u64>,

    /// Execution backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Particles per chunk for the work-stealing backend
    #[arg(long)]
    chunk: Option<usize>,
}

impl Args {
    /// Merge flags over the file (or default) configuration.
    fn resolve(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SimulationConfig::default(),
        };

        if let Some(n) = self.particles {
            config.particle_count = n;
        }
        if let Some(steps) = self.steps {
            config.steps = steps;
        }
        if let Some(save_every) = self.save_every {
            config.save_every = save_every;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.backend = self.backend_config(&config.backend);

        config.validate()?;
        Ok(config)
    }

    fn backend_config(&self, current: &BackendConfig) -> BackendConfig {
        let count = self
            .parallelism
            .unwrap_or_else(|| match current {
                BackendConfig::Serial => DEFAULT_PARALLELISM,
                other => other.parallelism(),
            });
        let chunk = self.chunk.unwrap_or(match current {
            BackendConfig::SharedMemory {
                schedule: Schedule::WorkStealing { chunk },
                ..
            } => *chunk,
            _ => DEFAULT_CHUNK,
        });

        match self.backend {
            Some(Backend::Serial) => BackendConfig::Serial,
            Some(Backend::Threads) => BackendConfig::SharedMemory {
                workers: count,
                schedule: Schedule::Barrier,
            },
            Some(Backend::WorkStealing) => BackendConfig::SharedMemory {
                workers: count,
                schedule: Schedule::WorkStealing { chunk },
            },
            Some(Backend::Replicated) => BackendConfig::DistributedReplicated { ranks: count },
            Some(Backend::Partitioned) => BackendConfig::DistributedPartitioned { ranks: count },
            // no backend flag: keep the configured one, resized by -p/--chunk
            None => match *current {
                BackendConfig::Serial => BackendConfig::Serial,
                BackendConfig::SharedMemory {
                    schedule: Schedule::Barrier,
                    ..
                } => BackendConfig::SharedMemory {
                    workers: count,
                    schedule: Schedule::Barrier,
                },
                BackendConfig::SharedMemory { .. } => BackendConfig::SharedMemory {
                    workers: count,
                    schedule: Schedule::WorkStealing { chunk },
                },
                BackendConfig::DistributedReplicated { .. } => {
                    BackendConfig::DistributedReplicated { ranks: count }
                }
                BackendConfig::DistributedPartitioned { .. } => {
                    BackendConfig::DistributedPartitioned { ranks: count }
                }
            },
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cellsim=info,orchestrator=info,kernel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.resolve()?;
    tracing::info!(
        "Starting {} run: {} particles, {} steps",
        config.backend.name(),
        config.particle_count,
        config.steps
    );

    let mut runner = orchestrator::create_simulation(&config)?;
    let report = match &args.output {
        Some(path) => {
            let mut sink = TextTrajectory::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            runner.run(Some(&mut sink))?
        }
        None => runner.run(None)?,
    };

    println!(
        "n = {}, backend = {} x{}, simulation time = {} seconds",
        report.particle_count,
        report.backend,
        config.backend.parallelism(),
        report.elapsed.as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> SimulationConfig {
        Args::try_parse_from(std::iter::once("cellsim").chain(argv.iter().copied()))
            .unwrap()
            .resolve()
            .unwrap()
    }

    #[test]
    fn defaults_are_serial() {
        let config = parse(&[]);
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn flags_select_backend() {
        let config = parse(&["-n", "500", "-p", "4", "--backend", "threads", "-s", "3"]);
        assert_eq!(config.particle_count, 500);
        assert_eq!(config.seed, Some(3));
        assert_eq!(
            config.backend,
            BackendConfig::SharedMemory {
                workers: 4,
                schedule: Schedule::Barrier
            }
        );

        let config = parse(&["--backend", "work-stealing", "--chunk", "50"]);
        assert_eq!(
            config.backend,
            BackendConfig::SharedMemory {
                workers: DEFAULT_PARALLELISM,
                schedule: Schedule::WorkStealing { chunk: 50 }
            }
        );

        let config = parse(&["--backend", "partitioned", "-p", "3"]);
        assert_eq!(config.backend, BackendConfig::DistributedPartitioned { ranks: 3 });
    }

    #[test]
    fn zero_workers_rejected() {
        let args = Args::try_parse_from(["cellsim", "-p", "0", "--backend", "replicated"]).unwrap();
        assert!(args.resolve().is_err());
    }
}
