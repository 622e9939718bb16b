//! Orchestration Layer
//!
//! This crate drives the cell-list particle kernel, including:
//! - Configuration loading and validation
//! - Initial particle placement
//! - The `SimulationContext` every strategy runs over
//! - Serial, shared-memory and distributed execution strategies
//! - An in-process communicator for the distributed strategies
//! - A simulation runner with lifecycle management

#![warn(missing_docs)]

pub mod comm;
pub mod config;
pub mod context;
pub mod distributed;
pub mod domain;
pub mod partition;
pub mod runner;
pub mod serial;
pub mod shared;
pub mod strategy;

pub use config::{BackendConfig, Schedule, SimulationConfig};
pub use context::SimulationContext;
pub use runner::{RunState, SimulationRunner, StatusHandle};
pub use strategy::{ExecutionStrategy, RunPlan, RunReport};

use std::path::Path;

use kernel::Result;

/// Create a configured simulation from an in-memory configuration
///
/// This performs the full setup pipeline:
/// 1. Validate the configuration
/// 2. Derive the domain geometry from particle count and density
/// 3. Place particles on a shuffled lattice
/// 4. Select the execution strategy for the configured backend
/// 5. Wrap everything in a `SimulationRunner` in the `Configured` state
///
/// # Example
/// ```no_run
/// use orchestrator::{create_simulation, SimulationConfig};
///
/// let mut runner = create_simulation(&SimulationConfig::default())?;
/// let report = runner.run(None)?;
/// println!("{} steps in {:?}", report.steps, report.elapsed);
/// # Ok::<(), kernel::SimError>(())
/// ```
pub fn create_simulation(config: &SimulationConfig) -> Result<SimulationRunner> {
    tracing::info!(
        "Creating simulation: {} particles, backend {} x{}",
        config.particle_count,
        config.backend.name(),
        config.backend.parallelism()
    );
    let runner = SimulationRunner::from_config(config)?;
    tracing::info!("Simulation ready to start");
    Ok(runner)
}

/// Create a configured simulation from a JSON configuration file
pub fn create_simulation_from_file(config_path: impl AsRef<Path>) -> Result<SimulationRunner> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating simulation from config: {}", config_path.display());
    let config = SimulationConfig::load(config_path)?;
    create_simulation(&config)
}
