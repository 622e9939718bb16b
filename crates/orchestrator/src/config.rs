//! Configuration parsing and validation for particle simulations

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use kernel::{Result, SimError};

/// Main simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of particles
    #[serde(default = "default_particle_count")]
    pub particle_count: usize,
    /// Number of time steps to run
    #[serde(default = "default_steps")]
    pub steps: u64,
    /// Persist a frame every this many steps
    #[serde(default = "default_save_every")]
    pub save_every: u64,
    /// Target number density; sets the domain side
    #[serde(default = "default_density")]
    pub density: f64,
    /// Particle mass
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Interaction cutoff radius
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    /// Time step
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Seed for initial placement; fresh entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Which execution strategy to run
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Execution strategy selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendConfig {
    /// One thread, phases in order
    Serial,
    /// Worker threads over one shared particle array
    SharedMemory {
        /// Number of worker threads
        workers: usize,
        /// How the force and integrate phases are split
        #[serde(default)]
        schedule: Schedule,
    },
    /// Ranks each hold the full array; rank 0 rebuilds and broadcasts the index
    DistributedReplicated {
        /// Number of ranks
        ranks: usize,
    },
    /// Ranks compute only their partition against a private packed grid
    DistributedPartitioned {
        /// Number of ranks
        ranks: usize,
    },
}

/// Work split for the shared-memory backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    /// Fixed contiguous ranges, one designated rebuild worker, explicit barriers
    Barrier,
    /// Chunked parallel loops on a work-stealing pool
    WorkStealing {
        /// Particles per chunk
        chunk: usize,
    },
}

// Default values
fn default_particle_count() -> usize {
    1000
}

fn default_steps() -> u64 {
    1000
}

fn default_save_every() -> u64 {
    10
}

fn default_density() -> f64 {
    kernel::geometry::DEFAULT_DENSITY
}

fn default_mass() -> f64 {
    kernel::force::DEFAULT_MASS
}

fn default_cutoff() -> f64 {
    kernel::geometry::DEFAULT_CUTOFF
}

fn default_dt() -> f64 {
    kernel::integrator::DEFAULT_DT
}

/// Chunk size of the work-stealing schedule
pub const DEFAULT_CHUNK: usize = 200;

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Serial
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Barrier
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particle_count: default_particle_count(),
            steps: default_steps(),
            save_every: default_save_every(),
            density: default_density(),
            mass: default_mass(),
            cutoff: default_cutoff(),
            dt: default_dt(),
            seed: None,
            backend: BackendConfig::default(),
        }
    }
}

impl BackendConfig {
    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Serial => "serial",
            BackendConfig::SharedMemory {
                schedule: Schedule::Barrier,
                ..
            } => "shared-memory",
            BackendConfig::SharedMemory {
                schedule: Schedule::WorkStealing { .. },
                ..
            } => "work-stealing",
            BackendConfig::DistributedReplicated { .. } => "distributed-replicated",
            BackendConfig::DistributedPartitioned { .. } => "distributed-partitioned",
        }
    }

    /// Worker or rank count (1 for serial)
    pub fn parallelism(&self) -> usize {
        match *self {
            BackendConfig::Serial => 1,
            BackendConfig::SharedMemory { workers, .. } => workers,
            BackendConfig::DistributedReplicated { ranks }
            | BackendConfig::DistributedPartitioned { ranks } => ranks,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            SimError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        let config: SimulationConfig = serde_json::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.particle_count == 0 {
            return Err(SimError::Config("particle_count must be at least 1".to_string()));
        }

        if self.save_every == 0 {
            return Err(SimError::Config("save_every must be at least 1".to_string()));
        }

        for (name, value) in [
            ("density", self.density),
            ("mass", self.mass),
            ("cutoff", self.cutoff),
            ("dt", self.dt),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::Config(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }

        match self.backend {
            BackendConfig::Serial => {}
            BackendConfig::SharedMemory { workers, schedule } => {
                if workers == 0 {
                    return Err(SimError::Config("workers must be at least 1".to_string()));
                }
                if let Schedule::WorkStealing { chunk: 0 } = schedule {
                    return Err(SimError::Config("chunk must be at least 1".to_string()));
                }
            }
            BackendConfig::DistributedReplicated { ranks }
            | BackendConfig::DistributedPartitioned { ranks } => {
                if ranks == 0 {
                    return Err(SimError::Config("ranks must be at least 1".to_string()));
                }
            }
        }

        Ok(())
    }
}
