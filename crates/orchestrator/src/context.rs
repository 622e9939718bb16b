//! Simulation state owned by whichever execution strategy runs it.

use kernel::{CellList, DomainGeometry, ForceLaw, Particle, ParticleStore, Result, SimError};

use crate::config::SimulationConfig;
use crate::domain::seeded_particles;

/// Everything a step needs: geometry, force law, time step, particles and
/// the spatial index. Strategies differ only in how they schedule phases
/// over this state.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    /// Domain geometry, fixed for the run
    pub geometry: DomainGeometry,
    /// Pair force parameters
    pub law: ForceLaw,
    /// Time step
    pub dt: f64,
    /// Particle state in index order
    pub particles: ParticleStore,
    /// Spatial index, rebuilt every step
    pub index: CellList,
}

impl SimulationContext {
    /// Assemble a context from explicit parts.
    ///
    /// Every particle must lie inside `geometry`, and the force cutoff must
    /// not exceed the cutoff the grid was sized for (otherwise the 3x3
    /// neighborhood would miss interacting pairs).
    pub fn new(
        geometry: DomainGeometry,
        law: ForceLaw,
        dt: f64,
        particles: ParticleStore,
    ) -> Result<Self> {
        if particles.is_empty() {
            return Err(SimError::Config("simulation needs at least one particle".to_string()));
        }
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::Config(format!("dt must be finite and non-negative, got {dt}")));
        }
        if law.cutoff > geometry.cutoff() {
            return Err(SimError::Config(format!(
                "force cutoff {} exceeds grid cutoff {}",
                law.cutoff,
                geometry.cutoff()
            )));
        }
        particles.check_within(&geometry)?;

        Ok(Self {
            geometry,
            law,
            dt,
            particles,
            index: CellList::new(geometry),
        })
    }

    /// Derive geometry from the configured density and place particles.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let geometry =
            DomainGeometry::configure(config.particle_count, config.density, config.cutoff)?;
        let particles = seeded_particles(config.particle_count, &geometry, config.seed);
        tracing::info!(
            "Domain setup complete: {} particles, side {:.6}, {}x{} cells of width {:.6}",
            particles.len(),
            geometry.side(),
            geometry.resolution(),
            geometry.resolution(),
            geometry.cell_width()
        );
        Self::new(
            geometry,
            ForceLaw::new(config.cutoff, config.mass),
            config.dt,
            particles,
        )
    }

    /// Number of particles.
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Domain side length.
    pub fn side(&self) -> f64 {
        self.geometry.side()
    }

    /// Particles in index order.
    pub fn particles(&self) -> &[Particle] {
        self.particles.as_slice()
    }
}
