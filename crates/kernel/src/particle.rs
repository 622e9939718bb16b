//! Particle records and the flat store that owns them.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::geometry::DomainGeometry;

/// A point particle.
///
/// `cx`/`cy` cache the cell the particle was placed in by the most recent
/// rebuild of the cell list; they are stale between integration and the
/// next rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Particle {
    /// X position
    pub x: f64,
    /// Y position
    pub y: f64,
    /// X velocity
    pub vx: f64,
    /// Y velocity
    pub vy: f64,
    /// X acceleration
    pub ax: f64,
    /// Y acceleration
    pub ay: f64,
    /// Cached cell column
    pub cx: usize,
    /// Cached cell row
    pub cy: usize,
}

impl Particle {
    /// A particle at rest at `(x, y)`.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    /// Builder-style velocity setter.
    pub fn with_velocity(mut self, vx: f64, vy: f64) -> Self {
        self.vx = vx;
        self.vy = vy;
        self
    }

    /// Magnitude of the current acceleration.
    pub fn acceleration_magnitude(&self) -> f64 {
        self.ax.hypot(self.ay)
    }
}

/// Flat, index-stable particle storage.
///
/// Allocated once at setup and mutated in place every step. Index order is
/// the particle's identity: it is what cells refer to and the order frames
/// are written in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleStore {
    particles: Vec<Particle>,
}

impl ParticleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with room for `n` particles.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            particles: Vec::with_capacity(n),
        }
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Append a particle; returns its index.
    pub fn push(&mut self, particle: Particle) -> usize {
        self.particles.push(particle);
        self.particles.len() - 1
    }

    /// All particles in index order.
    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable access to all particles in index order.
    pub fn as_mut_slice(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Replace the contents with `particles`, keeping index order.
    pub fn replace(&mut self, particles: Vec<Particle>) {
        self.particles = particles;
    }

    /// Positions in index order.
    pub fn positions(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.particles.iter().map(|p| (p.x, p.y))
    }

    /// Check every particle lies inside `geometry`.
    pub fn check_within(&self, geometry: &DomainGeometry) -> Result<()> {
        match self
            .particles
            .iter()
            .position(|p| !geometry.contains(p.x, p.y))
        {
            Some(i) => Err(SimError::Domain(format!(
                "particle {i} at ({}, {}) lies outside the domain of side {}",
                self.particles[i].x,
                self.particles[i].y,
                geometry.side()
            ))),
            None => Ok(()),
        }
    }
}

impl From<Vec<Particle>> for ParticleStore {
    fn from(particles: Vec<Particle>) -> Self {
        Self { particles }
    }
}
