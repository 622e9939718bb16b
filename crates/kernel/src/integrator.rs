//! Semi-implicit Euler step with reflecting walls.

use crate::error::{Result, SimError};
use crate::particle::Particle;

/// Default time step.
pub const DEFAULT_DT: f64 = 0.0005;

/// Advance one particle by `dt` inside the square `[0, side]^2`.
///
/// Velocity is kicked first and the new velocity drifts the position
/// (slightly simplified velocity Verlet). A particle that leaves the domain
/// is mirrored back and its velocity component negated, repeatedly, until
/// it lies inside again: a particle that overshoots by more than a full
/// side bounces off both walls in the same step.
///
/// Returns the number of wall reflections applied. A non-finite position
/// after the drift is a [`SimError::Domain`].
pub fn advance(particle: &mut Particle, dt: f64, side: f64) -> Result<u32> {
    particle.vx += particle.ax * dt;
    particle.vy += particle.ay * dt;
    particle.x += particle.vx * dt;
    particle.y += particle.vy * dt;

    if !(particle.x.is_finite() && particle.y.is_finite()) {
        return Err(SimError::Domain(format!(
            "non-finite position ({}, {}) after integration",
            particle.x, particle.y
        )));
    }

    let mut reflections = 0;
    while particle.x < 0.0 || particle.x > side {
        particle.x = if particle.x < 0.0 {
            -particle.x
        } else {
            2.0 * side - particle.x
        };
        particle.vx = -particle.vx;
        reflections += 1;
    }
    while particle.y < 0.0 || particle.y > side {
        particle.y = if particle.y < 0.0 {
            -particle.y
        } else {
            2.0 * side - particle.y
        };
        particle.vy = -particle.vy;
        reflections += 1;
    }
    Ok(reflections)
}
