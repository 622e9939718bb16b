//! Single-threaded reference strategy.

use kernel::force::acceleration;
use kernel::{advance, IndexedPositions, Result};

use crate::context::SimulationContext;
use crate::strategy::{ExecutionStrategy, RunPlan, StepObserver};

/// Phases in order on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialStrategy;

impl ExecutionStrategy for SerialStrategy {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn run(
        &mut self,
        ctx: &mut SimulationContext,
        plan: &RunPlan,
        observer: &mut StepObserver<'_>,
    ) -> Result<()> {
        let (law, dt, side) = (ctx.law, ctx.dt, ctx.side());
        // forces for the whole step, applied once every particle has read
        // the positions it needs
        let mut accel = vec![(0.0, 0.0); ctx.particle_count()];

        for step in 0..plan.steps {
            let particles = ctx.particles.as_mut_slice();
            ctx.index.rebuild(particles)?;

            let view = IndexedPositions::new(&ctx.index, particles);
            for (id, slot) in accel.iter_mut().enumerate() {
                *slot = acceleration(id, &particles[id], &view, &law);
            }

            for (p, &(ax, ay)) in particles.iter_mut().zip(&accel) {
                p.ax = ax;
                p.ay = ay;
                advance(p, dt, side)?;
            }

            observer.after_step(step, particles)?;
        }
        Ok(())
    }
}
