//! Execution strategies and what they report back.
//!
//! Every strategy runs the same four phases per step (rebuild, force,
//! integrate, publish) over a [`SimulationContext`]; they differ only in
//! how phase boundaries are crossed. After each publish, the unit holding
//! the authoritative array hands it to the [`StepObserver`].

use std::time::Duration;

use kernel::{Frame, Particle, Result, SimError, TrajectorySink};
use serde::Serialize;

use crate::config::{BackendConfig, Schedule};
use crate::context::SimulationContext;
use crate::distributed::DistributedStrategy;
use crate::runner::{RunState, StatusHandle};
use crate::serial::SerialStrategy;
use crate::shared::{BarrierStrategy, WorkStealingStrategy};

/// How long to run and how often to save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    /// Number of steps
    pub steps: u64,
    /// A frame is saved after step `k` when `k % save_every == 0`
    pub save_every: u64,
}

/// One way of scheduling the per-step phases.
pub trait ExecutionStrategy: Send {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Run `plan.steps` steps, leaving the final state in `ctx`.
    fn run(
        &mut self,
        ctx: &mut SimulationContext,
        plan: &RunPlan,
        observer: &mut StepObserver<'_>,
    ) -> Result<()>;
}

/// Build the strategy named by `backend`.
pub fn for_backend(backend: &BackendConfig) -> Box<dyn ExecutionStrategy> {
    match *backend {
        BackendConfig::Serial => Box::new(SerialStrategy),
        BackendConfig::SharedMemory {
            workers,
            schedule: Schedule::Barrier,
        } => Box::new(BarrierStrategy::new(workers)),
        BackendConfig::SharedMemory {
            workers,
            schedule: Schedule::WorkStealing { chunk },
        } => Box::new(WorkStealingStrategy::new(workers, chunk)),
        BackendConfig::DistributedReplicated { ranks } => {
            Box::new(DistributedStrategy::replicated(ranks))
        }
        BackendConfig::DistributedPartitioned { ranks } => {
            Box::new(DistributedStrategy::partitioned(ranks))
        }
    }
}

/// Per-step bookkeeping run by the designated unit after phase 4.
///
/// Tracks the step counter in the shared [`RunState`], the peak
/// acceleration, and forwards frames to the trajectory sink.
pub struct StepObserver<'s> {
    sink: Option<&'s mut dyn TrajectorySink>,
    save_every: u64,
    side: f64,
    frames: u64,
    peak_acceleration: f64,
    status: StatusHandle,
}

impl<'s> StepObserver<'s> {
    /// Observer saving every `save_every` steps into `sink`, if any.
    pub fn new(
        sink: Option<&'s mut dyn TrajectorySink>,
        save_every: u64,
        side: f64,
        status: StatusHandle,
    ) -> Self {
        Self {
            sink,
            save_every: save_every.max(1),
            side,
            frames: 0,
            peak_acceleration: 0.0,
            status,
        }
    }

    /// Observer with no sink that only tracks statistics.
    pub fn detached(side: f64) -> StepObserver<'static> {
        StepObserver::new(None, 1, side, StatusHandle::default())
    }

    /// Record that zero-based `step` finished with `particles` as the
    /// published state.
    pub fn after_step(&mut self, step: u64, particles: &[Particle]) -> Result<()> {
        for p in particles {
            let a = p.acceleration_magnitude();
            if a > self.peak_acceleration {
                self.peak_acceleration = a;
            }
        }
        self.status.set(RunState::Stepping(step + 1));

        if (step + 1) % 100 == 0 {
            tracing::debug!("Step {} complete", step + 1);
        }

        if step % self.save_every == 0 {
            if let Some(sink) = self.sink.as_deref_mut() {
                sink.record(&Frame {
                    step,
                    side: self.side,
                    particles,
                })?;
                self.frames += 1;
            }
        }
        Ok(())
    }

    /// Flush the sink at the end of a run.
    pub fn finish(&mut self) -> Result<()> {
        match self.sink.as_deref_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }

    /// Frames handed to the sink so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Largest |a| seen on any particle so far
    pub fn peak_acceleration(&self) -> f64 {
        self.peak_acceleration
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Strategy name
    pub backend: String,
    /// Number of particles
    pub particle_count: usize,
    /// Steps executed
    pub steps: u64,
    /// Frames written to the trajectory sink
    pub frames: u64,
    /// Wall-clock time of the step loop
    pub elapsed: Duration,
    /// Largest |a| on any particle at any step
    pub peak_acceleration: f64,
}

/// Pick the error to surface when several units failed. A unit that failed
/// on its own outranks units that only saw it fail.
pub(crate) fn first_cause(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    let mut sync: Option<SimError> = None;
    for result in results {
        match result {
            Ok(()) => {}
            Err(e) if e.is_sync() => {
                sync.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    sync.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::MemoryTrajectory;

    #[test]
    fn observer_saves_on_interval() {
        let mut sink = MemoryTrajectory::new();
        let status = StatusHandle::default();
        let particles = [Particle::at(0.1, 0.2), Particle::at(0.3, 0.4)];
        {
            let mut observer = StepObserver::new(Some(&mut sink), 10, 1.0, status.clone());
            for step in 0..25 {
                observer.after_step(step, &particles).unwrap();
            }
            assert_eq!(observer.frames(), 3);
            observer.finish().unwrap();
        }
        let steps: Vec<u64> = sink.frames.iter().map(|f| f.step).collect();
        assert_eq!(steps, vec![0, 10, 20]);
        assert_eq!(sink.frames[1].positions, vec![(0.1, 0.2), (0.3, 0.4)]);
        assert_eq!(status.get(), RunState::Stepping(25));
    }

    #[test]
    fn observer_tracks_peak_acceleration() {
        let mut observer = StepObserver::detached(1.0);
        let mut p = Particle::at(0.5, 0.5);
        p.ax = 3.0;
        p.ay = 4.0;
        observer.after_step(0, &[p]).unwrap();
        p.ax = 0.0;
        p.ay = 1.0;
        observer.after_step(1, &[p]).unwrap();
        assert_eq!(observer.peak_acceleration(), 5.0);
        assert_eq!(observer.frames(), 0);
    }

    #[test]
    fn first_cause_prefers_local_failure() {
        let picked = first_cause([
            Err(SimError::Sync("peer".to_string())),
            Ok(()),
            Err(SimError::Domain("nan".to_string())),
        ]);
        assert!(matches!(picked, Err(SimError::Domain(_))));

        let picked = first_cause([Ok(()), Err(SimError::Sync("peer".to_string()))]);
        assert!(matches!(picked, Err(SimError::Sync(_))));

        assert!(first_cause([Ok(()), Ok(())]).is_ok());
    }

    #[test]
    fn backend_names() {
        let cases = [
            (BackendConfig::Serial, "serial"),
            (
                BackendConfig::SharedMemory {
                    workers: 2,
                    schedule: Schedule::Barrier,
                },
                "shared-memory",
            ),
            (
                BackendConfig::SharedMemory {
                    workers: 2,
                    schedule: Schedule::WorkStealing { chunk: 200 },
                },
                "work-stealing",
            ),
            (
                BackendConfig::DistributedReplicated { ranks: 2 },
                "distributed-replicated",
            ),
            (
                BackendConfig::DistributedPartitioned { ranks: 2 },
                "distributed-partitioned",
            ),
        ];
        for (backend, name) in cases {
            assert_eq!(for_backend(&backend).name(), name);
            assert_eq!(backend.name(), name);
        }
    }
}
