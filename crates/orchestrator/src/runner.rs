//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner`, which owns the simulation
//! context and a strategy and walks the `Idle -> Configured -> Stepping(k)
//! -> Done` state machine. The state is shared through a [`StatusHandle`]
//! so other threads can watch a run in progress, either one driven on the
//! caller's thread with [`SimulationRunner::run`] or in the background with
//! [`SimulationRunner::spawn`].

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use kernel::{Particle, Result, SimError, Stopwatch, TrajectorySink};
use serde::Serialize;

use crate::config::SimulationConfig;
use crate::context::SimulationContext;
use crate::strategy::{for_backend, ExecutionStrategy, RunPlan, RunReport, StepObserver};

/// Runner state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    /// No context yet
    #[default]
    Idle,
    /// Context in place, ready to run
    Configured,
    /// Running; the value is the number of completed steps
    Stepping(u64),
    /// Run finished, successfully or not
    Done,
}

/// Cloneable read handle on a runner's state
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    state: Arc<Mutex<RunState>>,
}

impl StatusHandle {
    /// Current state
    pub fn get(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Owns a simulation and the strategy that steps it
pub struct SimulationRunner {
    context: Option<SimulationContext>,
    strategy: Box<dyn ExecutionStrategy>,
    plan: RunPlan,
    status: StatusHandle,
}

impl SimulationRunner {
    /// Create an idle runner
    ///
    /// # Arguments
    /// * `strategy` - How phases are scheduled
    /// * `plan` - Step count and save interval
    pub fn new(strategy: Box<dyn ExecutionStrategy>, plan: RunPlan) -> Self {
        Self {
            context: None,
            strategy,
            plan,
            status: StatusHandle::default(),
        }
    }

    /// Validate `config`, place particles and return a configured runner
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let context = SimulationContext::from_config(config)?;
        let mut runner = Self::new(
            for_backend(&config.backend),
            RunPlan {
                steps: config.steps,
                save_every: config.save_every,
            },
        );
        runner.configure(context)?;
        Ok(runner)
    }

    /// Install the context to run. Allowed from `Idle` or after a
    /// finished run.
    pub fn configure(&mut self, context: SimulationContext) -> Result<()> {
        match self.state() {
            RunState::Idle | RunState::Done | RunState::Configured => {}
            RunState::Stepping(k) => {
                return Err(SimError::Config(format!(
                    "cannot reconfigure a runner at step {k}"
                )));
            }
        }
        tracing::info!(
            "Configured {} particles on the {} backend",
            context.particle_count(),
            self.strategy.name()
        );
        self.context = Some(context);
        self.status.set(RunState::Configured);
        Ok(())
    }

    /// Run every planned step on the calling thread
    ///
    /// Frames go to `sink` when one is given. The runner ends in `Done`
    /// whether or not the run succeeds.
    pub fn run(&mut self, sink: Option<&mut dyn TrajectorySink>) -> Result<RunReport> {
        let state = self.state();
        if state != RunState::Configured {
            return Err(SimError::Config(format!(
                "runner must be configured before running (state {state:?})"
            )));
        }
        let ctx = self
            .context
            .as_mut()
            .ok_or_else(|| SimError::Config("runner has no simulation context".to_string()))?;

        tracing::info!(
            "Running {} steps on the {} backend",
            self.plan.steps,
            self.strategy.name()
        );
        self.status.set(RunState::Stepping(0));
        let clock = Stopwatch::start();

        let mut observer =
            StepObserver::new(sink, self.plan.save_every, ctx.side(), self.status.clone());
        let outcome = self
            .strategy
            .run(ctx, &self.plan, &mut observer)
            .and_then(|()| observer.finish());
        self.status.set(RunState::Done);

        if let Err(e) = outcome {
            tracing::error!("Run failed: {}", e);
            return Err(e);
        }

        let report = RunReport {
            backend: self.strategy.name().to_string(),
            particle_count: ctx.particle_count(),
            steps: self.plan.steps,
            frames: observer.frames(),
            elapsed: clock.elapsed(),
            peak_acceleration: observer.peak_acceleration(),
        };
        tracing::info!(
            "n = {}, simulation time = {:.6} seconds",
            report.particle_count,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Run on a background thread, handing the runner back on join
    pub fn spawn(mut self, mut sink: Option<Box<dyn TrajectorySink>>) -> BackgroundRun {
        let status = self.status.clone();
        let handle = thread::spawn(move || {
            let sink = sink
                .as_deref_mut()
                .map(|s| s as &mut dyn TrajectorySink);
            let report = self.run(sink);
            (self, report)
        });
        BackgroundRun { status, handle }
    }

    /// Get current runner state
    pub fn state(&self) -> RunState {
        self.status.get()
    }

    /// Handle for watching the state from another thread
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Step count and save interval
    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// The simulation context, once configured
    pub fn context(&self) -> Option<&SimulationContext> {
        self.context.as_ref()
    }

    /// Current particles in index order (empty while idle)
    pub fn particles(&self) -> &[Particle] {
        self.context
            .as_ref()
            .map(SimulationContext::particles)
            .unwrap_or_default()
    }
}

/// A run in progress on its own thread
pub struct BackgroundRun {
    status: StatusHandle,
    handle: thread::JoinHandle<(SimulationRunner, Result<RunReport>)>,
}

impl BackgroundRun {
    /// Current state of the running simulation
    pub fn state(&self) -> RunState {
        self.status.get()
    }

    /// Wait for the simulation thread to complete
    pub fn join(self) -> Result<(SimulationRunner, RunReport)> {
        let (runner, report) = self
            .handle
            .join()
            .map_err(|_| SimError::Sync("simulation thread panicked".to_string()))?;
        Ok((runner, report?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use kernel::MemoryTrajectory;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            particle_count: 64,
            steps: 25,
            save_every: 10,
            seed: Some(11),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_runner_lifecycle() {
        let mut runner = SimulationRunner::from_config(&small_config()).unwrap();
        assert_eq!(runner.state(), RunState::Configured);
        assert_eq!(runner.particles().len(), 64);

        let mut sink = MemoryTrajectory::new();
        let report = runner.run(Some(&mut sink)).unwrap();

        assert_eq!(runner.state(), RunState::Done);
        assert_eq!(report.backend, "serial");
        assert_eq!(report.steps, 25);
        assert_eq!(report.frames, 3);
        assert_eq!(sink.frames.len(), 3);
        assert_eq!(sink.frames[0].positions.len(), 64);
    }

    #[test]
    fn test_run_requires_configuration() {
        let mut runner = SimulationRunner::new(
            for_backend(&BackendConfig::Serial),
            RunPlan {
                steps: 1,
                save_every: 1,
            },
        );
        assert_eq!(runner.state(), RunState::Idle);
        assert!(runner.particles().is_empty());
        assert!(matches!(runner.run(None), Err(SimError::Config(_))));

        let mut runner = SimulationRunner::from_config(&small_config()).unwrap();
        runner.run(None).unwrap();
        // a finished run must be configured again
        assert!(matches!(runner.run(None), Err(SimError::Config(_))));
    }

    #[test]
    fn test_background_run() {
        let config = SimulationConfig {
            backend: BackendConfig::DistributedReplicated { ranks: 2 },
            ..small_config()
        };
        let runner = SimulationRunner::from_config(&config).unwrap();
        let status = runner.status_handle();

        let background = runner.spawn(Some(Box::new(MemoryTrajectory::new())));
        let (runner, report) = background.join().unwrap();

        assert_eq!(status.get(), RunState::Done);
        assert_eq!(runner.state(), RunState::Done);
        assert_eq!(report.frames, 3);
        assert_eq!(report.backend, "distributed-replicated");
    }
}
