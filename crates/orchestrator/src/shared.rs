//! Shared-memory strategies: explicit barrier workers and a work-stealing pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, PoisonError, RwLock};
use std::thread;

use rayon::prelude::*;

use kernel::force::acceleration;
use kernel::{
    advance, compute_force, CellList, ForceLaw, IndexedPositions, Particle, Result, SimError,
};

use crate::context::SimulationContext;
use crate::partition::PartitionTable;
use crate::strategy::{first_cause, ExecutionStrategy, RunPlan, StepObserver};

// ===========================================================================
// Barrier schedule
// ===========================================================================

/// Barrier that also carries failures across a phase boundary.
///
/// A worker that failed arrives with its error; every worker at the same
/// boundary then returns instead of entering the next phase. The second
/// rendezvous keeps a fast worker from reaching the next boundary before a
/// slow one has read the flag.
struct PhaseGate {
    barrier: Barrier,
    failed: AtomicBool,
}

impl PhaseGate {
    fn new(workers: usize) -> Self {
        Self {
            barrier: Barrier::new(workers),
            failed: AtomicBool::new(false),
        }
    }

    fn wait(&self, failure: Option<SimError>) -> Result<()> {
        if failure.is_some() {
            self.failed.store(true, Ordering::SeqCst);
        }
        self.barrier.wait();
        if let Some(e) = failure {
            return Err(e);
        }
        if self.failed.load(Ordering::SeqCst) {
            return Err(SimError::Sync("another worker failed".to_string()));
        }
        self.barrier.wait();
        Ok(())
    }
}

/// State every worker reads. The snapshot is the published particle array
/// of the previous step; the index is rebuilt from it by worker 0.
struct SharedStep {
    snapshot: RwLock<Vec<Particle>>,
    index: RwLock<CellList>,
    gate: PhaseGate,
    law: ForceLaw,
    dt: f64,
    side: f64,
    steps: u64,
}

/// Fixed workers over contiguous `ceil(n / workers)` ranges. Worker 0
/// rebuilds the index and observes; barriers separate every phase.
#[derive(Debug, Clone, Copy)]
pub struct BarrierStrategy {
    workers: usize,
}

impl BarrierStrategy {
    /// Strategy with `workers` threads, the calling thread included.
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }
}

/// Split `particles` into the disjoint ranges of `table`.
fn split_by_table<'a>(
    mut rest: &'a mut [Particle],
    table: &PartitionTable,
) -> Vec<&'a mut [Particle]> {
    let mut parts = Vec::with_capacity(table.units());
    for part in table.iter() {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(part.size);
        parts.push(head);
        rest = tail;
    }
    parts
}

impl ExecutionStrategy for BarrierStrategy {
    fn name(&self) -> &'static str {
        "shared-memory"
    }

    fn run(
        &mut self,
        ctx: &mut SimulationContext,
        plan: &RunPlan,
        observer: &mut StepObserver<'_>,
    ) -> Result<()> {
        let n = ctx.particle_count();
        let table = PartitionTable::ceil_split(n, self.workers)?;
        if self.workers > n {
            tracing::warn!(
                "{} workers for {} particles; {} workers will idle",
                self.workers,
                n,
                self.workers - n
            );
        }
        for (w, part) in table.iter().enumerate() {
            tracing::debug!("Worker {}: particles {:?}", w, part.range());
        }

        let shared = SharedStep {
            snapshot: RwLock::new(ctx.particles.as_slice().to_vec()),
            index: RwLock::new(std::mem::replace(&mut ctx.index, CellList::new(ctx.geometry))),
            gate: PhaseGate::new(self.workers),
            law: ctx.law,
            dt: ctx.dt,
            side: ctx.side(),
            steps: plan.steps,
        };

        let mut units = split_by_table(ctx.particles.as_mut_slice(), &table)
            .into_iter()
            .zip(table.iter().map(|part| part.offset));
        let (first, _) = units
            .next()
            .ok_or_else(|| SimError::Sync("partition table has no workers".to_string()))?;

        let outcome = thread::scope(|s| {
            let shared = &shared;
            let handles: Vec<_> = units
                .enumerate()
                .map(|(k, (local, offset))| {
                    s.spawn(move || worker(k + 1, offset, local, shared, None))
                })
                .collect();

            let mut results = vec![worker(0, 0, first, shared, Some(observer))];
            for handle in handles {
                results.push(handle.join().unwrap_or_else(|_| {
                    Err(SimError::Sync("worker thread panicked".to_string()))
                }));
            }
            first_cause(results)
        });

        ctx.index = shared.index.into_inner().unwrap_or_else(PoisonError::into_inner);
        outcome
    }
}

fn worker(
    unit: usize,
    offset: usize,
    local: &mut [Particle],
    shared: &SharedStep,
    mut observer: Option<&mut StepObserver<'_>>,
) -> Result<()> {
    // observer failure from the previous step, reported at the next boundary
    let mut pending: Option<SimError> = None;

    for step in 0..shared.steps {
        // phase 1
        let rebuilt = match (unit, pending.take()) {
            (_, Some(e)) => Err(e),
            (0, None) => {
                let mut index = shared.index.write().unwrap_or_else(PoisonError::into_inner);
                let mut snapshot =
                    shared.snapshot.write().unwrap_or_else(PoisonError::into_inner);
                index.rebuild(&mut snapshot)
            }
            _ => Ok(()),
        };
        shared.gate.wait(rebuilt.err())?;

        // phase 2
        {
            let index = shared.index.read().unwrap_or_else(PoisonError::into_inner);
            let snapshot = shared.snapshot.read().unwrap_or_else(PoisonError::into_inner);
            let view = IndexedPositions::new(&index, &snapshot);
            for (k, p) in local.iter_mut().enumerate() {
                let id = offset + k;
                p.cx = snapshot[id].cx;
                p.cy = snapshot[id].cy;
                compute_force(p, id, &view, &shared.law);
            }
        }
        shared.gate.wait(None)?;

        // phase 3, then publish
        let advanced = local
            .iter_mut()
            .try_for_each(|p| advance(p, shared.dt, shared.side).map(|_| ()));
        if advanced.is_ok() {
            let mut snapshot = shared.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            snapshot[offset..offset + local.len()].copy_from_slice(local);
        }
        shared.gate.wait(advanced.err())?;

        if let Some(observer) = observer.as_deref_mut() {
            let snapshot = shared.snapshot.read().unwrap_or_else(PoisonError::into_inner);
            pending = observer.after_step(step, &snapshot).err();
        }
    }

    shared.gate.wait(pending)
}

// ===========================================================================
// Work-stealing schedule
// ===========================================================================

/// Phases 2 and 3 as chunked parallel loops on a dedicated rayon pool.
/// The rebuild stays on the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct WorkStealingStrategy {
    workers: usize,
    chunk: usize,
}

impl WorkStealingStrategy {
    /// Pool of `workers` threads handing out `chunk` particles at a time.
    pub fn new(workers: usize, chunk: usize) -> Self {
        Self { workers, chunk }
    }
}

impl ExecutionStrategy for WorkStealingStrategy {
    fn name(&self) -> &'static str {
        "work-stealing"
    }

    fn run(
        &mut self,
        ctx: &mut SimulationContext,
        plan: &RunPlan,
        observer: &mut StepObserver<'_>,
    ) -> Result<()> {
        if self.chunk == 0 {
            return Err(SimError::Config("chunk must be at least 1".to_string()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| SimError::Config(format!("failed to build worker pool: {e}")))?;
        tracing::debug!(
            "Work-stealing pool: {} threads, chunks of {}",
            pool.current_num_threads(),
            self.chunk
        );

        let (law, dt, side, chunk) = (ctx.law, ctx.dt, ctx.side(), self.chunk);
        let mut accel = vec![(0.0, 0.0); ctx.particle_count()];

        for step in 0..plan.steps {
            let particles = ctx.particles.as_mut_slice();
            ctx.index.rebuild(particles)?;
            let index = &ctx.index;

            pool.install(|| {
                let view = IndexedPositions::new(index, particles);
                accel
                    .par_chunks_mut(chunk)
                    .enumerate()
                    .for_each(|(c, out)| {
                        for (k, slot) in out.iter_mut().enumerate() {
                            let id = c * chunk + k;
                            *slot = acceleration(id, &particles[id], &view, &law);
                        }
                    });

                particles
                    .par_chunks_mut(chunk)
                    .zip(accel.par_chunks(chunk))
                    .try_for_each(|(ps, acc)| -> Result<()> {
                        for (p, &(ax, ay)) in ps.iter_mut().zip(acc) {
                            p.ax = ax;
                            p.ay = ay;
                            advance(p, dt, side)?;
                        }
                        Ok(())
                    })
            })?;

            observer.after_step(step, particles)?;
        }
        Ok(())
    }
}
