//! Distributed execution over a group of ranks.
//!
//! Each rank runs on its own thread and talks to the others only through a
//! [`Communicator`]. Particles are statically partitioned by contiguous
//! index range; rank 0 owns the authoritative array, rebuilds the index and
//! broadcasts it every step, and an all-gather republishes every partition
//! to every rank after integration.
//!
//! Two layouts share that data movement:
//! - **Replicated**: the broadcast is the rebuilt [`CellList`]; forces read
//!   positions from each rank's full replicated array.
//! - **Partitioned**: the broadcast is a [`PackedGrid`] holding positions
//!   as well as ids; each rank keeps its own full-domain copy and reads
//!   forces from it alone.

use std::thread;

use kernel::{
    advance, compute_force, CellList, DomainGeometry, ForceLaw, IndexedPositions, PackedGrid,
    Particle, Result, SimError,
};

use crate::comm::{Communicator, LocalCommunicator};
use crate::context::SimulationContext;
use crate::partition::PartitionTable;
use crate::strategy::{first_cause, ExecutionStrategy, RunPlan, StepObserver};

/// What rank 0 ships to the other ranks after each rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Broadcast the cell list; every rank holds the full particle array.
    Replicated,
    /// Broadcast a packed grid of positions; forces come from the grid.
    Partitioned,
}

/// Neighbor data received by a rank for one step.
#[derive(Debug, Clone)]
enum Neighborhood {
    Index(CellList),
    Packed(PackedGrid),
}

/// Run configuration shared by every rank
#[derive(Debug, Clone, Copy)]
struct RankSetup {
    geometry: DomainGeometry,
    law: ForceLaw,
    dt: f64,
    steps: u64,
    layout: Layout,
}

/// What only rank 0 holds.
struct RootState<'a, 'o> {
    initial: &'a [Particle],
    index: &'a mut CellList,
    observer: &'a mut StepObserver<'o>,
}

/// Ranks as threads in this process, connected by [`LocalCommunicator`].
#[derive(Debug, Clone, Copy)]
pub struct DistributedStrategy {
    ranks: usize,
    layout: Layout,
}

impl DistributedStrategy {
    /// Replicated layout over `ranks` ranks.
    pub fn replicated(ranks: usize) -> Self {
        Self {
            ranks,
            layout: Layout::Replicated,
        }
    }

    /// Partitioned layout over `ranks` ranks.
    pub fn partitioned(ranks: usize) -> Self {
        Self {
            ranks,
            layout: Layout::Partitioned,
        }
    }

    /// Layout in use
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl ExecutionStrategy for DistributedStrategy {
    fn name(&self) -> &'static str {
        match self.layout {
            Layout::Replicated => "distributed-replicated",
            Layout::Partitioned => "distributed-partitioned",
        }
    }

    fn run(
        &mut self,
        ctx: &mut SimulationContext,
        plan: &RunPlan,
        observer: &mut StepObserver<'_>,
    ) -> Result<()> {
        let n = ctx.particle_count();
        let table = PartitionTable::floor_split(n, self.ranks)?;
        if self.ranks > n {
            tracing::warn!("{} ranks for {} particles; some ranks own nothing", self.ranks, n);
        }
        tracing::info!(
            "Distributed run ({:?}): {} ranks, {} particles",
            self.layout,
            self.ranks,
            n
        );

        let setup = RankSetup {
            geometry: ctx.geometry,
            law: ctx.law,
            dt: ctx.dt,
            steps: plan.steps,
            layout: self.layout,
        };
        let mut index = std::mem::replace(&mut ctx.index, CellList::new(ctx.geometry));
        let mut comms = LocalCommunicator::group(self.ranks)?.into_iter();
        let root_comm = comms
            .next()
            .ok_or_else(|| SimError::Sync("communicator group is empty".to_string()))?;

        let (global, outcome) = thread::scope(|s| {
            let table = &table;
            let handles: Vec<_> = comms
                .map(|comm| s.spawn(move || run_rank(comm, setup, table, None).map(|_| ())))
                .collect();

            let root = RootState {
                initial: ctx.particles.as_slice(),
                index: &mut index,
                observer,
            };
            let (global, root_status) = match run_rank(root_comm, setup, table, Some(root)) {
                Ok(global) => (Some(global), Ok(())),
                Err(e) => (None, Err(e)),
            };

            let peers = handles.into_iter().map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(SimError::Sync("rank thread panicked".to_string())))
            });
            let outcome = first_cause(std::iter::once(root_status).chain(peers));
            (global, outcome)
        });

        ctx.index = index;
        outcome?;
        let global =
            global.ok_or_else(|| SimError::Sync("rank 0 returned no particles".to_string()))?;
        ctx.particles.replace(global);
        Ok(())
    }
}

/// Abort the group if `result` is a local failure, then hand it back.
fn abort_on_failure<C: Communicator, T>(comm: &C, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::debug!("Rank {} failed locally: {}", comm.rank(), e);
        comm.abort();
    }
    result
}

/// Forces and integration for one rank's partition.
fn step_partition(
    mine: &mut [Particle],
    offset: usize,
    global: &[Particle],
    neighborhood: &Neighborhood,
    setup: &RankSetup,
) -> Result<()> {
    for (k, p) in mine.iter_mut().enumerate() {
        let id = offset + k;
        let (cx, cy) = setup.geometry.cell_of(p.x, p.y)?;
        p.cx = cx;
        p.cy = cy;
        match neighborhood {
            Neighborhood::Index(list) => {
                compute_force(p, id, &IndexedPositions::new(list, global), &setup.law)
            }
            Neighborhood::Packed(grid) => compute_force(p, id, grid, &setup.law),
        }
    }
    for p in mine.iter_mut() {
        advance(p, setup.dt, setup.geometry.side())?;
    }
    Ok(())
}

/// Body of one rank. Returns the final global array.
fn run_rank<C: Communicator>(
    comm: C,
    setup: RankSetup,
    table: &PartitionTable,
    mut root: Option<RootState<'_, '_>>,
) -> Result<Vec<Particle>> {
    let rank = comm.rank();
    let part = abort_on_failure(&comm, table.get(rank))?;
    tracing::debug!("Rank {}: particles {:?}", rank, part.range());

    // initial distribution
    let initial = root.as_ref().map(|r| r.initial.to_vec());
    let mut global = comm.broadcast(0, initial)?;
    let mut mine = comm.scatter(0, root.as_ref().map(|r| r.initial), table)?;

    for step in 0..setup.steps {
        // phase 1: rank 0 rebuilds and ships the neighborhood
        let shipped = match root.as_mut() {
            Some(r) => {
                abort_on_failure(&comm, r.index.rebuild(&mut global))?;
                Some(match setup.layout {
                    Layout::Replicated => Neighborhood::Index(r.index.clone()),
                    Layout::Partitioned => {
                        Neighborhood::Packed(PackedGrid::pack(r.index, &global))
                    }
                })
            }
            None => None,
        };
        let neighborhood = comm.broadcast(0, shipped)?;

        // phases 2 and 3
        let stepped = step_partition(&mut mine, part.offset, &global, &neighborhood, &setup);
        abort_on_failure(&comm, stepped)?;

        // phase 4
        comm.all_gather_into(&mine, &mut global, table)?;
        if let Some(r) = root.as_mut() {
            abort_on_failure(&comm, r.observer.after_step(step, &global))?;
        }
    }

    comm.barrier()?;
    Ok(global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::ParticleStore;

    fn context(particles: Vec<Particle>) -> SimulationContext {
        let geometry = DomainGeometry::with_side(1.0, 0.1).unwrap();
        let particles = ParticleStore::from(particles);
        SimulationContext::new(geometry, ForceLaw::new(0.1, 0.01), 1e-4, particles).unwrap()
    }

    fn cluster() -> Vec<Particle> {
        (0..12)
            .map(|i| {
                let x = 0.3 + 0.03 * (i % 4) as f64;
                let y = 0.4 + 0.03 * (i / 4) as f64;
                Particle::at(x, y).with_velocity(0.1 * (i as f64).sin(), 0.1 * (i as f64).cos())
            })
            .collect()
    }

    #[test]
    fn layouts_agree() {
        let plan = RunPlan {
            steps: 20,
            save_every: 5,
        };
        let mut finals = Vec::new();
        let strategies = [
            DistributedStrategy::replicated(3),
            DistributedStrategy::partitioned(3),
        ];
        for mut strategy in strategies {
            let mut ctx = context(cluster());
            let mut observer = StepObserver::detached(ctx.side());
            strategy.run(&mut ctx, &plan, &mut observer).unwrap();
            assert!(observer.peak_acceleration() > 0.0);
            finals.push(ctx.particles().to_vec());
        }
        assert_eq!(finals[0], finals[1]);
    }

    #[test]
    fn more_ranks_than_particles() {
        let plan = RunPlan {
            steps: 3,
            save_every: 1,
        };
        let mut ctx = context(cluster()[..2].to_vec());
        let mut observer = StepObserver::detached(ctx.side());
        DistributedStrategy::partitioned(5)
            .run(&mut ctx, &plan, &mut observer)
            .unwrap();
        assert_eq!(ctx.particle_count(), 2);
    }

    #[test]
    fn layout_names() {
        assert_eq!(DistributedStrategy::replicated(2).name(), "distributed-replicated");
        assert_eq!(DistributedStrategy::partitioned(2).layout(), Layout::Partitioned);
    }
}
