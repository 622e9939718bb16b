//! Collective communication between distributed ranks.
//!
//! Ranks only talk through [`Communicator`]. The in-process implementation,
//! [`LocalCommunicator`], runs every rank as a thread and passes boxed
//! values through shared slots; a network transport can stand in for it
//! without touching the strategies.
//!
//! Every collective is two rendezvous on one barrier: post, wait, read,
//! wait. A rank that fails between collectives calls
//! [`Communicator::abort`], which raises a shared flag and fills its seat at
//! the next rendezvous so nobody blocks forever. The others see the flag
//! and return [`SimError::Sync`].

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};

use kernel::{Result, SimError};

use crate::partition::PartitionTable;

/// Synchronous collectives over a fixed group of ranks.
///
/// Every rank must issue the same sequence of collectives. Errors returned
/// by a collective have already been made visible to the whole group, so
/// callers must not call [`abort`](Communicator::abort) for them.
pub trait Communicator: Send {
    /// This rank's index in `0..size`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Block until every rank arrives.
    fn barrier(&self) -> Result<()>;

    /// `root` supplies `Some(value)`, every other rank passes `None`; all
    /// ranks return a copy of the root's value.
    fn broadcast<T: Clone + Send + 'static>(&self, root: usize, value: Option<T>) -> Result<T>;

    /// `root` supplies the full array; every rank receives its own partition
    /// of it according to `table`.
    fn scatter<T: Clone + Send + 'static>(
        &self,
        root: usize,
        data: Option<&[T]>,
        table: &PartitionTable,
    ) -> Result<Vec<T>>;

    /// Every rank contributes `local` (its partition) and receives all
    /// partitions, written into `global` at their offsets.
    fn all_gather_into<T: Clone + Send + 'static>(
        &self,
        local: &[T],
        global: &mut [T],
        table: &PartitionTable,
    ) -> Result<()>;

    /// Tear the group down after a local failure. Must be called at most
    /// once, and only from between collectives.
    fn abort(&self);
}

type Slot = Option<Box<dyn Any + Send>>;

struct Exchange {
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
    aborted: AtomicBool,
}

/// One rank's endpoint of an in-process group.
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    exchange: Arc<Exchange>,
}

impl LocalCommunicator {
    /// Create `size` connected endpoints, indexed by rank.
    pub fn group(size: usize) -> Result<Vec<Self>> {
        if size == 0 {
            return Err(SimError::Config("rank count must be at least 1".to_string()));
        }
        let exchange = Arc::new(Exchange {
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
            aborted: AtomicBool::new(false),
        });
        Ok((0..size)
            .map(|rank| Self {
                rank,
                size,
                exchange: Arc::clone(&exchange),
            })
            .collect())
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        self.exchange
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise an error on this rank and make it visible to the group.
    fn fail<R>(&self, message: String) -> Result<R> {
        self.abort();
        Err(SimError::Sync(format!("rank {}: {message}", self.rank)))
    }

    fn collective<R>(
        &self,
        post: Slot,
        read: impl FnOnce(&[Slot]) -> Result<R>,
    ) -> Result<R> {
        self.slots()[self.rank] = post;

        self.exchange.barrier.wait();
        if self.exchange.aborted.load(Ordering::SeqCst) {
            return Err(SimError::Sync(format!(
                "rank {}: group aborted by another rank",
                self.rank
            )));
        }

        let result = read(&self.slots());

        self.exchange.barrier.wait();
        self.slots()[self.rank] = None;

        // every rank has left the rendezvous, so a failed read must abort
        // at the next one
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    fn check_root(&self, root: usize) -> Result<()> {
        if root >= self.size {
            return self.fail(format!("root {root} outside group of {}", self.size));
        }
        Ok(())
    }

    fn check_table(&self, table: &PartitionTable) -> Result<()> {
        if table.units() != self.size {
            return self.fail(format!(
                "partition table has {} units for {} ranks",
                table.units(),
                self.size
            ));
        }
        Ok(())
    }
}

fn downcast<'a, T: 'static>(slots: &'a [Slot], from: usize, what: &str) -> Result<&'a T> {
    slots
        .get(from)
        .and_then(|slot| slot.as_ref())
        .and_then(|boxed| boxed.downcast_ref::<T>())
        .ok_or_else(|| SimError::Sync(format!("rank {from} posted no {what}")))
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<()> {
        self.collective(None, |_| Ok(()))
    }

    fn broadcast<T: Clone + Send + 'static>(&self, root: usize, value: Option<T>) -> Result<T> {
        self.check_root(root)?;
        let post: Slot = if self.rank == root {
            match value {
                Some(v) => Some(Box::new(v)),
                None => return self.fail("broadcast root supplied no value".to_string()),
            }
        } else {
            None
        };
        self.collective(post, |slots| downcast::<T>(slots, root, "broadcast value").cloned())
    }

    fn scatter<T: Clone + Send + 'static>(
        &self,
        root: usize,
        data: Option<&[T]>,
        table: &PartitionTable,
    ) -> Result<Vec<T>> {
        self.check_root(root)?;
        self.check_table(table)?;
        let post: Slot = if self.rank == root {
            match data {
                Some(d) if d.len() == table.total() => Some(Box::new(d.to_vec())),
                Some(d) => {
                    return self.fail(format!(
                        "scatter of {} items over a table of {}",
                        d.len(),
                        table.total()
                    ))
                }
                None => return self.fail("scatter root supplied no data".to_string()),
            }
        } else {
            None
        };
        let mine = table.get(self.rank)?;
        self.collective(post, |slots| {
            let all = downcast::<Vec<T>>(slots, root, "scatter data")?;
            Ok(all[mine.range()].to_vec())
        })
    }

    fn all_gather_into<T: Clone + Send + 'static>(
        &self,
        local: &[T],
        global: &mut [T],
        table: &PartitionTable,
    ) -> Result<()> {
        self.check_table(table)?;
        let mine = table.get(self.rank)?;
        if local.len() != mine.size || global.len() != table.total() {
            return self.fail(format!(
                "all-gather of {} local / {} global items, expected {} / {}",
                local.len(),
                global.len(),
                mine.size,
                table.total()
            ));
        }
        self.collective(Some(Box::new(local.to_vec())), |slots| {
            for (rank, part) in table.iter().enumerate() {
                let chunk = downcast::<Vec<T>>(slots, rank, "partition")?;
                if chunk.len() != part.size {
                    return Err(SimError::Sync(format!(
                        "rank {rank} sent {} items for a partition of {}",
                        chunk.len(),
                        part.size
                    )));
                }
                global[part.range()].clone_from_slice(chunk);
            }
            Ok(())
        })
    }

    fn abort(&self) {
        tracing::warn!("Rank {} aborting the group", self.rank);
        self.exchange.aborted.store(true, Ordering::SeqCst);
        self.exchange.barrier.wait();
    }
}
