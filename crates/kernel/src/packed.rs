//! Flattened, fixed-capacity copy of a cell list.
//!
//! Each cell gets a row of `capacity` slots holding a copy of the particle's
//! index and position, so the whole grid is one contiguous buffer that can
//! be shipped to another process and searched without the particle array.

use serde::{Deserialize, Serialize};

use crate::force::NeighborSource;
use crate::neighbor::CellList;
use crate::particle::Particle;

/// One packed particle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PackedSlot {
    /// Index in the global particle array
    pub id: usize,
    /// X position at pack time
    pub x: f64,
    /// Y position at pack time
    pub y: f64,
}

/// Full-domain grid of packed particle copies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackedGrid {
    resolution: usize,
    capacity: usize,
    counts: Vec<usize>,
    slots: Vec<PackedSlot>,
}

impl PackedGrid {
    /// Pack `index` using positions from `particles`.
    ///
    /// Capacity is the largest occupancy of any cell, so nothing is dropped.
    /// Slot order within a cell matches [`crate::neighbor::Cell::particles`].
    pub fn pack(index: &CellList, particles: &[Particle]) -> Self {
        let resolution = index.resolution();
        let cells = resolution * resolution;
        let capacity = index.max_occupancy();
        let mut counts = vec![0; cells];
        let mut slots = vec![PackedSlot::default(); cells * capacity];

        for &flat in index.occupied() {
            let (cx, cy) = index.coords(flat);
            let Some(cell) = index.cell(cx, cy) else {
                continue;
            };
            let row = &mut slots[flat * capacity..(flat + 1) * capacity];
            for (slot, id) in row.iter_mut().zip(cell.particles()) {
                let p = &particles[id];
                *slot = PackedSlot { id, x: p.x, y: p.y };
            }
            counts[flat] = cell.len();
        }

        Self {
            resolution,
            capacity,
            counts,
            slots,
        }
    }

    /// Slots per cell.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupied slots of cell `(cx, cy)`.
    pub fn cell_slots(&self, cx: usize, cy: usize) -> &[PackedSlot] {
        if cx >= self.resolution || cy >= self.resolution {
            return &[];
        }
        let flat = cx * self.resolution + cy;
        let start = flat * self.capacity;
        &self.slots[start..start + self.counts[flat]]
    }

    /// Total particles packed.
    pub fn len(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Return `true` if no particles were packed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NeighborSource for PackedGrid {
    fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    fn for_each_in_cell<F>(&self, cx: usize, cy: usize, mut f: F)
    where
        F: FnMut(usize, f64, f64),
    {
        for slot in self.cell_slots(cx, cy) {
            f(slot.id, slot.x, slot.y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::force::{acceleration, ForceLaw, IndexedPositions};
    use crate::geometry::DomainGeometry;

    fn cloud() -> (CellList, Vec<Particle>) {
        let geometry = DomainGeometry::with_side(1.0, 0.1).unwrap();
        let mut index = CellList::new(geometry);
        let mut ps: Vec<Particle> = (0..60)
            .map(|i| {
                let t = i as f64;
                Particle::at(0.4 + 0.003 * (t * 1.7).sin() * t, 0.4 + 0.002 * (t * 0.9).cos() * t)
            })
            .collect();
        index.rebuild(&mut ps).unwrap();
        (index, ps)
    }

    #[test]
    fn pack_keeps_every_particle() {
        let (index, ps) = cloud();
        let packed = PackedGrid::pack(&index, &ps);
        assert_eq!(packed.len(), ps.len());
        assert_eq!(packed.capacity(), index.max_occupancy());
    }

    #[test]
    fn packed_slots_follow_cell_order() {
        let (index, ps) = cloud();
        let packed = PackedGrid::pack(&index, &ps);
        for &flat in index.occupied() {
            let (cx, cy) = index.coords(flat);
            let ids: Vec<usize> = packed.cell_slots(cx, cy).iter().map(|s| s.id).collect();
            let expected: Vec<usize> = index.cell(cx, cy).unwrap().particles().collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn forces_match_indexed_source_exactly() {
        let (index, ps) = cloud();
        let packed = PackedGrid::pack(&index, &ps);
        let law = ForceLaw::new(0.1, 0.01);
        let view = IndexedPositions::new(&index, &ps);
        for (id, p) in ps.iter().enumerate() {
            assert_eq!(
                acceleration(id, p, &view, &law),
                acceleration(id, p, &packed, &law),
                "particle {id}"
            );
        }
    }

    #[test]
    fn out_of_range_cell_is_empty() {
        let (index, ps) = cloud();
        let packed = PackedGrid::pack(&index, &ps);
        assert!(packed.cell_slots(100, 0).is_empty());
    }
}
