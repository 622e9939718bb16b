//! Uniform-grid cell list for cutoff-bounded neighbor search.
//!
//! Cells hold particle indices into the caller's particle slice, never the
//! particles themselves. Cells are cleared and refilled every step rather
//! than reallocated, and only cells touched by the previous rebuild are
//! cleared.

use crate::error::Result;
use crate::geometry::DomainGeometry;
use crate::particle::Particle;

/// One grid cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    /// Insertion order; iteration runs newest first.
    particles: Vec<usize>,
    near_boundary: bool,
}

impl Cell {
    /// Particle indices in this cell, most recently inserted first.
    pub fn particles(&self) -> impl Iterator<Item = usize> + '_ {
        self.particles.iter().rev().copied()
    }

    /// Number of particles in this cell.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Return `true` if the cell holds no particles.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Return `true` if at least one particle was binned here this step.
    pub fn is_occupied(&self) -> bool {
        !self.particles.is_empty()
    }

    /// Hint: some particle in this cell lies within cutoff of a cell edge.
    pub fn near_boundary(&self) -> bool {
        self.near_boundary
    }

    fn clear(&mut self) {
        self.particles.clear();
        self.near_boundary = false;
    }
}

/// Iterate the coordinates of the 3x3 block centred on `(cx, cy)`, clipped
/// to `[0, resolution)` on both axes. The domain is not periodic.
///
/// Columns are the outer loop, rows the inner one.
pub fn clipped_block(
    cx: usize,
    cy: usize,
    resolution: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let xs = cx.saturating_sub(1)..(cx + 2).min(resolution);
    let ys = cy.saturating_sub(1)..(cy + 2).min(resolution);
    xs.flat_map(move |x| ys.clone().map(move |y| (x, y)))
}

/// Spatial index: a `resolution x resolution` grid of cells plus the list of
/// cells that became occupied during the last rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct CellList {
    geometry: DomainGeometry,
    /// Column-major: cell `(cx, cy)` lives at `cx * resolution + cy`.
    cells: Vec<Cell>,
    /// Flat indices of cells occupied since the last clear.
    dirty: Vec<usize>,
}

impl CellList {
    /// Allocate an empty grid for `geometry`.
    pub fn new(geometry: DomainGeometry) -> Self {
        Self {
            geometry,
            cells: vec![Cell::default(); geometry.cell_count()],
            dirty: Vec::new(),
        }
    }

    /// Geometry the grid was sized for.
    pub fn geometry(&self) -> &DomainGeometry {
        &self.geometry
    }

    /// Number of cells along each axis.
    pub fn resolution(&self) -> usize {
        self.geometry.resolution()
    }

    #[inline]
    fn flat(&self, cx: usize, cy: usize) -> usize {
        cx * self.geometry.resolution() + cy
    }

    /// Cell at `(cx, cy)`, or `None` outside the grid.
    pub fn cell(&self, cx: usize, cy: usize) -> Option<&Cell> {
        let res = self.geometry.resolution();
        if cx < res && cy < res {
            Some(&self.cells[self.flat(cx, cy)])
        } else {
            None
        }
    }

    /// Empty every cell occupied since the last clear.
    pub fn clear(&mut self) {
        for idx in self.dirty.drain(..) {
            self.cells[idx].clear();
        }
    }

    /// Bin particle `id`, updating its cached cell coordinates and the
    /// cell's occupancy and near-boundary flags.
    pub fn insert(&mut self, id: usize, particle: &mut Particle) -> Result<()> {
        // cell_of rejects positions outside the domain and keeps indices in range
        let (cx, cy) = self.geometry.cell_of(particle.x, particle.y)?;
        particle.cx = cx;
        particle.cy = cy;

        let near = self.geometry.near_cell_edge(particle.x, particle.y, cx, cy);
        let idx = self.flat(cx, cy);
        let cell = &mut self.cells[idx];
        if cell.particles.is_empty() {
            self.dirty.push(idx);
        }
        cell.particles.push(id);
        cell.near_boundary |= near;
        Ok(())
    }

    /// Rebuild the grid from current positions.
    ///
    /// Particle indices in the grid are positions in `particles`.
    pub fn rebuild(&mut self, particles: &mut [Particle]) -> Result<()> {
        self.clear();
        for (id, particle) in particles.iter_mut().enumerate() {
            self.insert(id, particle)?;
        }
        Ok(())
    }

    /// Cells of the clipped 3x3 neighborhood of `(cx, cy)`, lazily.
    pub fn neighbors_of(&self, cx: usize, cy: usize) -> impl Iterator<Item = &Cell> + '_ {
        clipped_block(cx, cy, self.geometry.resolution())
            .map(move |(x, y)| &self.cells[self.flat(x, y)])
    }

    /// Flat indices of occupied cells, in the order they became occupied.
    pub fn occupied(&self) -> &[usize] {
        &self.dirty
    }

    /// Column and row of a flat cell index.
    pub fn coords(&self, flat: usize) -> (usize, usize) {
        let res = self.geometry.resolution();
        (flat / res, flat % res)
    }

    /// Largest number of particles in any single cell.
    pub fn max_occupancy(&self) -> usize {
        self.dirty
            .iter()
            .map(|&idx| self.cells[idx].len())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    fn grid(side: f64, cutoff: f64) -> CellList {
        CellList::new(DomainGeometry::with_side(side, cutoff).unwrap())
    }

    fn particles(points: &[(f64, f64)]) -> Vec<Particle> {
        points.iter().map(|&(x, y)| Particle::at(x, y)).collect()
    }

    fn block_members(list: &CellList, cx: usize, cy: usize) -> Vec<usize> {
        let mut ids: Vec<usize> = list
            .neighbors_of(cx, cy)
            .flat_map(|cell| cell.particles())
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn empty_grid() {
        let list = grid(1.0, 0.1);
        assert_eq!(list.resolution(), 10);
        assert!(list.occupied().is_empty());
        assert_eq!(list.max_occupancy(), 0);
    }

    #[test]
    fn rebuild_caches_cell_coordinates() {
        let mut list = grid(1.0, 0.1);
        let mut ps = particles(&[(0.05, 0.05), (0.55, 0.31), (0.999, 0.0), (1.0, 1.0)]);
        list.rebuild(&mut ps).unwrap();

        for p in &ps {
            let w = list.geometry().cell_width();
            let expect_x = ((p.x / w).floor() as usize).min(list.resolution() - 1);
            let expect_y = ((p.y / w).floor() as usize).min(list.resolution() - 1);
            assert_eq!((p.cx, p.cy), (expect_x, expect_y));
        }
        assert_eq!((ps[1].cx, ps[1].cy), (5, 3));
        assert_eq!((ps[3].cx, ps[3].cy), (9, 9));
    }

    #[test]
    fn single_particle_no_neighbors() {
        let mut list = grid(1.0, 0.2);
        let mut ps = particles(&[(0.5, 0.5)]);
        list.rebuild(&mut ps).unwrap();
        assert_eq!(block_members(&list, ps[0].cx, ps[0].cy), vec![0]);
    }

    #[test]
    fn particles_across_cell_boundary() {
        // Two particles in adjacent cells
        let mut list = grid(1.0, 0.2);
        let mut ps = particles(&[(0.19, 0.5), (0.21, 0.5)]);
        list.rebuild(&mut ps).unwrap();
        assert_ne!(ps[0].cx, ps[1].cx);
        assert_eq!(block_members(&list, ps[0].cx, ps[0].cy), vec![0, 1]);
    }

    #[test]
    fn two_far_particles() {
        let mut list = grid(1.0, 0.2);
        let mut ps = particles(&[(0.1, 0.1), (0.9, 0.9)]);
        list.rebuild(&mut ps).unwrap();
        assert_eq!(block_members(&list, ps[0].cx, ps[0].cy), vec![0]);
        assert_eq!(block_members(&list, ps[1].cx, ps[1].cy), vec![1]);
    }

    #[test]
    fn many_particles_in_cluster() {
        let mut list = grid(1.0, 0.2);
        let n = 10;
        let mut ps: Vec<Particle> = (0..n)
            .map(|i| Particle::at(0.5 + i as f64 * 0.01, 0.5))
            .collect();
        list.rebuild(&mut ps).unwrap();
        assert_eq!(block_members(&list, ps[0].cx, ps[0].cy).len(), n);
        assert_eq!(list.max_occupancy(), n);
    }

    #[test]
    fn cell_iterates_newest_first() {
        let mut list = grid(1.0, 0.5);
        let mut ps = particles(&[(0.1, 0.1), (0.2, 0.2), (0.3, 0.3)]);
        list.rebuild(&mut ps).unwrap();
        let ids: Vec<usize> = list.cell(0, 0).unwrap().particles().collect();
        assert_eq!(ids, vec![2, 1, 0]);
    }

    #[test]
    fn neighborhood_is_clipped_at_edges() {
        let list = grid(1.0, 0.1);
        assert_eq!(list.neighbors_of(0, 0).count(), 4);
        assert_eq!(list.neighbors_of(9, 9).count(), 4);
        assert_eq!(list.neighbors_of(0, 5).count(), 6);
        assert_eq!(list.neighbors_of(5, 5).count(), 9);

        let one = grid(0.015, 0.01);
        assert_eq!(one.resolution(), 1);
        assert_eq!(one.neighbors_of(0, 0).count(), 1);
    }

    #[test]
    fn clipped_block_order_is_column_major() {
        let coords: Vec<_> = clipped_block(1, 1, 3).collect();
        assert_eq!(
            coords,
            vec![
                (0, 0), (0, 1), (0, 2),
                (1, 0), (1, 1), (1, 2),
                (2, 0), (2, 1), (2, 2),
            ]
        );
    }

    #[test]
    fn rebuild_clears_only_previously_occupied_cells() {
        let mut list = grid(1.0, 0.1);
        let mut ps = particles(&[(0.05, 0.05), (0.95, 0.95)]);
        list.rebuild(&mut ps).unwrap();
        assert_eq!(list.occupied().len(), 2);

        ps[0].x = 0.55;
        ps[0].y = 0.55;
        ps[1].x = 0.56;
        ps[1].y = 0.56;
        list.rebuild(&mut ps).unwrap();

        assert_eq!(list.occupied().len(), 1);
        assert!(list.cell(0, 0).unwrap().is_empty());
        assert!(list.cell(9, 9).unwrap().is_empty());
        assert!(!list.cell(9, 9).unwrap().near_boundary());
        assert_eq!(list.cell(5, 5).unwrap().len(), 2);
        assert!(list.cell(5, 5).unwrap().is_occupied());
    }

    #[test]
    fn near_boundary_flag_set_on_insert() {
        let mut list = grid(1.0, 0.1);
        let mut ps = particles(&[(0.501, 0.55)]);
        list.rebuild(&mut ps).unwrap();
        assert!(list.cell(5, 5).unwrap().near_boundary());
        assert!(!list.cell(4, 5).unwrap().near_boundary());
    }

    #[test]
    fn far_wall_particle_lands_in_last_cell() {
        let mut list = grid(1.0, 0.1);
        let mut ps = particles(&[(1.0, 1.0), (0.0, 1.0)]);
        list.rebuild(&mut ps).unwrap();
        assert_eq!((ps[0].cx, ps[0].cy), (9, 9));
        assert_eq!((ps[1].cx, ps[1].cy), (0, 9));
        assert_eq!(list.cell(9, 9).unwrap().len(), 1);
    }

    #[test]
    fn out_of_domain_particle_is_domain_error() {
        let mut list = grid(1.0, 0.1);
        let mut ps = particles(&[(0.5, 0.5), (1.2, 0.5)]);
        let err = list.rebuild(&mut ps).unwrap_err();
        assert!(matches!(err, SimError::Domain(_)));
    }

    #[test]
    fn coords_round_trip_flat_index() {
        let mut list = grid(1.0, 0.1);
        let mut ps = particles(&[(0.35, 0.72)]);
        list.rebuild(&mut ps).unwrap();
        assert_eq!(list.coords(list.occupied()[0]), (3, 7));
    }
}
