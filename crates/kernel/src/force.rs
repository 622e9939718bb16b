//! Short-range repulsive pair force evaluated over a cell neighborhood.
//!
//! Every particle scans its own clipped 3x3 block and accumulates only into
//! itself. Pairs are therefore evaluated twice (once from each side), which
//! keeps writes private to the particle being updated and makes the result
//! independent of how particles are split across workers.

use serde::{Deserialize, Serialize};

use crate::geometry::DEFAULT_CUTOFF;
use crate::neighbor::{clipped_block, CellList};
use crate::particle::Particle;

/// Default particle mass.
pub const DEFAULT_MASS: f64 = 0.01;

/// Parameters of the pair force.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceLaw {
    /// Pairs further apart than this do not interact.
    pub cutoff: f64,
    /// Separations are clamped to at least this to avoid the singularity.
    pub min_r: f64,
    /// Mass of every particle.
    pub mass: f64,
}

impl ForceLaw {
    /// Force law with `min_r = cutoff / 100`.
    pub fn new(cutoff: f64, mass: f64) -> Self {
        Self {
            cutoff,
            min_r: cutoff / 100.0,
            mass,
        }
    }

    /// Acceleration contributed by a neighbor at offset `(dx, dy)`
    /// (neighbor minus particle), or `None` beyond the cutoff.
    #[inline]
    pub fn pair_acceleration(&self, dx: f64, dy: f64) -> Option<(f64, f64)> {
        let r2 = dx * dx + dy * dy;
        if r2 > self.cutoff * self.cutoff {
            return None;
        }
        let r2 = r2.max(self.min_r * self.min_r);
        let r = r2.sqrt();
        let coef = (1.0 - self.cutoff / r) / r2 / self.mass;
        Some((coef * dx, coef * dy))
    }
}

impl Default for ForceLaw {
    fn default() -> Self {
        Self::new(DEFAULT_CUTOFF, DEFAULT_MASS)
    }
}

/// Something that can enumerate the particles binned in a cell.
pub trait NeighborSource {
    /// Number of cells along each axis.
    fn resolution(&self) -> usize;

    /// Call `f(id, x, y)` for every particle in cell `(cx, cy)`.
    fn for_each_in_cell<F>(&self, cx: usize, cy: usize, f: F)
    where
        F: FnMut(usize, f64, f64);
}

/// A [`CellList`] paired with the particle slice its indices refer to.
#[derive(Debug, Clone, Copy)]
pub struct IndexedPositions<'a> {
    index: &'a CellList,
    particles: &'a [Particle],
}

impl<'a> IndexedPositions<'a> {
    /// `particles` must be the slice `index` was last rebuilt from (or a
    /// copy of it with identical positions).
    pub fn new(index: &'a CellList, particles: &'a [Particle]) -> Self {
        Self { index, particles }
    }
}

impl NeighborSource for IndexedPositions<'_> {
    fn resolution(&self) -> usize {
        self.index.resolution()
    }

    #[inline]
    fn for_each_in_cell<F>(&self, cx: usize, cy: usize, mut f: F)
    where
        F: FnMut(usize, f64, f64),
    {
        if let Some(cell) = self.index.cell(cx, cy) {
            for j in cell.particles() {
                let p = &self.particles[j];
                f(j, p.x, p.y);
            }
        }
    }
}

/// Acceleration on particle `id` from every other particle in its clipped
/// 3x3 block. Uses the particle's cached cell coordinates.
pub fn acceleration<S: NeighborSource>(
    id: usize,
    particle: &Particle,
    source: &S,
    law: &ForceLaw,
) -> (f64, f64) {
    let (mut ax, mut ay) = (0.0, 0.0);
    for (x, y) in clipped_block(particle.cx, particle.cy, source.resolution()) {
        source.for_each_in_cell(x, y, |j, nx, ny| {
            // identity, not distance: a coincident neighbor is still a neighbor
            if j == id {
                return;
            }
            if let Some((dax, day)) = law.pair_acceleration(nx - particle.x, ny - particle.y) {
                ax += dax;
                ay += day;
            }
        });
    }
    (ax, ay)
}

/// Zero `particle`'s acceleration and recompute it from its neighborhood.
pub fn compute_force<S: NeighborSource>(
    particle: &mut Particle,
    id: usize,
    source: &S,
    law: &ForceLaw,
) {
    particle.ax = 0.0;
    particle.ay = 0.0;
    let (ax, ay) = acceleration(id, particle, source, law);
    particle.ax = ax;
    particle.ay = ay;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DomainGeometry;
    use approx::assert_relative_eq;

    fn setup(points: &[(f64, f64)], side: f64, cutoff: f64) -> (CellList, Vec<Particle>) {
        let mut index = CellList::new(DomainGeometry::with_side(side, cutoff).unwrap());
        let mut ps: Vec<Particle> = points.iter().map(|&(x, y)| Particle::at(x, y)).collect();
        index.rebuild(&mut ps).unwrap();
        (index, ps)
    }

    #[test]
    fn lone_particle_has_zero_acceleration() {
        let (index, mut ps) = setup(&[(0.5, 0.5)], 1.0, 0.01);
        ps[0].ax = 7.0;
        ps[0].ay = -7.0;
        let snapshot = ps.clone();
        let view = IndexedPositions::new(&index, &snapshot);
        compute_force(&mut ps[0], 0, &view, &ForceLaw::default());
        assert_eq!((ps[0].ax, ps[0].ay), (0.0, 0.0));
    }

    #[test]
    fn beyond_cutoff_no_force() {
        let law = ForceLaw::new(0.1, 0.01);
        assert!(law.pair_acceleration(0.1, 0.0001).is_none());
        assert!(law.pair_acceleration(0.0, 0.1).is_some());
    }

    #[test]
    fn force_is_repulsive() {
        let law = ForceLaw::new(0.1, 0.01);
        let (ax, ay) = law.pair_acceleration(0.05, 0.0).unwrap();
        // neighbor to the right pushes us left
        assert!(ax < 0.0);
        assert_eq!(ay, 0.0);
        // (1 - 0.1/0.05) / 0.0025 / 0.01 * 0.05
        assert_relative_eq!(ax, -2000.0, max_relative = 1e-12);
    }

    #[test]
    fn coincident_particles_are_clamped_not_singular() {
        let law = ForceLaw::new(0.1, 0.01);
        let (ax, ay) = law.pair_acceleration(0.0, 0.0).unwrap();
        assert_eq!((ax, ay), (0.0, 0.0));
        let (ax, _) = law.pair_acceleration(1e-9, 0.0).unwrap();
        assert!(ax.is_finite());
    }

    #[test]
    fn pair_forces_are_equal_and_opposite() {
        let (index, ps) = setup(&[(0.50, 0.50), (0.53, 0.52)], 1.0, 0.1);
        let law = ForceLaw::new(0.1, 0.01);
        let view = IndexedPositions::new(&index, &ps);
        let (ax0, ay0) = acceleration(0, &ps[0], &view, &law);
        let (ax1, ay1) = acceleration(1, &ps[1], &view, &law);
        assert!(ax0 != 0.0);
        assert_relative_eq!(ax0, -ax1, max_relative = 1e-12);
        assert_relative_eq!(ay0, -ay1, max_relative = 1e-12);
    }

    #[test]
    fn neighbor_in_adjacent_cell_is_found() {
        // cell width 0.1; particles straddle the x = 0.5 cell edge
        let (index, ps) = setup(&[(0.499, 0.5), (0.501, 0.5)], 1.0, 0.1);
        assert_ne!(ps[0].cx, ps[1].cx);
        let law = ForceLaw::new(0.1, 0.01);
        let view = IndexedPositions::new(&index, &ps);
        let (ax, _) = acceleration(0, &ps[0], &view, &law);
        assert!(ax < 0.0);
    }

    #[test]
    fn self_pair_is_excluded_by_identity() {
        // a second particle at the exact same position still interacts
        // (with zero offset) while the particle itself is skipped
        let (index, ps) = setup(&[(0.5, 0.5), (0.5, 0.5), (0.52, 0.5)], 1.0, 0.1);
        let law = ForceLaw::new(0.1, 0.01);
        let view = IndexedPositions::new(&index, &ps);
        let (ax_dup, _) = acceleration(0, &ps[0], &view, &law);
        let (ax_single, _) = law.pair_acceleration(0.02, 0.0).unwrap();
        assert_relative_eq!(ax_dup, ax_single, max_relative = 1e-12);
    }
}
