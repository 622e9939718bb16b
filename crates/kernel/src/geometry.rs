//! Domain geometry: square side length and uniform grid resolution.
//!
//! The side grows with the square root of the particle count so that the
//! number density stays fixed, which keeps the average cell occupancy low.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Target number density (particles per unit area divided into the side).
pub const DEFAULT_DENSITY: f64 = 0.0005;

/// Interaction cutoff radius.
pub const DEFAULT_CUTOFF: f64 = 0.01;

/// Largest grid the cell list will allocate.
pub const MAX_CELLS: usize = 1 << 26;

/// Immutable square domain `[0, side] x [0, side]` split into
/// `resolution x resolution` cells of width `cell_width`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainGeometry {
    side: f64,
    resolution: usize,
    cell_width: f64,
    cutoff: f64,
}

impl DomainGeometry {
    /// Derive the domain for `particle_count` particles at `density`.
    ///
    /// `side = sqrt(density * particle_count)`, `resolution = floor(side / cutoff)`,
    /// `cell_width = side / resolution`.
    pub fn configure(particle_count: usize, density: f64, cutoff: f64) -> Result<Self> {
        if particle_count == 0 {
            return Err(SimError::Domain(
                "particle count must be positive".to_string(),
            ));
        }
        if !(density.is_finite() && density > 0.0) {
            return Err(SimError::Domain(format!(
                "density must be positive and finite, got {density}"
            )));
        }
        Self::with_side((density * particle_count as f64).sqrt(), cutoff)
    }

    /// Build a domain with an explicit side length.
    pub fn with_side(side: f64, cutoff: f64) -> Result<Self> {
        if !(side.is_finite() && side > 0.0) {
            return Err(SimError::Domain(format!(
                "side must be positive and finite, got {side}"
            )));
        }
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(SimError::Domain(format!(
                "cutoff must be positive and finite, got {cutoff}"
            )));
        }

        // floor, never round: every index computed from [0, side) stays in range
        let resolution = (side / cutoff).floor() as usize;
        if resolution == 0 {
            return Err(SimError::Domain(format!(
                "grid resolution is zero (side {side} < cutoff {cutoff})"
            )));
        }
        match resolution.checked_mul(resolution) {
            Some(cells) if cells <= MAX_CELLS => {}
            _ => {
                return Err(SimError::Domain(format!(
                    "grid of {resolution} x {resolution} cells exceeds the {MAX_CELLS} cell limit \
                     (side {side}, cutoff {cutoff})"
                )));
            }
        }

        Ok(Self {
            side,
            resolution,
            cell_width: side / resolution as f64,
            cutoff,
        })
    }

    /// Side length of the square domain.
    pub fn side(&self) -> f64 {
        self.side
    }

    /// Number of cells along each axis.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Width of a single cell.
    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    /// Interaction cutoff the grid was sized for.
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Total number of cells in the grid.
    pub fn cell_count(&self) -> usize {
        self.resolution * self.resolution
    }

    /// `true` if `(x, y)` lies in the closed domain.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (0.0..=self.side).contains(&x) && (0.0..=self.side).contains(&y)
    }

    /// Map a position to its cell coordinates.
    ///
    /// A coordinate sitting exactly on the far wall (or rounding up to
    /// `resolution` there) is placed in the last cell. Anything outside the
    /// closed domain is a [`SimError::Domain`].
    pub fn cell_of(&self, x: f64, y: f64) -> Result<(usize, usize)> {
        Ok((self.axis_cell(x, 'x')?, self.axis_cell(y, 'y')?))
    }

    #[inline]
    fn axis_cell(&self, v: f64, axis: char) -> Result<usize> {
        if !(0.0..=self.side).contains(&v) {
            return Err(SimError::Domain(format!(
                "{axis} = {v} lies outside [0, {}]",
                self.side
            )));
        }
        let c = (v / self.cell_width).floor() as usize;
        Ok(c.min(self.resolution - 1))
    }

    /// `true` if `(x, y)` is within `cutoff` of any edge of cell `(cx, cy)`.
    pub fn near_cell_edge(&self, x: f64, y: f64, cx: usize, cy: usize) -> bool {
        let left = cx as f64 * self.cell_width;
        let bottom = cy as f64 * self.cell_width;
        let right = left + self.cell_width;
        let top = bottom + self.cell_width;

        (left <= x && x <= left + self.cutoff)
            || (right - self.cutoff <= x && x <= right)
            || (bottom <= y && y <= bottom + self.cutoff)
            || (top - self.cutoff <= y && y <= top)
    }
}
