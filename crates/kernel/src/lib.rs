//! Cell-list particle kernel
//!
//! This crate holds the physics of the short-range particle simulation and
//! nothing about threads or processes. It is separable and compute-focused.
//!
//! # Modules
//! - [`geometry`] -- Domain side length and uniform grid resolution.
//! - [`particle`] -- `Particle` record and the flat `ParticleStore`.
//! - [`neighbor`] -- Cell list with dirty-cell clearing and clipped 3x3 neighborhoods.
//! - [`packed`] -- Fixed-capacity flattened copy of the cell list for shipping between ranks.
//! - [`force`] -- Short-range repulsive pair force and per-particle neighborhood scan.
//! - [`integrator`] -- Kick-drift step with repeated wall reflection.
//! - [`trajectory`] -- Frame sinks (text file, in-memory).
//! - [`clock`] -- Stopwatch for run reports.
//! - [`error`] -- `SimError` taxonomy.

#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod force;
pub mod geometry;
pub mod integrator;
pub mod neighbor;
pub mod packed;
pub mod particle;
pub mod trajectory;

pub use clock::Stopwatch;
pub use error::{Result, SimError};
pub use force::{compute_force, ForceLaw, IndexedPositions, NeighborSource};
pub use geometry::DomainGeometry;
pub use integrator::advance;
pub use neighbor::{Cell, CellList};
pub use packed::PackedGrid;
pub use particle::{Particle, ParticleStore};
pub use trajectory::{Frame, MemoryTrajectory, TextTrajectory, TrajectorySink};
