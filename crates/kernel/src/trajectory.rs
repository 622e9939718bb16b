//! Trajectory sinks: where periodic position snapshots go.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::particle::Particle;

/// One snapshot handed to a sink. Particles are in original index order.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Zero-based step the snapshot was taken after.
    pub step: u64,
    /// Domain side length.
    pub side: f64,
    /// Particles in index order.
    pub particles: &'a [Particle],
}

impl Frame<'_> {
    /// Number of particles in the frame.
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }
}

/// Receives frames from whichever unit owns the authoritative state.
pub trait TrajectorySink: Send {
    /// Append one frame.
    fn record(&mut self, frame: &Frame<'_>) -> Result<()>;

    /// Flush buffered output.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Plain-text trajectory: a `"<n> <side>"` header before the first frame,
/// then one `"<x> <y>"` line per particle per frame.
pub struct TextTrajectory<W: Write + Send> {
    writer: W,
    header_written: bool,
}

impl<W: Write + Send> TextTrajectory<W> {
    /// Wrap an arbitrary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl TextTrajectory<BufWriter<File>> {
    /// Create (or truncate) a trajectory file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        tracing::info!("Writing trajectory to {}", path.as_ref().display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> TrajectorySink for TextTrajectory<W> {
    fn record(&mut self, frame: &Frame<'_>) -> Result<()> {
        if !self.header_written {
            writeln!(self.writer, "{} {}", frame.particle_count(), frame.side)?;
            self.header_written = true;
        }
        for p in frame.particles {
            writeln!(self.writer, "{} {}", p.x, p.y)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// A frame copied out of the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Step the frame was taken after
    pub step: u64,
    /// Domain side length
    pub side: f64,
    /// Positions in index order
    pub positions: Vec<(f64, f64)>,
}

/// Keeps every frame in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrajectory {
    /// Frames in the order they were recorded
    pub frames: Vec<RecordedFrame>,
}

impl MemoryTrajectory {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrajectorySink for MemoryTrajectory {
    fn record(&mut self, frame: &Frame<'_>) -> Result<()> {
        self.frames.push(RecordedFrame {
            step: frame.step,
            side: frame.side,
            positions: frame.particles.iter().map(|p| (p.x, p.y)).collect(),
        });
        Ok(())
    }
}
