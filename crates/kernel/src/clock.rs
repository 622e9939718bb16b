//! Wall-clock stopwatch used only for end-of-run reporting.

use std::time::{Duration, Instant};

/// Opaque monotonic stopwatch.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start timing now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since [`Stopwatch::start`].
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed seconds.
    pub fn read(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}
