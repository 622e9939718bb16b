//! Error taxonomy shared by every layer of the simulation.
//!
//! None of these are recoverable inside a running simulation: once a step
//! fails on any participant the whole run is torn down.

use thiserror::Error;

/// Errors produced while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid particle count, worker/rank count or physical constant.
    /// Reported before any simulation work begins.
    #[error("configuration error: {0}")]
    Config(String),

    /// Grid resolution of zero, or a position that maps outside the grid.
    #[error("domain error: {0}")]
    Domain(String),

    /// A barrier or collective could not complete across all participants.
    #[error("synchronization error: {0}")]
    Sync(String),

    /// Trajectory output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// `true` for errors raised only because some other participant failed.
    pub fn is_sync(&self) -> bool {
        matches!(self, SimError::Sync(_))
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SimError>;
