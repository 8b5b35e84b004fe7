//! Error types for the simulation engine

use thiserror::Error;

/// Simulation result type
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while loading traces or replaying them
#[derive(Error, Debug)]
pub enum SimError {
    /// Malformed or missing trace metadata/data
    #[error("Trace format error: {0}")]
    Format(String),

    /// Tick index past the end of the trace
    #[error("Tick {tick} out of range for trace of length {length}")]
    Range { tick: usize, length: usize },

    /// A policy requested spot capacity the trace does not grant
    #[error("Spot requested at tick {tick} while unavailable")]
    InvalidRequest { tick: u64 },

    /// Internal consistency check failed (strategy/environment bug)
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Create a trace format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means the trace ran out before the run finished
    pub fn is_trace_exhausted(&self) -> bool {
        matches!(self, Self::Range { .. })
    }
}
