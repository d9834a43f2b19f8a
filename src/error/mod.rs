//! Harness-wide error types.

pub mod classification;

use std::io;

use thiserror::Error;

pub use classification::{ClassifiedError, ErrorCategory};

/// Top-level error for harness operations.
///
/// Subsystem errors convert into this type at the scheduler boundary so the
/// main loop can decide between retry, hard surface, and fatal stop.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("backlog error: {0}")]
    Backlog(#[from] crate::backlog::BacklogError),

    #[error("vcs error: {0}")]
    Vcs(#[from] crate::vcs::VcsError),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("preflight failed: {0}")]
    Preflight(String),

    #[error("session transport error: {0}")]
    Transport(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the harness.
pub type Result<T> = std::result::Result<T, HarnessError>;
