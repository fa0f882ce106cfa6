// src/error.rs

use std::error::Error;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Errors produced by fitting, transforming and diagnosing PCA models.
///
/// Every variant is terminal for the call that produced it: a fit or a metrics
/// computation either returns a complete result or one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PcaError {
    /// Invalid or conflicting options, or a request the fitted model cannot serve.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// More components were requested than the data can support.
    #[error("Requested {requested} components, but only {available} are available")]
    RankDeficiency { requested: usize, available: usize },

    /// A NIPALS component did not converge within the iteration cap.
    #[error("NIPALS did not converge for component {component} within {iterations} iterations")]
    Convergence { component: usize, iterations: usize },

    /// Zero-spread columns under scaling, degenerate kernel matrices, failed factorizations.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Empty, ragged or non-finite input matrices.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Data whose shape does not match what a fitted model expects.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl From<ThreadSafeStdError> for PcaError {
    fn from(e: ThreadSafeStdError) -> Self {
        PcaError::Numerical(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PcaError>;
