//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so that
//! the engine in `cannon-core` only describes *what* one accumulation step
//! computes, never how the steps are spread across threads.

use ndarray::Array2;
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Step {step} produced a {actual:?} partial, expected {expected:?}")]
    ShapeMismatch {
        step: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Accumulated value at ({row}, {col}) overflows i64")]
    Overflow { row: usize, col: usize },
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub compute_units: Option<usize>,
}

/// Abstraction over compute backends.
///
/// Implementations run independent accumulation steps, possibly
/// concurrently, and sum their partial results into one output matrix.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Evaluate `step_fn(k)` for every `k in 0..steps` and sum the partials.
    ///
    /// Every partial must have shape `(rows, cols)`. Steps may run in any
    /// order and concurrently; the summation into the output is synchronised
    /// per cell, so two steps touching the same cell never lose an update.
    /// A sum that leaves the `i64` range is [`ComputeError::Overflow`], never
    /// a wrapped value. The first failing step aborts the accumulation.
    fn parallel_accumulate(
        &self,
        rows: usize,
        cols: usize,
        steps: usize,
        step_fn: &(dyn Fn(usize) -> Result<Array2<i64>, ComputeError> + Send + Sync),
    ) -> Result<Array2<i64>, ComputeError>;
}
