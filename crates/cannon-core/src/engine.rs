//! Rolling (skew-and-shift) multiplication engine.
//!
//! Both schedules compute `C[i][j] = Σ_m A[i][m]·B[m][j]` for square
//! operands of equal size. They differ in how operand rotation is organised:
//!
//! - [`Schedule::Cannon`] pre-skews once, then gives every step `k` its own
//!   copy of the operands rolled a further `k` positions. Step `k` pairs
//!   `A[i][m]` with `B[m][j]` for `m = (i + j + k) mod N`, so the `N` steps
//!   together cover every `m`. Steps run concurrently on the compute backend
//!   and their partials are summed with per-cell atomic adds.
//! - [`Schedule::Literal`] replays the historical stepping serially: after
//!   every `(i, j)` pair the operands are rolled in place (row `i` left,
//!   column `j` up). Within one sweep row `i` has been rolled `j` times and
//!   column `j` `i` times, so both operand lookups land on the same index
//!   `(2i + 2j + k) mod N` and the sum over `k` is still the full product.
//!
//! Arithmetic is checked in both schedules: a product or running sum that
//! leaves the `i64` range is [`EngineError::Overflow`], in debug and release
//! builds alike.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cannon_compute::{ComputeBackend, ComputeError, CpuBackend};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::{Matrix, MatrixError};
use crate::rotate::{roll_lane, RollDirection};

/// Errors raised by [`CannonEngine::multiply`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Operands differ in size: left is {left}x{left}, right is {right}x{right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Product entry ({row}, {col}) overflows i64")]
    Overflow { row: usize, col: usize },

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("Compute backend error: {0}")]
    Compute(#[from] ComputeError),
}

/// How the accumulation loop rotates its operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// Parallel steps over private rotated copies.
    #[default]
    Cannon,
    /// Serial, in-place rotation after every `(i, j)` pair.
    Literal,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cannon => f.write_str("cannon"),
            Schedule::Literal => f.write_str("literal"),
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cannon" => Ok(Schedule::Cannon),
            "literal" => Ok(Schedule::Literal),
            other => Err(format!(
                "Unknown schedule '{}'. Valid schedules: cannon, literal",
                other
            )),
        }
    }
}

/// The multiplication engine, holding its backend and schedule.
pub struct CannonEngine {
    pub backend: Arc<dyn ComputeBackend>,
    pub schedule: Schedule,
}

impl Default for CannonEngine {
    fn default() -> Self {
        Self {
            backend: Arc::new(CpuBackend::new()),
            schedule: Schedule::default(),
        }
    }
}

impl CannonEngine {
    pub fn new(backend: Arc<dyn ComputeBackend>, schedule: Schedule) -> Self {
        Self { backend, schedule }
    }

    /// Multiply two square matrices of equal size.
    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix, EngineError> {
        if a.size() != b.size() {
            return Err(EngineError::DimensionMismatch {
                left: a.size(),
                right: b.size(),
            });
        }
        debug!(
            "multiplying {n}x{n} operands with the {} schedule on {}",
            self.schedule,
            self.backend.device_info().name,
            n = a.size()
        );
        match self.schedule {
            Schedule::Cannon => self.multiply_cannon(a, b),
            Schedule::Literal => multiply_literal(a, b),
        }
    }

    fn multiply_cannon(&self, a: &Matrix, b: &Matrix) -> Result<Matrix, EngineError> {
        let n = a.size();
        let a_skewed = pre_skew(a.as_array(), RollDirection::RowLeft);
        let b_skewed = pre_skew(b.as_array(), RollDirection::ColumnUp);

        let step = |k: usize| -> Result<Array2<i64>, ComputeError> {
            let mut a_k = a_skewed.clone();
            let mut b_k = b_skewed.clone();
            for line in 0..n {
                roll_lane(&mut a_k, RollDirection::RowLeft, line, k);
                roll_lane(&mut b_k, RollDirection::ColumnUp, line, k);
            }
            // a_k[i][j] = A[i][m], b_k[i][j] = B[m][j], m = (i + j + k) mod n
            for ((i, j), cell) in a_k.indexed_iter_mut() {
                *cell = cell
                    .checked_mul(b_k[[i, j]])
                    .ok_or(ComputeError::Overflow { row: i, col: j })?;
            }
            Ok(a_k)
        };

        let product = self
            .backend
            .parallel_accumulate(n, n, n, &step)
            .map_err(|e| match e {
                ComputeError::Overflow { row, col } => EngineError::Overflow { row, col },
                other => EngineError::Compute(other),
            })?;
        Ok(Matrix::from_array(product)?)
    }
}

/// Rotate line `i` by `i` positions, for every `i`.
fn pre_skew(data: &Array2<i64>, direction: RollDirection) -> Array2<i64> {
    let mut skewed = data.clone();
    for line in 0..skewed.nrows() {
        roll_lane(&mut skewed, direction, line, line);
    }
    skewed
}

fn multiply_literal(a: &Matrix, b: &Matrix) -> Result<Matrix, EngineError> {
    let n = a.size();
    let mut first = pre_skew(a.as_array(), RollDirection::RowLeft);
    let mut second = pre_skew(b.as_array(), RollDirection::ColumnUp);
    let mut result = Matrix::zeros(n);

    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                let m = (i + j + k) % n;
                let sum = first[[i, m]]
                    .checked_mul(second[[m, j]])
                    .and_then(|term| result[(i, j)].checked_add(term))
                    .ok_or(EngineError::Overflow { row: i, col: j })?;
                result.as_array_mut()[[i, j]] = sum;
                roll_lane(&mut first, RollDirection::RowLeft, i, 1);
                roll_lane(&mut second, RollDirection::ColumnUp, j, 1);
            }
        }
    }
    Ok(result)
}
