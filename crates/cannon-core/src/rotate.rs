//! Cyclic rotation of a single row or column.
//!
//! A rotation by `amount` is performed as `amount` single-element steps, so
//! an amount of N or more wraps around by repetition rather than by reducing
//! it modulo N first. The result is the same either way.

use ndarray::{Array2, ArrayViewMut1, Axis};

use crate::matrix::{Matrix, MatrixError};

/// Which line is rotated, and towards which end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollDirection {
    /// Row `line` moves left; its first element wraps to the end.
    RowLeft,
    /// Column `line` moves up; its top element wraps to the bottom.
    ColumnUp,
}

/// Rotate row or column `line` of `matrix` by `amount` positions.
pub fn rotate(
    matrix: &mut Matrix,
    direction: RollDirection,
    line: usize,
    amount: usize,
) -> Result<(), MatrixError> {
    check_line(matrix, line)?;
    roll_lane(matrix.as_array_mut(), direction, line, amount);
    Ok(())
}

/// Inverse of [`rotate`]: moves the row right or the column down.
pub fn rotate_back(
    matrix: &mut Matrix,
    direction: RollDirection,
    line: usize,
    amount: usize,
) -> Result<(), MatrixError> {
    check_line(matrix, line)?;
    let mut lane = lane_mut(matrix.as_array_mut(), direction, line);
    for _ in 0..amount {
        step_back(&mut lane);
    }
    Ok(())
}

fn check_line(matrix: &Matrix, line: usize) -> Result<(), MatrixError> {
    let size = matrix.size();
    if line >= size {
        return Err(MatrixError::LineOutOfRange { line, size });
    }
    Ok(())
}

/// Unchecked rotation used by the engine, whose line indices are always
/// below N. Panics (via ndarray) on an out-of-range line.
pub(crate) fn roll_lane(data: &mut Array2<i64>, direction: RollDirection, line: usize, amount: usize) {
    let mut lane = lane_mut(data, direction, line);
    for _ in 0..amount {
        step_forward(&mut lane);
    }
}

fn lane_mut(data: &mut Array2<i64>, direction: RollDirection, line: usize) -> ArrayViewMut1<'_, i64> {
    match direction {
        RollDirection::RowLeft => data.index_axis_mut(Axis(0), line),
        RollDirection::ColumnUp => data.index_axis_mut(Axis(1), line),
    }
}

fn step_forward(lane: &mut ArrayViewMut1<'_, i64>) {
    let len = lane.len();
    if len < 2 {
        return;
    }
    let first = lane[0];
    for j in 0..len - 1 {
        lane[j] = lane[j + 1];
    }
    lane[len - 1] = first;
}

fn step_back(lane: &mut ArrayViewMut1<'_, i64>) {
    let len = lane.len();
    if len < 2 {
        return;
    }
    let last = lane[len - 1];
    for j in (1..len).rev() {
        lane[j] = lane[j - 1];
    }
    lane[0] = last;
}
