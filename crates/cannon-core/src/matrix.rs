//! Square integer matrices and their flat (row-major) wire representation.

use std::fmt;
use std::ops::Index;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building or addressing a [`Matrix`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Row {row} has {actual} entries, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Flat buffer holds {actual} values, expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    #[error("Line {line} is outside a {size}x{size} matrix")]
    LineOutOfRange { line: usize, size: usize },
}

/// An N×N grid of integers.
///
/// The shape is fixed at construction; the only mutations are rotations
/// (see [`crate::rotate`]) and element writes through the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<i64>>", try_from = "Vec<Vec<i64>>")]
pub struct Matrix {
    data: Array2<i64>,
}

impl Matrix {
    /// An `n`×`n` matrix of zeros.
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array2::zeros((n, n)),
        }
    }

    /// An `n`×`n` matrix whose entry `(i, j)` is `f(i, j)`.
    pub fn from_fn<F: FnMut(usize, usize) -> i64>(n: usize, mut f: F) -> Self {
        Self {
            data: Array2::from_shape_fn((n, n), |(i, j)| f(i, j)),
        }
    }

    /// Wrap an existing array, rejecting non-square shapes.
    pub fn from_array(data: Array2<i64>) -> Result<Self, MatrixError> {
        let (rows, cols) = data.dim();
        if rows != cols {
            return Err(MatrixError::NotSquare { rows, cols });
        }
        Ok(Self { data })
    }

    /// Build from nested rows. Every row must have as many entries as there
    /// are rows.
    pub fn from_rows(rows: Vec<Vec<i64>>) -> Result<Self, MatrixError> {
        let n = rows.len();
        let mut flat = Vec::with_capacity(n * n);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != n {
                return Err(MatrixError::RaggedRow {
                    row,
                    expected: n,
                    actual: values.len(),
                });
            }
            flat.extend(values);
        }
        Self::from_flat(&flat, n)
    }

    /// Reconstruct from a flat buffer of exactly `n * n` values, taking
    /// row `i` from `buffer[i * n..(i + 1) * n]`.
    pub fn from_flat(buffer: &[i64], n: usize) -> Result<Self, MatrixError> {
        if buffer.len() != n * n {
            return Err(MatrixError::BufferLength {
                expected: n * n,
                actual: buffer.len(),
            });
        }
        let data = Array2::from_shape_vec((n, n), buffer.to_vec()).map_err(|_| {
            MatrixError::BufferLength {
                expected: n * n,
                actual: buffer.len(),
            }
        })?;
        Ok(Self { data })
    }

    /// Flatten into row-major order.
    pub fn to_flat(&self) -> Vec<i64> {
        self.data.iter().copied().collect()
    }

    /// Side length N.
    pub fn size(&self) -> usize {
        self.data.nrows()
    }

    pub fn as_array(&self) -> &Array2<i64> {
        &self.data
    }

    pub(crate) fn as_array_mut(&mut self) -> &mut Array2<i64> {
        &mut self.data
    }

    /// Rows as nested vectors, for reporting.
    pub fn to_rows(&self) -> Vec<Vec<i64>> {
        self.data.outer_iter().map(|row| row.to_vec()).collect()
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = i64;

    fn index(&self, (i, j): (usize, usize)) -> &i64 {
        &self.data[[i, j]]
    }
}

impl From<Matrix> for Vec<Vec<i64>> {
    fn from(matrix: Matrix) -> Self {
        matrix.to_rows()
    }
}

impl TryFrom<Vec<Vec<i64>>> for Matrix {
    type Error = MatrixError;

    fn try_from(rows: Vec<Vec<i64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

/// Row-major dump, every value followed by a tab, one row per line.
impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.data.outer_iter() {
            for value in row.iter() {
                write!(f, "{value}\t")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_buffer_is_sliced_row_major() {
        let m = Matrix::from_flat(&[1, 2, 3, 4, 5, 6, 7, 8, 9], 3).unwrap();
        assert_eq!(m.to_rows(), vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
        assert_eq!(m[(1, 2)], 6);
        assert_eq!(m.to_flat(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let err = Matrix::from_flat(&[1, 2, 3], 2).unwrap_err();
        assert_eq!(err, MatrixError::BufferLength { expected: 4, actual: 3 });
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let err = Matrix::from_rows(vec![vec![1, 2], vec![3]]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::RaggedRow { row: 1, expected: 2, actual: 1 }
        );
    }

    #[test]
    fn test_non_square_array_is_rejected() {
        let err = Matrix::from_array(Array2::zeros((2, 3))).unwrap_err();
        assert_eq!(err, MatrixError::NotSquare { rows: 2, cols: 3 });
    }

    #[test]
    fn test_display_is_tab_separated() {
        let m = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        assert_eq!(m.to_string(), "1\t2\t\n3\t4\t\n");
    }

    #[test]
    fn test_nested_rows_conversion_round_trips() {
        let m = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        let rows: Vec<Vec<i64>> = m.clone().into();
        assert_eq!(Matrix::try_from(rows).unwrap(), m);
    }
}
