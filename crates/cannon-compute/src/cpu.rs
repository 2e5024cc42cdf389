//! CPU compute backend using Rayon for shared-memory parallelism.

use std::sync::atomic::{AtomicI64, Ordering};

use log::debug;
use ndarray::Array2;
use rayon::prelude::*;

use crate::backend::{ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises accumulation steps across threads via Rayon.
pub struct CpuBackend {
    num_threads: usize,
    /// Dedicated pool; `None` means Rayon's global pool.
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend on Rayon's global pool.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with its own pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("cannon-step-{i}"))
            .build()
            .map_err(|e| ComputeError::Unavailable(e.to_string()))?;
        debug!("built a pool of {} step threads", pool.current_num_threads());
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(pool),
        })
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_accumulate(
        &self,
        rows: usize,
        cols: usize,
        steps: usize,
        step_fn: &(dyn Fn(usize) -> Result<Array2<i64>, ComputeError> + Send + Sync),
    ) -> Result<Array2<i64>, ComputeError> {
        let cells: Vec<AtomicI64> = (0..rows * cols).map(|_| AtomicI64::new(0)).collect();

        let run = || {
            (0..steps).into_par_iter().try_for_each(|k| {
                let partial = step_fn(k)?;
                if partial.dim() != (rows, cols) {
                    return Err(ComputeError::ShapeMismatch {
                        step: k,
                        expected: (rows, cols),
                        actual: partial.dim(),
                    });
                }
                for ((i, j), &value) in partial.indexed_iter() {
                    cells[i * cols + j]
                        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cell| {
                            cell.checked_add(value)
                        })
                        .map_err(|_| ComputeError::Overflow { row: i, col: j })?;
                }
                Ok(())
            })
        };

        match &self.pool {
            Some(pool) => pool.install(run)?,
            None => run()?,
        }

        let data: Vec<i64> = cells.into_iter().map(AtomicI64::into_inner).collect();
        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }
}
