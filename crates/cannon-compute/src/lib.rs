//! # Cannon Compute
//!
//! Compute backend abstraction for the Cannon workspace. This crate provides
//! a [`ComputeBackend`](backend::ComputeBackend) trait that isolates the
//! multiplication engine in `cannon-core` from how its independent steps are
//! scheduled onto hardware.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{ComputeBackend, ComputeError, DeviceInfo};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
