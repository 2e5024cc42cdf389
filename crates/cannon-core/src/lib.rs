//! # Cannon Core
//!
//! The numerical backbone of the Cannon workspace: square integer matrices,
//! the row/column rotation primitive, and the rolling (skew-and-shift)
//! multiplication engine.
//!
//! ## Modules
//!
//! - [`matrix`] — The [`Matrix`](matrix::Matrix) type and its flat wire form.
//! - [`rotate`] — Cyclic row-left / column-up rotation.
//! - [`engine`] — The [`CannonEngine`](engine::CannonEngine) and its schedules.

pub mod engine;
pub mod matrix;
pub mod rotate;

pub use engine::{CannonEngine, EngineError, Schedule};
pub use matrix::{Matrix, MatrixError};
pub use rotate::{rotate, rotate_back, RollDirection};
