//! Mathematical utilities for DiffTune
//!
//! Implements SO(3) hat/vee and exponential maps, unit-vector derivatives,
//! the tangent algebra used for controller Jacobians, and numerical integrators.

pub mod rotation;
pub mod unit_vector;
pub mod tangent;
pub mod triad;
pub mod integrator;

pub use rotation::*;
pub use unit_vector::*;
pub use tangent::*;
pub use triad::*;
pub use integrator::*;
