//! # DiffTune Core
//!
//! Quadrotor geometric tracking control and closed-loop gain sensitivities.
//!
//! This library implements the rigid-body model, the SE(3) geometric
//! controller, and the forward (tangent-linear) sensitivity recursion used to
//! tune controller gains by gradient descent over simulated rollouts.
//!
//! ## Modules
//!
//! - [`math`]: SO(3) utilities, unit-vector derivatives, tangent algebra, integrators
//! - [`dynamics`]: Continuous and discrete quadrotor dynamics with their Jacobians
//! - [`control`]: Reference trajectories, gains, and the geometric controller
//! - [`sensitivity`]: Step Jacobians and the state/input sensitivity recursion

pub mod math;
pub mod dynamics;
pub mod control;
pub mod sensitivity;

use nalgebra::{SMatrix, SVector, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// Number of scalars in the flattened state: position, velocity, angular velocity, rotation
pub const STATE_DIM: usize = 18;

/// Number of scalars in the control input: thrust and body moment
pub const INPUT_DIM: usize = 4;

/// Number of tunable gain scalars
pub const GAIN_DIM: usize = 12;

/// Flattened state vector `[x, v, ω, vec(R)]` with `R` stored row-major
pub type StateVector = SVector<f64, STATE_DIM>;

/// Flattened gain vector `[k_x, k_v, k_R, k_W]`
pub type GainVector = SVector<f64, GAIN_DIM>;

/// Derivative of the state with respect to the gains
pub type StateSensitivity = SMatrix<f64, STATE_DIM, GAIN_DIM>;

/// Derivative of the control input with respect to the gains
pub type InputSensitivity = SMatrix<f64, INPUT_DIM, GAIN_DIM>;

/// Gravity constant [m/s²]
pub const GRAVITY: f64 = 9.81;

/// Unit vector along world z.
///
/// The world frame is z-down, so gravity acts along `+e3` and thrust along
/// `-R e3`.
pub fn e3() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}
