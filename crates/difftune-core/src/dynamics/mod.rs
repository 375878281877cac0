//! Dynamics models for DiffTune
//!
//! Implements the 6-DOF quadrotor rigid body:
//! - Continuous-time state derivative
//! - Discrete-time step with an exponential-map attitude update
//! - Closed-form Jacobians of the discrete step

pub mod quadrotor;

pub use quadrotor::*;
