//! Exported results
//!
//! Read-only records for plotting and reporting: the per-iteration tuning
//! history and the time series of one rollout.

use nalgebra::Vector3;
use serde::Serialize;

use difftune_core::control::{ControllerGains, ReferenceSample, TrackingErrors};
use difftune_core::dynamics::QuadrotorState;

/// Per-iteration history of a tuning session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningHistory {
    /// Sum of squared position errors per rollout
    pub losses: Vec<f64>,
    pub rmse: Vec<f64>,
    pub gradient_norms: Vec<f64>,
    /// Gains before the first iteration, then after every update
    pub gains: Vec<ControllerGains>,
}

impl TuningHistory {
    pub fn new(initial: ControllerGains, iterations: usize) -> Self {
        let mut gains = Vec::with_capacity(iterations + 1);
        gains.push(initial);
        Self {
            losses: Vec::with_capacity(iterations),
            rmse: Vec::with_capacity(iterations),
            gradient_norms: Vec::with_capacity(iterations),
            gains,
        }
    }

    pub fn record(&mut self, loss: f64, rmse: f64, gradient_norm: f64, gains: ControllerGains) {
        self.losses.push(loss);
        self.rmse.push(rmse);
        self.gradient_norms.push(gradient_norm);
        self.gains.push(gains);
    }

    /// Number of completed iterations
    pub fn iterations(&self) -> usize {
        self.losses.len()
    }

    /// Most recent gains
    pub fn latest_gains(&self) -> Option<&ControllerGains> {
        self.gains.last()
    }
}

/// Time series of one rollout, one entry per control step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloutTrace {
    pub times: Vec<f64>,
    pub actual_positions: Vec<Vector3<f64>>,
    pub desired_positions: Vec<Vector3<f64>>,
    pub position_errors: Vec<Vector3<f64>>,
    pub velocity_errors: Vec<Vector3<f64>>,
    pub attitude_errors: Vec<Vector3<f64>>,
    pub angular_velocity_errors: Vec<Vector3<f64>>,
}

impl RolloutTrace {
    /// Zero-filled trace for `steps` control steps
    pub fn with_steps(steps: usize) -> Self {
        let zeros = vec![Vector3::zeros(); steps];
        Self {
            times: vec![0.0; steps],
            actual_positions: zeros.clone(),
            desired_positions: zeros.clone(),
            position_errors: zeros.clone(),
            velocity_errors: zeros.clone(),
            attitude_errors: zeros.clone(),
            angular_velocity_errors: zeros,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Write step `i`
    pub fn record(
        &mut self,
        i: usize,
        time: f64,
        state: &QuadrotorState,
        reference: &ReferenceSample,
        errors: &TrackingErrors,
    ) {
        self.times[i] = time;
        self.actual_positions[i] = state.position;
        self.desired_positions[i] = reference.position;
        self.position_errors[i] = errors.position;
        self.velocity_errors[i] = errors.velocity;
        self.attitude_errors[i] = errors.attitude;
        self.angular_velocity_errors[i] = errors.angular_velocity;
    }

    /// Largest position error norm over the rollout
    pub fn max_position_error(&self) -> f64 {
        self.position_errors.iter().map(|e| e.norm()).fold(0.0, f64::max)
    }
}
