//! Closed-loop rollout with gain sensitivities
//!
//! One rollout runs the geometric controller over N control steps, advances
//! the true state with the configured integrator, propagates dX/dθ along the
//! discrete model and accumulates the tracking loss and its gradient:
//!
//! ```text
//! L     = Σᵢ ‖e_x(i)‖²
//! ∇θ L  = Σᵢ 2 e_x(i)ᵀ · ∂x/∂θ(i)
//! RMSE  = sqrt(L / N)
//! ```

use log::debug;
use thiserror::Error;

use difftune_core::control::{ControlError, ControllerGains, GeometricController, ReferenceTrajectory};
use difftune_core::dynamics::{QuadrotorDynamics, QuadrotorParams, QuadrotorState, TruthIntegrator};
use difftune_core::math::IntegrationError;
use difftune_core::sensitivity::{SensitivityError, SensitivityPropagator, StepJacobians};
use difftune_core::GainVector;

use crate::report::RolloutTrace;

/// Rollout failures, each tagged with the control step it happened at
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RolloutError {
    #[error("Controller failed at step {step} (t = {time:.3} s): {source}")]
    Control {
        step: usize,
        time: f64,
        source: ControlError,
    },
    #[error("Integration failed at step {step}: {source}")]
    Integration { step: usize, source: IntegrationError },
    #[error("Sensitivity propagation failed at step {step}: {source}")]
    Sensitivity { step: usize, source: SensitivityError },
    /// Loss or true state stopped being finite
    #[error("Rollout diverged at step {step}: {value}")]
    Divergence { step: usize, value: f64 },
}

impl RolloutError {
    pub fn step(&self) -> usize {
        match self {
            Self::Control { step, .. }
            | Self::Integration { step, .. }
            | Self::Sensitivity { step, .. }
            | Self::Divergence { step, .. } => *step,
        }
    }
}

/// Result of a completed rollout
#[derive(Debug, Clone)]
pub struct RolloutResult {
    pub loss: f64,
    pub rmse: f64,
    /// ∇θ L in the flattened gain layout
    pub gradient: GainVector,
    pub trace: RolloutTrace,
}

/// Runs rollouts of a fixed length from a fixed initial state
///
/// The sensitivity history is allocated once and reused by every rollout.
/// Construction fails when the horizon exceeds
/// [`MAX_HORIZON`](difftune_core::sensitivity::MAX_HORIZON).
#[derive(Debug, Clone)]
pub struct RolloutRunner {
    dynamics: QuadrotorDynamics,
    controller: GeometricController,
    integrator: TruthIntegrator,
    initial_state: QuadrotorState,
    dt: f64,
    sensitivity: SensitivityPropagator,
}

impl RolloutRunner {
    pub fn new(
        params: QuadrotorParams,
        initial_state: QuadrotorState,
        dt: f64,
        steps: usize,
        integrator: TruthIntegrator,
    ) -> Result<Self, SensitivityError> {
        Ok(Self {
            dynamics: QuadrotorDynamics::new(params.clone()),
            controller: GeometricController::new(params),
            integrator,
            initial_state,
            dt,
            sensitivity: SensitivityPropagator::new(steps)?,
        })
    }

    /// Number of control steps N
    pub fn steps(&self) -> usize {
        self.sensitivity.steps()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Sensitivities of the most recent rollout
    pub fn sensitivity(&self) -> &SensitivityPropagator {
        &self.sensitivity
    }

    /// Run one rollout with fixed gains
    ///
    /// # Errors
    /// Aborts at the first failing step; nothing computed after it is used.
    pub fn run<T>(&mut self, reference: &T, gains: &ControllerGains) -> Result<RolloutResult, RolloutError>
    where
        T: ReferenceTrajectory + ?Sized,
    {
        let steps = self.steps();
        let dt = self.dt;
        debug!(
            "Starting rollout: {} steps of {} s, gains {:?}",
            steps,
            dt,
            gains.to_vector().as_slice()
        );

        self.sensitivity.reset();
        let mut trace = RolloutTrace::with_steps(steps);
        let mut x = self.initial_state.to_vector();
        let mut loss = 0.0;
        let mut gradient = GainVector::zeros();

        for step in 0..steps {
            let time = step as f64 * dt;
            let state = QuadrotorState::from_vector(&x);
            let sample = reference.sample(time);

            let control = self
                .controller
                .linearize(&state, &sample, gains)
                .map_err(|source| RolloutError::Control { step, time, source })?;

            // Loss gradient uses the sensitivity of the current state
            let error_x = control.errors.position;
            let dp_dtheta = self.sensitivity.current().fixed_rows::<3>(0);
            gradient += dp_dtheta.transpose() * error_x * 2.0;
            loss += error_x.norm_squared();
            if !loss.is_finite() {
                return Err(RolloutError::Divergence { step, value: loss });
            }

            let jacobians = StepJacobians::evaluate(&self.dynamics, &state, &control, dt);
            self.sensitivity
                .advance(&jacobians)
                .map_err(|source| RolloutError::Sensitivity { step, source })?;

            trace.record(step, time, &state, &sample, &control.errors);

            x = match self.dynamics.advance(&x, &control.input, time, dt, &self.integrator) {
                Ok(next) => next,
                Err(IntegrationError::NonFiniteState { .. }) => {
                    return Err(RolloutError::Divergence { step, value: f64::NAN });
                }
                Err(source) => return Err(RolloutError::Integration { step, source }),
            };
            if let Some(value) = x.iter().copied().find(|v| !v.is_finite()) {
                return Err(RolloutError::Divergence { step, value });
            }
        }

        let last = steps.saturating_sub(1);
        if let Some(value) = gradient.iter().copied().find(|g| !g.is_finite()) {
            return Err(RolloutError::Divergence { step: last, value });
        }

        let rmse = if steps == 0 {
            0.0
        } else {
            (loss / steps as f64).sqrt()
        };

        Ok(RolloutResult {
            loss,
            rmse,
            gradient,
            trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use difftune_core::control::{CircularOscillation, HoverReference};
    use difftune_core::math::AdaptiveOptions;
    use nalgebra::Vector3;

    fn runner(duration: f64, integrator: TruthIntegrator) -> RolloutRunner {
        let dt = 0.01;
        let initial = QuadrotorState {
            angular_velocity: Vector3::new(0.0, 0.0, 0.001),
            ..QuadrotorState::default()
        };
        RolloutRunner::new(
            QuadrotorParams::default(),
            initial,
            dt,
            (duration / dt).round() as usize,
            integrator,
        )
        .unwrap()
    }

    #[test]
    fn test_hover_at_rest_has_zero_loss() {
        let mut runner = RolloutRunner::new(
            QuadrotorParams::default(),
            QuadrotorState::default(),
            0.01,
            100,
            TruthIntegrator::Adaptive(AdaptiveOptions::default()),
        )
        .unwrap();
        let reference = HoverReference::new(Vector3::zeros(), Vector3::x());

        let result = runner.run(&reference, &ControllerGains::default()).unwrap();

        assert_relative_eq!(result.loss, 0.0, epsilon = 1e-20);
        assert_relative_eq!(result.rmse, 0.0, epsilon = 1e-10);
        assert_relative_eq!(result.gradient.norm(), 0.0, epsilon = 1e-12);
        assert_eq!(result.trace.len(), 100);
    }

    #[test]
    fn test_rmse_is_consistent_with_loss() {
        let mut runner = runner(1.0, TruthIntegrator::Rk4 { substeps: 4 });

        let result = runner
            .run(&CircularOscillation::default(), &ControllerGains::default())
            .unwrap();

        assert!(result.loss > 0.0);
        assert_relative_eq!(result.rmse, (result.loss / 100.0).sqrt(), epsilon = 1e-14);
        let from_trace: f64 = result.trace.position_errors.iter().map(|e| e.norm_squared()).sum();
        assert_relative_eq!(result.loss, from_trace, epsilon = 1e-12);
        assert_eq!(runner.sensitivity().position(), 100);
    }

    #[test]
    fn test_gradient_matches_finite_difference_on_discrete_model() {
        // With the discrete truth model the gradient is exact
        let reference = CircularOscillation::default();
        let gains = ControllerGains::default();
        let mut runner = runner(0.5, TruthIntegrator::Discrete);

        let gradient = runner.run(&reference, &gains).unwrap().gradient;

        let loss_at = |theta: &GainVector, runner: &mut RolloutRunner| {
            runner
                .run(&reference, &ControllerGains::from_vector(theta))
                .unwrap()
                .loss
        };
        let theta0 = gains.to_vector();
        let delta = 1e-4;
        for k in 0..theta0.len() {
            let mut plus = theta0;
            let mut minus = theta0;
            plus[k] += delta;
            minus[k] -= delta;
            let numeric = (loss_at(&plus, &mut runner) - loss_at(&minus, &mut runner)) / (2.0 * delta);
            assert_relative_eq!(gradient[k], numeric, epsilon = 1e-7, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_rollouts_are_repeatable() {
        let mut runner = runner(0.3, TruthIntegrator::Adaptive(AdaptiveOptions::default()));
        let reference = CircularOscillation::default();
        let gains = ControllerGains::default();

        let first = runner.run(&reference, &gains).unwrap();
        let second = runner.run(&reference, &gains).unwrap();

        assert_eq!(first.loss, second.loss);
        assert_eq!(first.gradient, second.gradient);
    }

    #[test]
    fn test_degenerate_heading_reports_step() {
        let mut runner = runner(0.1, TruthIntegrator::Discrete);
        let reference = HoverReference::new(Vector3::zeros(), Vector3::z());

        let error = runner.run(&reference, &ControllerGains::default()).unwrap_err();

        assert_eq!(error.step(), 0);
        assert!(matches!(
            error,
            RolloutError::Control {
                source: ControlError::DegenerateHeading(_),
                ..
            }
        ));
    }

    #[test]
    fn test_overflowing_loss_is_divergence() {
        // Far enough away that ‖e_x‖² overflows while the command stays finite
        let mut runner = RolloutRunner::new(
            QuadrotorParams::default(),
            QuadrotorState::default(),
            0.01,
            10,
            TruthIntegrator::Discrete,
        )
        .unwrap();
        let reference = HoverReference::new(Vector3::new(0.0, 2e154, 0.0), Vector3::x());
        let gains = ControllerGains::uniform(1e-3, 5.6, 8.81, 2.54);

        let error = runner.run(&reference, &gains).unwrap_err();

        match error {
            RolloutError::Divergence { step, value } => {
                assert_eq!(step, 0);
                assert!(value.is_infinite());
            }
            other => panic!("expected divergence, got {:?}", other),
        }
    }

    #[test]
    fn test_integrator_failure_reports_step() {
        let options = AdaptiveOptions {
            max_substeps: 0,
            ..AdaptiveOptions::default()
        };
        let mut runner = runner(0.1, TruthIntegrator::Adaptive(options));

        let error = runner
            .run(&CircularOscillation::default(), &ControllerGains::default())
            .unwrap_err();

        assert_eq!(error.step(), 0);
        assert!(matches!(
            error,
            RolloutError::Integration {
                step: 0,
                source: IntegrationError::MaxSubstepsExceeded { max_substeps: 0, .. },
            }
        ));
    }

    #[test]
    fn test_oversized_horizon_is_rejected() {
        let result = RolloutRunner::new(
            QuadrotorParams::default(),
            QuadrotorState::default(),
            0.01,
            usize::MAX,
            TruthIntegrator::Discrete,
        );

        assert!(matches!(result, Err(SensitivityError::HorizonTooLong { .. })));
    }
}
