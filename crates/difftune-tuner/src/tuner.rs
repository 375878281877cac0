//! Gain adaptation loop
//!
//! Each outer iteration restarts the vehicle from rest, runs one rollout with
//! the current gains, then applies a projected gradient step
//!
//! ```text
//! θ ← max(θ − η ∇θ L, θ_min)   (element-wise)
//! ```
//!
//! Gains only change between rollouts. A failed rollout ends the session
//! with the gains and history gathered so far.

use log::{debug, error, info, warn};
use thiserror::Error;

use difftune_core::control::{CircularOscillation, ControllerGains, ReferenceTrajectory};
use difftune_core::dynamics::DynamicsError;
use difftune_core::sensitivity::SensitivityError;

use crate::config::{ConfigError, LearningConfig, TunerConfig};
use crate::report::{RolloutTrace, TuningHistory};
use crate::rollout::{RolloutError, RolloutRunner};

/// Session setup errors
#[derive(Debug, Error)]
pub enum TunerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Dynamics error: {0}")]
    Dynamics(#[from] DynamicsError),
    #[error("Sensitivity error: {0}")]
    Sensitivity(#[from] SensitivityError),
}

/// Summary of one outer iteration
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// 1-based iteration index
    pub iteration: usize,
    pub loss: f64,
    pub rmse: f64,
    pub gradient_norm: f64,
    /// Gains after the update
    pub gains: ControllerGains,
    /// Components raised to the floor by the projection
    pub clamped: usize,
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Ran the configured number of iterations
    IterationLimit,
    /// Gradient norm fell below the configured tolerance
    Converged { iteration: usize },
    /// A rollout failed; gains are those before the failed iteration
    Failed { iteration: usize, error: RolloutError },
}

/// Result of [`GainTuner::run`]
#[derive(Debug, Clone)]
pub struct TuningOutcome {
    pub history: TuningHistory,
    pub gains: ControllerGains,
    /// Trace of the last successful rollout
    pub last_trace: Option<RolloutTrace>,
    pub termination: Termination,
}

/// DiffTune gain tuner
#[derive(Debug, Clone)]
pub struct GainTuner<T: ReferenceTrajectory> {
    learning: LearningConfig,
    runner: RolloutRunner,
    reference: T,
    gains: ControllerGains,
    history: TuningHistory,
    last_trace: Option<RolloutTrace>,
}

impl GainTuner<CircularOscillation> {
    /// Tuner for the configured circular reference
    pub fn from_config(config: &TunerConfig) -> Result<Self, TunerError> {
        Self::new(config, config.reference)
    }
}

impl<T: ReferenceTrajectory> GainTuner<T> {
    pub fn new(config: &TunerConfig, reference: T) -> Result<Self, TunerError> {
        config.validate()?;
        let params = config.vehicle.to_params()?;
        let sim = &config.simulation;

        let runner = RolloutRunner::new(
            params,
            config.initial_state.to_state(),
            sim.dt,
            sim.step_count(),
            sim.truth_integrator(),
        )?;

        Ok(Self {
            learning: config.learning.clone(),
            runner,
            reference,
            gains: config.gains,
            history: TuningHistory::new(config.gains, config.learning.iterations),
            last_trace: None,
        })
    }

    pub fn gains(&self) -> &ControllerGains {
        &self.gains
    }

    pub fn history(&self) -> &TuningHistory {
        &self.history
    }

    pub fn last_trace(&self) -> Option<&RolloutTrace> {
        self.last_trace.as_ref()
    }

    /// One rollout followed by one projected gradient step
    ///
    /// On error the gains and history are left untouched.
    pub fn run_iteration(&mut self) -> Result<IterationReport, RolloutError> {
        let iteration = self.history.iterations() + 1;
        let result = self.runner.run(&self.reference, &self.gains)?;
        let gradient_norm = result.gradient.norm();

        self.gains.descend(&result.gradient, self.learning.learning_rate);
        let clamped = self.gains.project(self.learning.gain_floor);
        if clamped > 0 {
            warn!(
                "Iteration {}: projection raised {} gain component(s) to {}",
                iteration, clamped, self.learning.gain_floor
            );
        }
        debug!("Iteration {}: gains {:?}", iteration, self.gains.to_vector().as_slice());

        info!(
            "Iteration {}: loss = {:.6}, RMSE = {:.6} m, |grad| = {:.6}",
            iteration, result.loss, result.rmse, gradient_norm
        );

        self.history
            .record(result.loss, result.rmse, gradient_norm, self.gains);
        self.last_trace = Some(result.trace);

        Ok(IterationReport {
            iteration,
            loss: result.loss,
            rmse: result.rmse,
            gradient_norm,
            gains: self.gains,
            clamped,
        })
    }

    /// Run until the iteration limit, convergence, or a failed rollout
    pub fn run(mut self) -> TuningOutcome {
        let mut termination = Termination::IterationLimit;

        while self.history.iterations() < self.learning.iterations {
            match self.run_iteration() {
                Ok(report) => {
                    if let Some(tolerance) = self.learning.gradient_tolerance {
                        if report.gradient_norm < tolerance {
                            info!(
                                "Converged at iteration {}: |grad| = {:.3e} < {:.3e}",
                                report.iteration, report.gradient_norm, tolerance
                            );
                            termination = Termination::Converged {
                                iteration: report.iteration,
                            };
                            break;
                        }
                    }
                }
                Err(err) => {
                    let iteration = self.history.iterations() + 1;
                    error!("Iteration {} failed: {}", iteration, err);
                    termination = Termination::Failed { iteration, error: err };
                    break;
                }
            }
        }

        TuningOutcome {
            history: self.history,
            gains: self.gains,
            last_trace: self.last_trace,
            termination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegratorKind;
    use approx::assert_relative_eq;
    use difftune_core::control::ReferenceSample;
    use nalgebra::Vector3;

    fn short_config(iterations: usize) -> TunerConfig {
        let mut config = TunerConfig::default();
        config.simulation.duration = 0.5;
        config.simulation.integrator = IntegratorKind::Rk4;
        config.learning.iterations = iterations;
        config
    }

    #[test]
    fn test_history_lengths() {
        let _ = env_logger::builder().is_test(true).try_init();
        let tuner = GainTuner::from_config(&short_config(3)).unwrap();

        let outcome = tuner.run();

        assert_eq!(outcome.termination, Termination::IterationLimit);
        assert_eq!(outcome.history.losses.len(), 3);
        assert_eq!(outcome.history.rmse.len(), 3);
        assert_eq!(outcome.history.gains.len(), 4);
        assert_eq!(outcome.history.gains[0], ControllerGains::default());
        assert_eq!(outcome.history.latest_gains(), Some(&outcome.gains));
        assert_eq!(outcome.last_trace.map(|t| t.len()), Some(50));
    }

    #[test]
    fn test_update_is_gradient_step() {
        let config = short_config(1);
        let mut tuner = GainTuner::from_config(&config).unwrap();
        let before = tuner.gains().to_vector();

        let report = tuner.run_iteration().unwrap();

        // Default gains are far above the floor; no clamping for a small step
        assert_eq!(report.clamped, 0);
        let step = (before - tuner.gains().to_vector()).norm();
        assert_relative_eq!(step, config.learning.learning_rate * report.gradient_norm, max_relative = 1e-9);
    }

    #[test]
    fn test_projection_holds_floor() {
        let mut config = short_config(2);
        config.learning.learning_rate = 1e3;
        let outcome = GainTuner::from_config(&config).unwrap().run();

        for gains in &outcome.history.gains {
            assert!(gains.min_component() >= config.learning.gain_floor);
        }
    }

    #[test]
    fn test_gradient_tolerance_stops_early() {
        let mut config = short_config(5);
        config.learning.gradient_tolerance = Some(1e12);

        let outcome = GainTuner::from_config(&config).unwrap().run();

        assert_eq!(outcome.termination, Termination::Converged { iteration: 1 });
        assert_eq!(outcome.history.iterations(), 1);
    }

    #[test]
    fn test_failure_keeps_gains() {
        let config = short_config(3);
        let reference = |t: f64| {
            // Heading swings onto the thrust axis after a few steps
            let heading = if t > 0.2 { Vector3::z() } else { Vector3::x() };
            ReferenceSample::hover(Vector3::zeros(), heading)
        };
        let mut tuner = GainTuner::new(&config, reference).unwrap();
        let initial = *tuner.gains();

        let error = tuner.run_iteration().unwrap_err();

        assert!(error.step() > 0);
        assert_eq!(*tuner.gains(), initial);
        assert_eq!(tuner.history().iterations(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = TunerConfig::default();
        config.simulation.dt = -1.0;

        assert!(matches!(
            GainTuner::from_config(&config),
            Err(TunerError::Config(ConfigError::Invalid { .. }))
        ));
    }
}
