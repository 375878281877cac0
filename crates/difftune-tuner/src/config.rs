//! Tuner configuration
//!
//! Configuration parameters for gain-tuning sessions. Every section has
//! defaults, so a JSON file only needs the values it changes.

use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use difftune_core::control::{CircularOscillation, ControllerGains};
use difftune_core::dynamics::{DynamicsError, QuadrotorParams, QuadrotorState, TruthIntegrator};
use difftune_core::math::{orthonormality_error, AdaptiveOptions};
use difftune_core::sensitivity::MAX_HORIZON;
use difftune_core::GRAVITY;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Invalid vehicle: {0}")]
    Vehicle(#[from] DynamicsError),
}

/// Main tuner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub simulation: SimulationConfig,
    pub vehicle: VehicleConfig,
    pub initial_state: InitialStateConfig,
    /// Gains at the start of the session
    pub gains: ControllerGains,
    pub learning: LearningConfig,
    pub reference: CircularOscillation,
}

/// Method used to advance the true state between control steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    /// Adaptive RKF7(8) on the continuous model
    #[default]
    Adaptive,
    /// Fixed-step RK4 on the continuous model
    Rk4,
    /// The discrete model used for the sensitivities
    Discrete,
}

/// Simulation timing and truth integrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Control period [s]
    pub dt: f64,
    /// Rollout length [s]
    pub duration: f64,
    pub integrator: IntegratorKind,
    /// Relative tolerance of the adaptive integrator
    pub rel_tol: f64,
    /// Absolute tolerance of the adaptive integrator
    pub abs_tol: f64,
    /// Substep budget of the adaptive integrator per control period
    pub max_substeps: usize,
    /// Substeps per control period for RK4
    pub rk4_substeps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let adaptive = AdaptiveOptions::default();
        Self {
            dt: 0.01,
            duration: 10.0,
            integrator: IntegratorKind::Adaptive,
            rel_tol: adaptive.rel_tol,
            abs_tol: adaptive.abs_tol,
            max_substeps: adaptive.max_substeps,
            rk4_substeps: 10,
        }
    }
}

impl SimulationConfig {
    /// Number of control steps N in one rollout
    pub fn step_count(&self) -> usize {
        (self.duration / self.dt).round() as usize
    }

    pub fn truth_integrator(&self) -> TruthIntegrator {
        match self.integrator {
            IntegratorKind::Adaptive => TruthIntegrator::Adaptive(AdaptiveOptions {
                rel_tol: self.rel_tol,
                abs_tol: self.abs_tol,
                max_substeps: self.max_substeps,
            }),
            IntegratorKind::Rk4 => TruthIntegrator::Rk4 {
                substeps: self.rk4_substeps,
            },
            IntegratorKind::Discrete => TruthIntegrator::Discrete,
        }
    }
}

/// Vehicle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Mass [kg]
    pub mass: f64,
    /// Inertia tensor rows [kg·m²]
    pub inertia: [[f64; 3]; 3],
    /// Gravity magnitude [m/s²]
    pub gravity: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            mass: 4.34,
            inertia: [[0.082, 0.0, 0.0], [0.0, 0.0845, 0.0], [0.0, 0.0, 0.1377]],
            gravity: GRAVITY,
        }
    }
}

impl VehicleConfig {
    pub fn to_params(&self) -> Result<QuadrotorParams, DynamicsError> {
        QuadrotorParams::new(self.mass, matrix_from_rows(&self.inertia), self.gravity)
    }
}

/// Rest state every rollout starts from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialStateConfig {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Body angular velocity [rad/s]
    pub angular_velocity: Vector3<f64>,
    /// Rotation rows (body to world)
    pub rotation: [[f64; 3]; 3],
}

impl Default for InitialStateConfig {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::new(0.0, 0.0, 0.001),
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl InitialStateConfig {
    pub fn to_state(&self) -> QuadrotorState {
        QuadrotorState {
            position: self.position,
            velocity: self.velocity,
            angular_velocity: self.angular_velocity,
            rotation: matrix_from_rows(&self.rotation),
        }
    }
}

/// Gradient descent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub learning_rate: f64,
    /// Lower bound applied to every gain component after each update
    pub gain_floor: f64,
    /// Number of outer iterations
    pub iterations: usize,
    /// Stop early once the gradient norm drops below this
    pub gradient_tolerance: Option<f64>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            gain_floor: 0.5,
            iterations: 10,
            gradient_tolerance: None,
        }
    }
}

fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| rows[i][j])
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}

fn require_finite(field: &'static str, values: &[f64]) -> Result<(), ConfigError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "contains non-finite values".to_string(),
        })
    }
}

impl TunerConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check every value the session depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        require_positive("simulation.dt", sim.dt)?;
        require_positive("simulation.duration", sim.duration)?;
        if sim.step_count() == 0 {
            return Err(ConfigError::Invalid {
                field: "simulation.duration",
                reason: format!("shorter than one step of {} s", sim.dt),
            });
        }
        if sim.step_count() > MAX_HORIZON {
            return Err(ConfigError::Invalid {
                field: "simulation.duration",
                reason: format!("more than {} steps of {} s", MAX_HORIZON, sim.dt),
            });
        }
        if sim.integrator == IntegratorKind::Adaptive {
            require_positive("simulation.rel_tol", sim.rel_tol)?;
            require_positive("simulation.abs_tol", sim.abs_tol)?;
            if sim.max_substeps == 0 {
                return Err(ConfigError::Invalid {
                    field: "simulation.max_substeps",
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if sim.integrator == IntegratorKind::Rk4 && sim.rk4_substeps == 0 {
            return Err(ConfigError::Invalid {
                field: "simulation.rk4_substeps",
                reason: "must be at least 1".to_string(),
            });
        }

        require_positive("vehicle.gravity", self.vehicle.gravity)?;
        self.vehicle.to_params()?;

        let init = &self.initial_state;
        require_finite("initial_state.position", init.position.as_slice())?;
        require_finite("initial_state.velocity", init.velocity.as_slice())?;
        require_finite("initial_state.angular_velocity", init.angular_velocity.as_slice())?;
        let rotation = matrix_from_rows(&init.rotation);
        require_finite("initial_state.rotation", rotation.as_slice())?;
        if orthonormality_error(&rotation) > 1e-6 || rotation.determinant() < 0.0 {
            return Err(ConfigError::Invalid {
                field: "initial_state.rotation",
                reason: "not a rotation matrix".to_string(),
            });
        }

        require_finite("gains", self.gains.to_vector().as_slice())?;

        let learning = &self.learning;
        require_positive("learning.learning_rate", learning.learning_rate)?;
        require_positive("learning.gain_floor", learning.gain_floor)?;
        if learning.iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "learning.iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(tolerance) = learning.gradient_tolerance {
            require_positive("learning.gradient_tolerance", tolerance)?;
        }

        let reference = &self.reference;
        require_finite(
            "reference",
            &[reference.radius, reference.angular_rate, reference.vertical_amplitude],
        )?;
        require_finite("reference.heading", reference.heading.as_slice())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_match_reference_scenario() {
        let config = TunerConfig::default();

        assert_eq!(config.simulation.step_count(), 1000);
        assert_eq!(config.vehicle.mass, 4.34);
        assert_eq!(config.gains, ControllerGains::uniform(16.0, 5.6, 8.81, 2.54));
        assert_eq!(config.learning.learning_rate, 0.001);
        assert_eq!(config.learning.gain_floor, 0.5);
        assert_eq!(config.learning.iterations, 10);
        assert_eq!(config.initial_state.angular_velocity, Vector3::new(0.0, 0.0, 0.001));
        assert!(config.validate().is_ok());

        let params = config.vehicle.to_params().unwrap();
        assert_relative_eq!(params.inertia()[(2, 2)], 0.1377);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = TunerConfig::from_json_str(
            r#"{
                "simulation": { "duration": 2.0, "integrator": "rk4" },
                "learning": { "iterations": 3, "gradient_tolerance": 1e-3 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.simulation.step_count(), 200);
        assert_eq!(config.simulation.integrator, IntegratorKind::Rk4);
        assert_eq!(config.simulation.dt, 0.01);
        assert_eq!(config.learning.iterations, 3);
        assert_eq!(config.learning.gradient_tolerance, Some(1e-3));
        assert_eq!(config.vehicle.gravity, GRAVITY);
        assert!(matches!(
            config.simulation.truth_integrator(),
            TruthIntegrator::Rk4 { substeps: 10 }
        ));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let result = TunerConfig::from_json_str(r#"{ "learning": { "iterations": "many" } }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = TunerConfig::from_json_file("/nonexistent/difftune.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TunerConfig::default();
        config.simulation.dt = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "simulation.dt", .. })
        ));

        let mut config = TunerConfig::default();
        config.learning.iterations = 0;
        assert!(config.validate().is_err());

        let mut config = TunerConfig::default();
        config.learning.gain_floor = -0.5;
        assert!(config.validate().is_err());

        let mut config = TunerConfig::default();
        config.vehicle.inertia[1][1] = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Vehicle(DynamicsError::SingularInertia))
        ));

        let mut config = TunerConfig::default();
        config.initial_state.rotation[0][0] = 2.0;
        assert!(config.validate().is_err());

        let mut config = TunerConfig::default();
        config.gains.velocity.x = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_rollout_length() {
        let mut config = TunerConfig::default();
        config.simulation.duration = 1e30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "simulation.duration", .. })
        ));

        let mut config = TunerConfig::default();
        config.simulation.duration = config.simulation.dt * (MAX_HORIZON + 1) as f64;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "simulation.duration", .. })
        ));

        let mut config = TunerConfig::default();
        config.simulation.max_substeps = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "simulation.max_substeps", .. })
        ));
    }

    #[test]
    fn test_serialized_defaults_round_trip() {
        let config = TunerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = TunerConfig::from_json_str(&json).unwrap();

        assert_eq!(parsed.gains, config.gains);
        assert_eq!(parsed.simulation.integrator, IntegratorKind::Adaptive);
        assert_eq!(parsed.initial_state.to_state(), config.initial_state.to_state());
    }
}
