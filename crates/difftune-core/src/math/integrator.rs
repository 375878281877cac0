//! Numerical integration methods
//!
//! Fixed-step Runge-Kutta 4th order (RK4), and an adaptive
//! Runge-Kutta-Fehlberg 7(8) driver around [`rkf78`] used to advance the
//! continuous-time dynamics across one control interval.

use log::trace;
use nalgebra::SVector;
use rkf78::{OdeSystem, Rkf78, Tolerances};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integration failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("adaptive solver failed on [{start}, {target}]: {reason}")]
    Solver { start: f64, target: f64, reason: String },
    #[error("solver stopped at t = {reached} before reaching t = {target}")]
    Incomplete { reached: f64, target: f64 },
    #[error("used {attempted} substeps (limit {max_substeps}) before reaching t = {target}")]
    MaxSubstepsExceeded {
        target: f64,
        attempted: usize,
        max_substeps: usize,
    },
    #[error("non-finite state at t = {time}")]
    NonFiniteState { time: f64 },
}

/// Error control settings for [`integrate_adaptive`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveOptions {
    /// Relative tolerance per component
    pub rel_tol: f64,
    /// Absolute tolerance per component
    pub abs_tol: f64,
    /// Accepted plus rejected substeps allowed per call
    pub max_substeps: usize,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            rel_tol: 1e-8,
            abs_tol: 1e-10,
            max_substeps: 10_000,
        }
    }
}

/// Generic RK4 integrator for any state vector
///
/// Solves dx/dt = f(t, x) using 4th-order Runge-Kutta method.
///
/// # Arguments
/// * `x` - Current state
/// * `t` - Current time
/// * `dt` - Time step
/// * `f` - Derivative function f(t, x) -> dx/dt
///
/// # Returns
/// New state after integration
pub fn rk4<const N: usize, F>(
    x: &SVector<f64, N>,
    t: f64,
    dt: f64,
    f: F,
) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + k1 * dt / 2.0));
    let k3 = f(t + dt / 2.0, &(x + k2 * dt / 2.0));
    let k4 = f(t + dt, &(x + k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// Integrate `system` from `t0` to `t1` with RKF7(8) error control
///
/// The first trial step spans the whole interval; the solver shrinks it as
/// the error estimate requires.
///
/// # Errors
/// Fails instead of returning a state that did not meet the tolerance: when
/// the solver gives up, when more than `max_substeps` substeps were needed,
/// or when the final state is not finite.
pub fn integrate_adaptive<S, const N: usize>(
    system: &S,
    x0: &SVector<f64, N>,
    t0: f64,
    t1: f64,
    options: &AdaptiveOptions,
) -> Result<SVector<f64, N>, IntegrationError>
where
    S: OdeSystem<N>,
{
    if t1 <= t0 {
        return Ok(*x0);
    }

    let tolerances = Tolerances::with_components([options.abs_tol; N], [options.rel_tol; N]);
    let mut solver = Rkf78::new(tolerances);
    let mut y0 = [0.0; N];
    y0.copy_from_slice(x0.as_slice());

    let (reached, y) = solver
        .integrate(system, t0, &y0, t1, t1 - t0)
        .map_err(|err| IntegrationError::Solver {
            start: t0,
            target: t1,
            reason: format!("{:?}", err),
        })?;

    let attempted = (solver.stats.accepted_steps + solver.stats.rejected_steps) as usize;
    trace!(
        "RKF78 [{:.4}, {:.4}]: {} accepted, {} rejected",
        t0,
        t1,
        solver.stats.accepted_steps,
        solver.stats.rejected_steps
    );
    if attempted > options.max_substeps {
        return Err(IntegrationError::MaxSubstepsExceeded {
            target: t1,
            attempted,
            max_substeps: options.max_substeps,
        });
    }
    if (t1 - reached).abs() > 1e-9 * (t1 - t0) {
        return Err(IntegrationError::Incomplete { reached, target: t1 });
    }

    let x = SVector::<f64, N>::from_column_slice(&y);
    if !x.iter().all(|v| v.is_finite()) {
        return Err(IntegrationError::NonFiniteState { time: reached });
    }
    Ok(x)
}
