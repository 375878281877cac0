//! Forward sensitivity of the closed loop with respect to controller gains
//!
//! With the discrete model `X⁺ = f(X, u)` and the controller `u = h(X, θ)`,
//! the total derivatives obey
//!
//! ```text
//! dX/dθ(t+1) = (∂f/∂X + ∂f/∂u · ∂h/∂X) · dX/dθ(t) + ∂f/∂u · ∂h/∂θ
//! du/dθ(t)   = ∂h/∂X · dX/dθ(t) + ∂h/∂θ
//! ```
//!
//! Each step needs only the previous sensitivity and the Jacobians at the
//! current operating point.

use thiserror::Error;

use crate::control::{ControlGainJacobian, ControlLinearization, ControlStateJacobian};
use crate::dynamics::{InputJacobian, QuadrotorDynamics, QuadrotorState, StateJacobian};
use crate::{InputSensitivity, StateSensitivity};

/// Longest rollout the sensitivity history can be sized for
///
/// One state sensitivity is 18×12 doubles, so this bounds the history at
/// about 1.7 GB.
pub const MAX_HORIZON: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensitivityError {
    #[error("sensitivity horizon of {steps} steps exhausted")]
    HorizonExceeded { steps: usize },
    #[error("horizon of {steps} steps exceeds the limit of {max} steps")]
    HorizonTooLong { steps: usize, max: usize },
}

/// The four Jacobian blocks at one operating point
#[derive(Debug, Clone)]
pub struct StepJacobians {
    pub df_dx: StateJacobian,
    pub df_du: InputJacobian,
    pub dh_dx: ControlStateJacobian,
    pub dh_dtheta: ControlGainJacobian,
}

impl StepJacobians {
    /// Combine the controller linearization with the discrete-model
    /// Jacobians at the same state and input
    pub fn evaluate(
        dynamics: &QuadrotorDynamics,
        state: &QuadrotorState,
        control: &ControlLinearization,
        dt: f64,
    ) -> Self {
        let (df_dx, df_du) = dynamics.discrete_jacobians(state, &control.input, dt);
        Self {
            df_dx,
            df_du,
            dh_dx: control.dh_dx,
            dh_dtheta: control.dh_dtheta,
        }
    }

    /// One step of the recursion
    ///
    /// # Returns
    /// (dX/dθ at t+1, du/dθ at t)
    pub fn propagate(&self, dx_dtheta: &StateSensitivity) -> (StateSensitivity, InputSensitivity) {
        let du_dtheta = self.dh_dx * dx_dtheta + self.dh_dtheta;
        let next = self.df_dx * dx_dtheta + self.df_du * du_dtheta;
        (next, du_dtheta)
    }
}

/// Sensitivity history over a rollout of fixed length
///
/// Holds `steps + 1` state sensitivities (the first is zero, the initial
/// state does not depend on the gains) and `steps` input sensitivities.
#[derive(Debug, Clone)]
pub struct SensitivityPropagator {
    state: Vec<StateSensitivity>,
    input: Vec<InputSensitivity>,
    step: usize,
}

impl SensitivityPropagator {
    /// History for `steps` control steps
    ///
    /// # Errors
    /// [`SensitivityError::HorizonTooLong`] above [`MAX_HORIZON`].
    pub fn new(steps: usize) -> Result<Self, SensitivityError> {
        let too_long = SensitivityError::HorizonTooLong {
            steps,
            max: MAX_HORIZON,
        };
        if steps > MAX_HORIZON {
            return Err(too_long);
        }
        let states = steps.checked_add(1).ok_or(too_long)?;

        Ok(Self {
            state: vec![StateSensitivity::zeros(); states],
            input: vec![InputSensitivity::zeros(); steps],
            step: 0,
        })
    }

    /// Zero all entries and rewind to step 0
    pub fn reset(&mut self) {
        self.state.fill(StateSensitivity::zeros());
        self.input.fill(InputSensitivity::zeros());
        self.step = 0;
    }

    /// Number of steps the history was sized for
    pub fn steps(&self) -> usize {
        self.input.len()
    }

    /// Steps advanced since the last reset
    pub fn position(&self) -> usize {
        self.step
    }

    /// dX/dθ of the current state
    pub fn current(&self) -> &StateSensitivity {
        &self.state[self.step]
    }

    /// Apply one step of the recursion and move to the next state
    pub fn advance(&mut self, jacobians: &StepJacobians) -> Result<&InputSensitivity, SensitivityError> {
        let i = self.step;
        if i >= self.input.len() {
            return Err(SensitivityError::HorizonExceeded { steps: self.input.len() });
        }

        let (next, du_dtheta) = jacobians.propagate(&self.state[i]);
        self.state[i + 1] = next;
        self.input[i] = du_dtheta;
        self.step = i + 1;
        Ok(&self.input[i])
    }

    pub fn state_sensitivity(&self, i: usize) -> Option<&StateSensitivity> {
        self.state.get(i)
    }

    pub fn input_sensitivity(&self, i: usize) -> Option<&InputSensitivity> {
        self.input.get(i)
    }
}
