//! Geometric tracking controller on SE(3)
//!
//! Composes [`position_control`] and [`attitude_control`]. The control law is
//! generic over the tangent algebra, so the same code yields the input
//! `h(X, θ)` and, evaluated on jets, its exact Jacobians `∂h/∂X` and `∂h/∂θ`.

use nalgebra::{SMatrix, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control::{attitude_control, position_control, ControllerGains, GainVars, ReferenceSample};
use crate::dynamics::{
    QuadrotorInput, QuadrotorParams, QuadrotorState, ANGULAR_VELOCITY_INDEX, POSITION_INDEX, ROTATION_INDEX,
    VELOCITY_INDEX,
};
use crate::math::{Real, Triad, Vector3Ops, VectorJet, VectorMathError, GAIN_OFFSET, JET_DIM};
use crate::{GainVector, GAIN_DIM, INPUT_DIM, STATE_DIM};

/// ∂h/∂X
pub type ControlStateJacobian = SMatrix<f64, INPUT_DIM, STATE_DIM>;

/// ∂h/∂θ
pub type ControlGainJacobian = SMatrix<f64, INPUT_DIM, GAIN_DIM>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("degenerate thrust direction: {0}")]
    DegenerateThrustDirection(VectorMathError),
    #[error("heading is parallel to the desired thrust axis: {0}")]
    DegenerateHeading(VectorMathError),
    #[error("non-finite command: thrust {thrust}, moment {moment:?}")]
    NonFiniteCommand { thrust: f64, moment: [f64; 3] },
}

/// Tracking errors of one control step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingErrors {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub attitude: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
}

/// State as seen by the control law
#[derive(Debug, Clone, Copy)]
pub struct StateVars<V> {
    pub position: V,
    pub velocity: V,
    pub angular_velocity: V,
    pub rotation: Triad<V>,
}

impl StateVars<Vector3<f64>> {
    pub fn from_state(state: &QuadrotorState) -> Self {
        Self {
            position: state.position,
            velocity: state.velocity,
            angular_velocity: state.angular_velocity,
            rotation: Triad::from_matrix(&state.rotation),
        }
    }
}

impl StateVars<VectorJet> {
    /// State as jet variables at their positions in the flattened state
    pub fn seeded(state: &QuadrotorState) -> Self {
        // Column j of R holds R₀ⱼ, R₁ⱼ, R₂ⱼ, stored row-major
        let column = |j: usize| {
            VectorJet::variable_at(
                state.rotation.column(j).into_owned(),
                [ROTATION_INDEX + j, ROTATION_INDEX + 3 + j, ROTATION_INDEX + 6 + j],
            )
        };
        Self {
            position: VectorJet::variable(state.position, POSITION_INDEX),
            velocity: VectorJet::variable(state.velocity, VELOCITY_INDEX),
            angular_velocity: VectorJet::variable(state.angular_velocity, ANGULAR_VELOCITY_INDEX),
            rotation: Triad::new(column(0), column(1), column(2)),
        }
    }
}

/// Output of [`geometric_control`]
#[derive(Debug, Clone, Copy)]
pub struct ControlOutput<V: Vector3Ops> {
    pub thrust: V::Scalar,
    pub moment: V,
    pub errors: TrackingErrors,
}

/// Position loop followed by attitude loop
///
/// # Errors
/// Propagates the position loop's normalization failures, and returns
/// [`ControlError::NonFiniteCommand`] rather than a NaN or infinite input.
pub fn geometric_control<V: Vector3Ops>(
    state: &StateVars<V>,
    reference: &ReferenceSample,
    gains: &GainVars<V>,
    params: &QuadrotorParams,
) -> Result<ControlOutput<V>, ControlError> {
    let command = position_control(state, reference, gains, params.mass, params.gravity)?;

    let attitude = attitude_control(
        &state.rotation,
        &state.angular_velocity,
        &command.rotation,
        &command.angular_velocity,
        &command.angular_acceleration,
        gains,
        params.inertia(),
    );

    let thrust = command.thrust.value();
    let moment = attitude.moment.value();
    if !thrust.is_finite() || !moment.iter().all(|m| m.is_finite()) {
        return Err(ControlError::NonFiniteCommand {
            thrust,
            moment: [moment.x, moment.y, moment.z],
        });
    }

    Ok(ControlOutput {
        thrust: command.thrust,
        moment: attitude.moment,
        errors: TrackingErrors {
            position: command.position_error.value(),
            velocity: command.velocity_error.value(),
            attitude: attitude.attitude_error.value(),
            angular_velocity: attitude.angular_velocity_error.value(),
        },
    })
}

/// Input and its Jacobians at one operating point
#[derive(Debug, Clone)]
pub struct ControlLinearization {
    pub input: QuadrotorInput,
    pub errors: TrackingErrors,
    pub dh_dx: ControlStateJacobian,
    pub dh_dtheta: ControlGainJacobian,
}

/// Geometric controller for a given vehicle
#[derive(Debug, Clone)]
pub struct GeometricController {
    pub params: QuadrotorParams,
}

impl GeometricController {
    pub fn new(params: QuadrotorParams) -> Self {
        Self { params }
    }

    /// Thrust and moment with the tracking errors of this step
    pub fn compute(
        &self,
        state: &QuadrotorState,
        reference: &ReferenceSample,
        gains: &ControllerGains,
    ) -> Result<(QuadrotorInput, TrackingErrors), ControlError> {
        let output = geometric_control(&StateVars::from_state(state), reference, &gains.lift(), &self.params)?;
        Ok((QuadrotorInput::new(output.thrust, output.moment), output.errors))
    }

    /// Same control law with the gains given as the flattened vector θ
    pub fn compute_with_parameters(
        &self,
        state: &QuadrotorState,
        reference: &ReferenceSample,
        theta: &GainVector,
    ) -> Result<QuadrotorInput, ControlError> {
        let (input, _) = self.compute(state, reference, &ControllerGains::from_vector(theta))?;
        Ok(input)
    }

    /// Input with `∂h/∂X` and `∂h/∂θ`
    ///
    /// Columns of `∂h/∂X` follow the flattened state layout, so the nine
    /// rotation entries are differentiated independently (not along SO(3)).
    pub fn linearize(
        &self,
        state: &QuadrotorState,
        reference: &ReferenceSample,
        gains: &ControllerGains,
    ) -> Result<ControlLinearization, ControlError> {
        let output = geometric_control(
            &StateVars::seeded(state),
            reference,
            &GainVars::seeded(gains),
            &self.params,
        )?;

        let mut jacobian = SMatrix::<f64, INPUT_DIM, JET_DIM>::zeros();
        jacobian.row_mut(0).copy_from(&output.thrust.gradient);
        jacobian
            .fixed_view_mut::<3, JET_DIM>(1, 0)
            .copy_from(&output.moment.jacobian);

        Ok(ControlLinearization {
            input: QuadrotorInput::new(output.thrust.value(), output.moment.value()),
            errors: output.errors,
            dh_dx: jacobian.fixed_view::<INPUT_DIM, STATE_DIM>(0, 0).into_owned(),
            dh_dtheta: jacobian.fixed_view::<INPUT_DIM, GAIN_DIM>(0, GAIN_OFFSET).into_owned(),
        })
    }
}
