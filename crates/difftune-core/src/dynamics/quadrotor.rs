//! Quadrotor rigid-body dynamics
//!
//! Continuous-time model in a z-down world frame:
//!
//! ẋ = v
//! v̇ = g e₃ − f/m · R e₃
//! J ω̇ = −ω × J ω + M
//! Ṙ = R [ω]×
//!
//! where:
//! - x, v: position and velocity (world frame)
//! - ω: angular velocity (body frame)
//! - R: rotation from body to world
//! - f: total thrust, M: body moment
//!
//! The discrete model advances x, v, ω by one explicit Euler step and the
//! attitude by `R⁺ = R · exp(dt [ω]×)`, which stays on SO(3) without
//! renormalization. The sensitivity recursion linearizes this discrete model.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use rkf78::OdeSystem;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{integrate_adaptive, rk4, so3_exp, so3_exp_derivatives, wedge, AdaptiveOptions, IntegrationError};
use crate::{e3, StateVector, GRAVITY, INPUT_DIM, STATE_DIM};

/// Index of the first position component in the flattened state
pub const POSITION_INDEX: usize = 0;
/// Index of the first velocity component in the flattened state
pub const VELOCITY_INDEX: usize = 3;
/// Index of the first angular velocity component in the flattened state
pub const ANGULAR_VELOCITY_INDEX: usize = 6;
/// Index of `R₀₀`; `Rᵢⱼ` sits at `ROTATION_INDEX + 3i + j`
pub const ROTATION_INDEX: usize = 9;

/// Flattened control input `[f, M]`
pub type InputVector = SVector<f64, INPUT_DIM>;

/// ∂f/∂X of the discrete step
pub type StateJacobian = SMatrix<f64, STATE_DIM, STATE_DIM>;

/// ∂f/∂u of the discrete step
pub type InputJacobian = SMatrix<f64, STATE_DIM, INPUT_DIM>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicsError {
    #[error("inertia matrix is singular or not finite")]
    SingularInertia,
    #[error("mass must be positive and finite, got {mass}")]
    InvalidMass { mass: f64 },
}

/// Quadrotor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrotorState {
    /// Position [m] (world frame)
    pub position: Vector3<f64>,
    /// Velocity [m/s] (world frame)
    pub velocity: Vector3<f64>,
    /// Angular velocity [rad/s] (body frame)
    pub angular_velocity: Vector3<f64>,
    /// Rotation from body to world
    pub rotation: Matrix3<f64>,
}

impl Default for QuadrotorState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            rotation: Matrix3::identity(),
        }
    }
}

impl QuadrotorState {
    /// Flatten to `[x, v, ω, R₀₀, R₀₁, ..., R₂₂]`
    pub fn to_vector(&self) -> StateVector {
        let mut x = StateVector::zeros();
        x.fixed_rows_mut::<3>(POSITION_INDEX).copy_from(&self.position);
        x.fixed_rows_mut::<3>(VELOCITY_INDEX).copy_from(&self.velocity);
        x.fixed_rows_mut::<3>(ANGULAR_VELOCITY_INDEX).copy_from(&self.angular_velocity);
        for i in 0..3 {
            for j in 0..3 {
                x[ROTATION_INDEX + 3 * i + j] = self.rotation[(i, j)];
            }
        }
        x
    }

    /// Inverse of [`QuadrotorState::to_vector`]
    pub fn from_vector(x: &StateVector) -> Self {
        Self {
            position: x.fixed_rows::<3>(POSITION_INDEX).into_owned(),
            velocity: x.fixed_rows::<3>(VELOCITY_INDEX).into_owned(),
            angular_velocity: x.fixed_rows::<3>(ANGULAR_VELOCITY_INDEX).into_owned(),
            rotation: Matrix3::from_fn(|i, j| x[ROTATION_INDEX + 3 * i + j]),
        }
    }

    /// Thrust axis `R e₃` in the world frame
    pub fn body_z(&self) -> Vector3<f64> {
        self.rotation.column(2).into_owned()
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

/// Quadrotor parameters
///
/// The inertia and its inverse are only set together, through
/// [`QuadrotorParams::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuadrotorParams {
    /// Mass [kg]
    pub mass: f64,
    /// Inertia tensor [kg·m²] (body frame)
    inertia: Matrix3<f64>,
    inertia_inv: Matrix3<f64>,
    /// Gravity magnitude [m/s²]
    pub gravity: f64,
}

impl QuadrotorParams {
    /// Validate and precompute the inverse inertia
    pub fn new(mass: f64, inertia: Matrix3<f64>, gravity: f64) -> Result<Self, DynamicsError> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(DynamicsError::InvalidMass { mass });
        }
        if !inertia.iter().all(|v| v.is_finite()) {
            return Err(DynamicsError::SingularInertia);
        }
        let inertia_inv = inertia.try_inverse().ok_or(DynamicsError::SingularInertia)?;
        if !inertia_inv.iter().all(|v| v.is_finite()) {
            return Err(DynamicsError::SingularInertia);
        }

        Ok(Self {
            mass,
            inertia,
            inertia_inv,
            gravity,
        })
    }

    /// Create parameters with diagonal inertia
    pub fn diagonal(mass: f64, inertia_diag: Vector3<f64>, gravity: f64) -> Result<Self, DynamicsError> {
        Self::new(mass, Matrix3::from_diagonal(&inertia_diag), gravity)
    }

    /// Inertia tensor [kg·m²] (body frame)
    pub fn inertia(&self) -> &Matrix3<f64> {
        &self.inertia
    }

    pub fn inertia_inv(&self) -> &Matrix3<f64> {
        &self.inertia_inv
    }

    /// Hover thrust for this quadrotor
    pub fn hover_thrust(&self) -> f64 {
        self.mass * self.gravity
    }
}

impl Default for QuadrotorParams {
    fn default() -> Self {
        let inertia_diag = Vector3::new(0.082, 0.0845, 0.1377);
        Self {
            mass: 4.34,
            inertia: Matrix3::from_diagonal(&inertia_diag),
            inertia_inv: Matrix3::from_diagonal(&inertia_diag.map(|j| 1.0 / j)),
            gravity: GRAVITY,
        }
    }
}

/// Quadrotor control input
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuadrotorInput {
    /// Total thrust [N]
    pub thrust: f64,
    /// Body moment [N·m]
    pub moment: Vector3<f64>,
}

impl QuadrotorInput {
    pub fn new(thrust: f64, moment: Vector3<f64>) -> Self {
        Self { thrust, moment }
    }

    /// Create hover input for given parameters
    pub fn hover(params: &QuadrotorParams) -> Self {
        Self {
            thrust: params.hover_thrust(),
            moment: Vector3::zeros(),
        }
    }

    pub fn to_vector(&self) -> InputVector {
        InputVector::new(self.thrust, self.moment.x, self.moment.y, self.moment.z)
    }

    pub fn from_vector(u: &InputVector) -> Self {
        Self {
            thrust: u[0],
            moment: Vector3::new(u[1], u[2], u[3]),
        }
    }
}

/// How the true state is advanced over one control interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TruthIntegrator {
    /// Embedded RKF7(8) with error control over the interval
    Adaptive(AdaptiveOptions),
    /// Fixed-step RK4 with the given number of substeps
    Rk4 { substeps: usize },
    /// The same discrete model the sensitivities linearize
    Discrete,
}

/// Continuous dynamics with the input held over one control interval
pub struct HeldInput<'a> {
    pub dynamics: &'a QuadrotorDynamics,
    pub input: &'a QuadrotorInput,
}

impl OdeSystem<STATE_DIM> for HeldInput<'_> {
    fn rhs(&self, _t: f64, y: &[f64; STATE_DIM], dydt: &mut [f64; STATE_DIM]) {
        let derivative = self
            .dynamics
            .continuous_derivative(&StateVector::from_column_slice(y), self.input);
        dydt.copy_from_slice(derivative.as_slice());
    }
}

/// Quadrotor dynamics model
#[derive(Debug, Clone)]
pub struct QuadrotorDynamics {
    pub params: QuadrotorParams,
}

impl QuadrotorDynamics {
    pub fn new(params: QuadrotorParams) -> Self {
        Self { params }
    }

    /// Translational acceleration `g e₃ − f/m · R e₃`
    pub fn acceleration(&self, rotation: &Matrix3<f64>, thrust: f64) -> Vector3<f64> {
        let body_z: Vector3<f64> = rotation.column(2).into_owned();
        e3() * self.params.gravity - body_z * (thrust / self.params.mass)
    }

    /// Angular acceleration from Euler's equation
    ///
    /// ω̇ = J⁻¹ (−ω × Jω + M)
    pub fn angular_acceleration(&self, omega: &Vector3<f64>, moment: &Vector3<f64>) -> Vector3<f64> {
        let j = &self.params.inertia;
        self.params.inertia_inv * (-omega.cross(&(j * omega)) + moment)
    }

    /// Continuous-time state derivative
    pub fn state_derivative(&self, state: &QuadrotorState, input: &QuadrotorInput) -> QuadrotorState {
        QuadrotorState {
            position: state.velocity,
            velocity: self.acceleration(&state.rotation, input.thrust),
            angular_velocity: self.angular_acceleration(&state.angular_velocity, &input.moment),
            rotation: state.rotation * wedge(&state.angular_velocity),
        }
    }

    /// [`QuadrotorDynamics::state_derivative`] on the flattened state
    pub fn continuous_derivative(&self, x: &StateVector, input: &QuadrotorInput) -> StateVector {
        self.state_derivative(&QuadrotorState::from_vector(x), input).to_vector()
    }

    /// One step of the discrete model
    pub fn discrete_step(&self, state: &QuadrotorState, input: &QuadrotorInput, dt: f64) -> QuadrotorState {
        QuadrotorState {
            position: state.position + state.velocity * dt,
            velocity: state.velocity + self.acceleration(&state.rotation, input.thrust) * dt,
            angular_velocity: state.angular_velocity
                + self.angular_acceleration(&state.angular_velocity, &input.moment) * dt,
            rotation: state.rotation * so3_exp(&(state.angular_velocity * dt)),
        }
    }

    /// Jacobians `(∂f/∂X, ∂f/∂u)` of [`QuadrotorDynamics::discrete_step`]
    /// in the flattened layout
    pub fn discrete_jacobians(
        &self,
        state: &QuadrotorState,
        input: &QuadrotorInput,
        dt: f64,
    ) -> (StateJacobian, InputJacobian) {
        let QuadrotorParams {
            mass,
            inertia: j,
            inertia_inv: j_inv,
            ..
        } = self.params;
        let omega = state.angular_velocity;
        let r = state.rotation;
        let identity = Matrix3::<f64>::identity();

        let mut df_dx = StateJacobian::zeros();
        let mut df_du = InputJacobian::zeros();

        // x⁺ = x + dt v
        df_dx
            .fixed_view_mut::<3, 3>(POSITION_INDEX, POSITION_INDEX)
            .copy_from(&identity);
        df_dx
            .fixed_view_mut::<3, 3>(POSITION_INDEX, VELOCITY_INDEX)
            .copy_from(&(identity * dt));

        // v⁺ = v + dt (g e₃ − f/m R e₃)
        df_dx
            .fixed_view_mut::<3, 3>(VELOCITY_INDEX, VELOCITY_INDEX)
            .copy_from(&identity);
        for i in 0..3 {
            df_dx[(VELOCITY_INDEX + i, ROTATION_INDEX + 3 * i + 2)] = -dt * input.thrust / mass;
        }
        df_du
            .fixed_view_mut::<3, 1>(VELOCITY_INDEX, 0)
            .copy_from(&(state.body_z() * (-dt / mass)));

        // ω⁺ = ω + dt J⁻¹ (−ω × Jω + M)
        let gyro_jacobian = wedge(&(j * omega)) - wedge(&omega) * j;
        df_dx
            .fixed_view_mut::<3, 3>(ANGULAR_VELOCITY_INDEX, ANGULAR_VELOCITY_INDEX)
            .copy_from(&(identity + j_inv * gyro_jacobian * dt));
        df_du
            .fixed_view_mut::<3, 3>(ANGULAR_VELOCITY_INDEX, 1)
            .copy_from(&(j_inv * dt));

        // R⁺ = R E with E = exp(dt [ω]×)
        let phi = omega * dt;
        let exp = so3_exp(&phi);
        let exp_derivatives = so3_exp_derivatives(&phi);
        let rotated = exp_derivatives.map(|d| r * d * dt);
        for i in 0..3 {
            for jj in 0..3 {
                let row = ROTATION_INDEX + 3 * i + jj;
                for k in 0..3 {
                    df_dx[(row, ROTATION_INDEX + 3 * i + k)] = exp[(k, jj)];
                }
                for (m, dr) in rotated.iter().enumerate() {
                    df_dx[(row, ANGULAR_VELOCITY_INDEX + m)] = dr[(i, jj)];
                }
            }
        }

        (df_dx, df_du)
    }

    /// Advance the flattened state over `[t, t + dt]` under a constant input
    ///
    /// # Errors
    /// Only [`TruthIntegrator::Adaptive`] can fail; see [`integrate_adaptive`].
    pub fn advance(
        &self,
        x: &StateVector,
        input: &QuadrotorInput,
        t: f64,
        dt: f64,
        integrator: &TruthIntegrator,
    ) -> Result<StateVector, IntegrationError> {
        let rhs = |_t: f64, state: &StateVector| self.continuous_derivative(state, input);

        match integrator {
            TruthIntegrator::Adaptive(options) => {
                let system = HeldInput { dynamics: self, input };
                integrate_adaptive(&system, x, t, t + dt, options)
            }
            TruthIntegrator::Rk4 { substeps } => {
                let n = (*substeps).max(1);
                let h = dt / n as f64;
                let mut state = *x;
                for k in 0..n {
                    state = rk4(&state, t + k as f64 * h, h, rhs);
                }
                Ok(state)
            }
            TruthIntegrator::Discrete => {
                let next = self.discrete_step(&QuadrotorState::from_vector(x), input, dt);
                Ok(next.to_vector())
            }
        }
    }
}
