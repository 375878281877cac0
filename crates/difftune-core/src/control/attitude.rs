//! Attitude loop of the geometric controller
//!
//! Tracks the desired rotation produced by the position loop:
//!
//! ```text
//! e_R = ½ vee(R_dᵀ R − Rᵀ R_d)
//! e_ω = ω − Rᵀ R_d ω_d
//! M   = −k_R e_R − k_ω e_ω + ω × Jω − J (ω × Rᵀ R_d ω_d − Rᵀ R_d ω̇_d)
//! ```

use nalgebra::Matrix3;

use crate::control::GainVars;
use crate::math::{vee_of_product, Triad, Vector3Ops};

/// Output of [`attitude_control`]
#[derive(Debug, Clone, Copy)]
pub struct AttitudeCommand<V> {
    /// Body moment
    pub moment: V,
    pub attitude_error: V,
    pub angular_velocity_error: V,
}

/// Moment command from the attitude and angular velocity errors
#[allow(clippy::too_many_arguments)]
pub fn attitude_control<V: Vector3Ops>(
    rotation: &Triad<V>,
    angular_velocity: &V,
    rotation_d: &Triad<V>,
    angular_velocity_d: &V,
    angular_acceleration_d: &V,
    gains: &GainVars<V>,
    inertia: &Matrix3<f64>,
) -> AttitudeCommand<V> {
    let omega = *angular_velocity;

    let attitude_error =
        (vee_of_product(rotation_d, rotation) - vee_of_product(rotation, rotation_d)).scale_const(0.5);

    // Desired rates expressed in the current body frame
    let omega_d = rotation.tr_mul_vec(&rotation_d.mul_vec(angular_velocity_d));
    let omega_d_dot = rotation.tr_mul_vec(&rotation_d.mul_vec(angular_acceleration_d));
    let angular_velocity_error = omega - omega_d;

    let moment = -gains.attitude.component_mul(&attitude_error)
        - gains.angular_velocity.component_mul(&angular_velocity_error)
        + omega.cross(&omega.transform(inertia))
        - (omega.cross(&omega_d) - omega_d_dot).transform(inertia);

    AttitudeCommand {
        moment,
        attitude_error,
        angular_velocity_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControllerGains;
    use crate::math::{so3_exp, vee};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn inertia() -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(0.082, 0.0845, 0.1377))
    }

    #[test]
    fn test_errors_match_matrix_definitions() {
        let r = so3_exp(&Vector3::new(0.3, -0.1, 0.5));
        let rd = so3_exp(&Vector3::new(-0.2, 0.4, 0.1));
        let w = Vector3::new(0.5, -0.3, 1.0);
        let wd = Vector3::new(0.1, 0.2, -0.4);
        let gains = ControllerGains::default();

        let command = attitude_control(
            &Triad::from_matrix(&r),
            &w,
            &Triad::from_matrix(&rd),
            &wd,
            &Vector3::zeros(),
            &gains.lift(),
            &inertia(),
        );

        let expected_er = 0.5 * vee(&(rd.transpose() * r - r.transpose() * rd));
        let expected_ew = w - r.transpose() * rd * wd;
        assert_relative_eq!(command.attitude_error, expected_er, epsilon = 1e-12);
        assert_relative_eq!(command.angular_velocity_error, expected_ew, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_error_gives_feed_forward_moment() {
        let r = so3_exp(&Vector3::new(0.3, -0.1, 0.5));
        let w = Vector3::new(0.5, -0.3, 1.0);
        let wd_dot = Vector3::new(0.7, 0.0, -0.2);
        let j = inertia();
        let triad = Triad::from_matrix(&r);

        let command = attitude_control(
            &triad,
            &w,
            &triad,
            &w,
            &wd_dot,
            &ControllerGains::default().lift(),
            &j,
        );

        assert_relative_eq!(command.attitude_error, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(command.angular_velocity_error, Vector3::zeros(), epsilon = 1e-12);
        // Exactly the inverse dynamics of the desired angular motion
        assert_relative_eq!(command.moment, w.cross(&(j * w)) + j * wd_dot, epsilon = 1e-12);
    }

    #[test]
    fn test_small_rotation_error_is_rotation_vector() {
        let phi = Vector3::new(1e-4, -2e-4, 3e-4);
        let rd = Matrix3::identity();
        let r = so3_exp(&phi);

        let command = attitude_control(
            &Triad::from_matrix(&r),
            &Vector3::zeros(),
            &Triad::from_matrix(&rd),
            &Vector3::zeros(),
            &Vector3::zeros(),
            &ControllerGains::uniform(1.0, 1.0, 2.0, 1.0).lift(),
            &inertia(),
        );

        assert_relative_eq!(command.attitude_error, phi, epsilon = 1e-10);
        assert_relative_eq!(command.moment, -phi * 2.0, epsilon = 1e-10);
    }
}
