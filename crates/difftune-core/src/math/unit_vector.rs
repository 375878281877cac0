//! Unit vector (S²) operations
//!
//! Normalization of a time-varying vector signal together with its first two
//! time derivatives. The desired body axes of the geometric controller are
//! built this way from the commanded force and the heading reference.

use nalgebra::Vector3;
use thiserror::Error;

use crate::math::{Real, Vector3Ops};

/// Norms below this are treated as a degenerate direction.
pub const MIN_NORM: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorMathError {
    #[error("cannot normalize vector with norm {norm:e}")]
    DegenerateVector { norm: f64 },
    #[error("non-finite time derivative of order {order}")]
    NonFiniteDerivative { order: usize },
}

/// Unit vector `u = q/‖q‖` and its first two time derivatives
///
/// ```text
/// u̇ = q̇/‖q‖ − q (q·q̇)/‖q‖³
/// ü = q̈/‖q‖ − 2 q̇ (q·q̇)/‖q‖³ − q (q̇·q̇ + q·q̈)/‖q‖³ + 3 q (q·q̇)²/‖q‖⁵
/// ```
///
/// # Errors
/// [`VectorMathError::DegenerateVector`] when ‖q‖ is below [`MIN_NORM`] or
/// not finite; the quotient rule blows up there.
/// [`VectorMathError::NonFiniteDerivative`] when `q̇`, `q̈` or one of the
/// resulting derivatives is not finite.
pub fn deriv_unit_vector<V: Vector3Ops>(
    q: &V,
    q_dot: &V,
    q_ddot: &V,
) -> Result<(V, V, V), VectorMathError> {
    let nq = q.dot(q).sqrt();
    let norm = nq.value();
    if !norm.is_finite() || norm < MIN_NORM {
        return Err(VectorMathError::DegenerateVector { norm });
    }
    for (order, v) in [(1, q_dot), (2, q_ddot)] {
        if !is_finite(&v.value()) {
            return Err(VectorMathError::NonFiniteDerivative { order });
        }
    }

    let inv = V::Scalar::from_f64(1.0) / nq;
    let inv3 = inv * inv * inv;
    let inv5 = inv3 * inv * inv;
    let q_qd = q.dot(q_dot);

    let u = q.scale(inv);
    let u_dot = q_dot.scale(inv) - q.scale(q_qd * inv3);
    let u_ddot = q_ddot.scale(inv)
        - q_dot.scale(V::Scalar::from_f64(2.0) * q_qd * inv3)
        - q.scale((q_dot.dot(q_dot) + q.dot(q_ddot)) * inv3)
        + q.scale(V::Scalar::from_f64(3.0) * q_qd * q_qd * inv5);

    for (order, v) in [(1, &u_dot), (2, &u_ddot)] {
        if !is_finite(&v.value()) {
            return Err(VectorMathError::NonFiniteDerivative { order });
        }
    }

    Ok((u, u_dot, u_ddot))
}

fn is_finite(v: &Vector3<f64>) -> bool {
    v.iter().all(|c| c.is_finite())
}
