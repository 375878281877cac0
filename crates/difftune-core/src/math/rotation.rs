//! SO(3) rotation utilities
//!
//! Provides the hat/vee maps between 3-vectors and skew-symmetric matrices and
//! the exponential map used by the discrete attitude update.

use nalgebra::{Matrix3, Vector3};

/// Below this rotation angle the Rodrigues coefficients use their series form.
const SMALL_ANGLE: f64 = 1e-2;

/// Skew-symmetric matrix from vector (hat operator)
///
/// For v = [x, y, z]^T:
/// ```text
/// [v]× = [ 0  -z   y]
///        [ z   0  -x]
///        [-y   x   0]
/// ```
///
/// so that `wedge(v) * u == v × u`.
pub fn wedge(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Vee operator, the left inverse of [`wedge`]
///
/// Reads the entries `(-S₁₂, S₀₂, -S₀₁)`. Only meaningful for skew-symmetric
/// input; other matrices are read through the same three entries.
pub fn vee(s: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(-s[(1, 2)], s[(0, 2)], -s[(0, 1)])
}

/// Rodrigues coefficients `a = sin θ / θ` and `b = (1 - cos θ) / θ²`
fn rodrigues_coefficients(theta: f64) -> (f64, f64) {
    if theta < SMALL_ANGLE {
        let t2 = theta * theta;
        (
            1.0 - t2 / 6.0 + t2 * t2 / 120.0,
            0.5 - t2 / 24.0 + t2 * t2 / 720.0,
        )
    } else {
        let half_sin = (0.5 * theta).sin();
        (theta.sin() / theta, 2.0 * half_sin * half_sin / (theta * theta))
    }
}

/// Derivatives of the Rodrigues coefficients divided by θ
///
/// Returns `(a'(θ)/θ, b'(θ)/θ)`, which stay finite as θ → 0.
fn rodrigues_coefficient_rates(theta: f64) -> (f64, f64) {
    if theta < SMALL_ANGLE {
        let t2 = theta * theta;
        (
            -1.0 / 3.0 + t2 / 30.0 - t2 * t2 / 840.0,
            -1.0 / 12.0 + t2 / 180.0 - t2 * t2 / 6720.0,
        )
    } else {
        let (s, c) = theta.sin_cos();
        let half_sin = (0.5 * theta).sin();
        let t2 = theta * theta;
        (
            (theta * c - s) / (t2 * theta),
            (theta * s - 4.0 * half_sin * half_sin) / (t2 * t2),
        )
    }
}

/// Exponential map from so(3) to SO(3)
///
/// `exp([φ]×) = I + a(θ) [φ]× + b(θ) [φ]×²` with θ = ‖φ‖.
pub fn so3_exp(phi: &Vector3<f64>) -> Matrix3<f64> {
    let k = wedge(phi);
    let (a, b) = rodrigues_coefficients(phi.norm());
    Matrix3::identity() + k * a + k * k * b
}

/// Partial derivatives of [`so3_exp`] with respect to each component of φ
///
/// Element `m` of the result is `∂ exp([φ]×) / ∂φₘ`.
pub fn so3_exp_derivatives(phi: &Vector3<f64>) -> [Matrix3<f64>; 3] {
    let k = wedge(phi);
    let k2 = k * k;
    let theta = phi.norm();
    let (a, b) = rodrigues_coefficients(theta);
    let (da, db) = rodrigues_coefficient_rates(theta);

    let generator = |m: usize| -> Matrix3<f64> {
        let g = wedge(&Vector3::ith(m, 1.0));
        g * a + (g * k + k * g) * b + (k * da + k2 * db) * phi[m]
    };

    [generator(0), generator(1), generator(2)]
}

/// Distance of a matrix from the rotation group, `‖RᵀR − I‖`
pub fn orthonormality_error(r: &Matrix3<f64>) -> f64 {
    (r.transpose() * r - Matrix3::identity()).norm()
}
