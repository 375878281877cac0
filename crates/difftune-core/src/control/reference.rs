//! Reference trajectories
//!
//! A reference is sampled once per control step. Each sample carries the
//! desired position and its first four derivatives (the controller
//! differentiates the force command twice) together with the heading
//! direction used to fix the desired yaw.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Desired trajectory sample at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSample {
    /// Position [m]
    pub position: Vector3<f64>,
    /// Velocity [m/s]
    pub velocity: Vector3<f64>,
    /// Acceleration [m/s²]
    pub acceleration: Vector3<f64>,
    /// Jerk [m/s³]
    pub jerk: Vector3<f64>,
    /// Snap [m/s⁴]
    pub snap: Vector3<f64>,
    /// Desired body x-axis direction (need not be unit or orthogonal to thrust)
    pub heading: Vector3<f64>,
    pub heading_rate: Vector3<f64>,
    pub heading_acceleration: Vector3<f64>,
    /// Yaw angle [rad], carried for reporting only
    pub yaw: f64,
}

impl Default for ReferenceSample {
    fn default() -> Self {
        Self::hover(Vector3::zeros(), Vector3::x())
    }
}

impl ReferenceSample {
    /// Stationary set-point with a constant heading
    pub fn hover(position: Vector3<f64>, heading: Vector3<f64>) -> Self {
        Self {
            position,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            jerk: Vector3::zeros(),
            snap: Vector3::zeros(),
            heading,
            heading_rate: Vector3::zeros(),
            heading_acceleration: Vector3::zeros(),
            yaw: 0.0,
        }
    }
}

/// Source of reference samples
pub trait ReferenceTrajectory {
    fn sample(&self, t: f64) -> ReferenceSample;
}

impl<F> ReferenceTrajectory for F
where
    F: Fn(f64) -> ReferenceSample,
{
    fn sample(&self, t: f64) -> ReferenceSample {
        self(t)
    }
}

/// Circle in the horizontal plane plus a vertical sine, constant heading
///
/// ```text
/// x(t) = [r (1 − cos ωt), r sin ωt, a sin ωt]
/// ```
///
/// The circle starts at the origin, so a vehicle at rest there begins with
/// zero position error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircularOscillation {
    /// Circle radius r [m]
    pub radius: f64,
    /// Angular rate ω [rad/s]
    pub angular_rate: f64,
    /// Vertical amplitude a [m]
    pub vertical_amplitude: f64,
    /// Constant heading direction
    pub heading: Vector3<f64>,
}

impl Default for CircularOscillation {
    fn default() -> Self {
        Self {
            radius: 2.0,
            angular_rate: 1.0,
            vertical_amplitude: 0.1,
            heading: Vector3::x(),
        }
    }
}

impl ReferenceTrajectory for CircularOscillation {
    fn sample(&self, t: f64) -> ReferenceSample {
        let w = self.angular_rate;
        let (s, c) = (w * t).sin_cos();
        let r = self.radius;
        let a = self.vertical_amplitude;

        // k-th derivative picks up a factor ω^k
        let w2 = w * w;
        let w3 = w2 * w;
        let w4 = w2 * w2;

        ReferenceSample {
            position: Vector3::new(r * (1.0 - c), r * s, a * s),
            velocity: Vector3::new(r * s, r * c, a * c) * w,
            acceleration: Vector3::new(r * c, -r * s, -a * s) * w2,
            jerk: Vector3::new(-r * s, -r * c, -a * c) * w3,
            snap: Vector3::new(-r * c, r * s, a * s) * w4,
            heading: self.heading,
            heading_rate: Vector3::zeros(),
            heading_acceleration: Vector3::zeros(),
            yaw: 0.0,
        }
    }
}

/// Constant set-point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoverReference {
    pub position: Vector3<f64>,
    pub heading: Vector3<f64>,
}

impl HoverReference {
    pub fn new(position: Vector3<f64>, heading: Vector3<f64>) -> Self {
        Self { position, heading }
    }
}

impl ReferenceTrajectory for HoverReference {
    fn sample(&self, _t: f64) -> ReferenceSample {
        ReferenceSample::hover(self.position, self.heading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circle_starts_at_origin() {
        let reference = CircularOscillation::default();
        let sample = reference.sample(0.0);

        assert_relative_eq!(sample.position, Vector3::zeros(), epsilon = 1e-15);
        assert_relative_eq!(sample.velocity, Vector3::new(0.0, 2.0, 0.1), epsilon = 1e-15);
        assert_eq!(sample.heading, Vector3::x());
    }

    #[test]
    fn test_circle_derivatives_are_consistent() {
        let reference = CircularOscillation {
            angular_rate: 1.3,
            ..CircularOscillation::default()
        };
        let h = 1e-5;

        for t in [0.0, 0.8, 2.5] {
            let mid = reference.sample(t);
            let plus = reference.sample(t + h);
            let minus = reference.sample(t - h);
            let fd = |p: Vector3<f64>, m: Vector3<f64>| (p - m) / (2.0 * h);

            assert_relative_eq!(mid.velocity, fd(plus.position, minus.position), epsilon = 1e-8);
            assert_relative_eq!(mid.acceleration, fd(plus.velocity, minus.velocity), epsilon = 1e-8);
            assert_relative_eq!(mid.jerk, fd(plus.acceleration, minus.acceleration), epsilon = 1e-8);
            assert_relative_eq!(mid.snap, fd(plus.jerk, minus.jerk), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_hover_reference_is_constant() {
        let reference = HoverReference::new(Vector3::new(1.0, 2.0, -3.0), Vector3::y());

        assert_eq!(reference.sample(0.0), reference.sample(42.0));
        assert_eq!(reference.sample(1.0).snap, Vector3::zeros());
    }

    #[test]
    fn test_closure_reference() {
        let reference = |t: f64| ReferenceSample::hover(Vector3::new(t, 0.0, 0.0), Vector3::x());

        assert_eq!(reference.sample(2.0).position.x, 2.0);
    }
}
