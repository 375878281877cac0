//! Geometric controller gains
//!
//! Each gain is a diagonal matrix stored as a 3-vector. For differentiation
//! the four vectors are flattened to a 12-element parameter vector
//! `θ = [k_x, k_v, k_R, k_W]`.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::math::{Vector3Ops, VectorJet, GAIN_OFFSET};
use crate::GainVector;

/// Controller gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerGains {
    /// Position error gain k_x
    pub position: Vector3<f64>,
    /// Velocity error gain k_v
    pub velocity: Vector3<f64>,
    /// Attitude error gain k_R
    pub attitude: Vector3<f64>,
    /// Angular velocity error gain k_W
    pub angular_velocity: Vector3<f64>,
}

impl Default for ControllerGains {
    fn default() -> Self {
        Self::uniform(16.0, 5.6, 8.81, 2.54)
    }
}

impl ControllerGains {
    /// Same value on all three axes of each gain
    pub fn uniform(kx: f64, kv: f64, kr: f64, kw: f64) -> Self {
        Self {
            position: Vector3::repeat(kx),
            velocity: Vector3::repeat(kv),
            attitude: Vector3::repeat(kr),
            angular_velocity: Vector3::repeat(kw),
        }
    }

    pub fn to_vector(&self) -> GainVector {
        let mut theta = GainVector::zeros();
        for (block, k) in self.blocks().iter().enumerate() {
            theta.fixed_rows_mut::<3>(3 * block).copy_from(k);
        }
        theta
    }

    pub fn from_vector(theta: &GainVector) -> Self {
        let block = |i: usize| theta.fixed_rows::<3>(3 * i).into_owned();
        Self {
            position: block(0),
            velocity: block(1),
            attitude: block(2),
            angular_velocity: block(3),
        }
    }

    fn blocks(&self) -> [Vector3<f64>; 4] {
        [self.position, self.velocity, self.attitude, self.angular_velocity]
    }

    /// Gradient step `θ ← θ − η ∇θ`
    pub fn descend(&mut self, gradient: &GainVector, learning_rate: f64) {
        *self = Self::from_vector(&(self.to_vector() - gradient * learning_rate));
    }

    /// Clamp every component to at least `floor`
    ///
    /// Returns the number of components that were raised.
    pub fn project(&mut self, floor: f64) -> usize {
        let mut theta = self.to_vector();
        let mut clamped = 0;
        for k in theta.iter_mut() {
            if k.is_nan() || *k < floor {
                *k = floor;
                clamped += 1;
            }
        }
        *self = Self::from_vector(&theta);
        clamped
    }

    /// Smallest of the 12 gain components
    pub fn min_component(&self) -> f64 {
        self.to_vector().min()
    }

    /// Gains as constants of the tangent algebra
    pub fn lift<V: Vector3Ops>(&self) -> GainVars<V> {
        GainVars {
            position: V::from_value(self.position),
            velocity: V::from_value(self.velocity),
            attitude: V::from_value(self.attitude),
            angular_velocity: V::from_value(self.angular_velocity),
        }
    }
}

/// Gains as seen by the control law
#[derive(Debug, Clone, Copy)]
pub struct GainVars<V> {
    pub position: V,
    pub velocity: V,
    pub attitude: V,
    pub angular_velocity: V,
}

impl GainVars<VectorJet> {
    /// Gains as independent jet variables at their θ directions
    pub fn seeded(gains: &ControllerGains) -> Self {
        Self {
            position: VectorJet::variable(gains.position, GAIN_OFFSET),
            velocity: VectorJet::variable(gains.velocity, GAIN_OFFSET + 3),
            attitude: VectorJet::variable(gains.attitude, GAIN_OFFSET + 6),
            angular_velocity: VectorJet::variable(gains.angular_velocity, GAIN_OFFSET + 9),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vector_layout() {
        let gains = ControllerGains::uniform(1.0, 2.0, 3.0, 4.0);
        let theta = gains.to_vector();

        assert_eq!(theta[0], 1.0);
        assert_eq!(theta[5], 2.0);
        assert_eq!(theta[6], 3.0);
        assert_eq!(theta[11], 4.0);
        assert_eq!(ControllerGains::from_vector(&theta), gains);
    }

    #[test]
    fn test_descend() {
        let mut gains = ControllerGains::default();
        let mut gradient = GainVector::zeros();
        gradient[0] = 100.0;
        gradient[9] = -10.0;

        gains.descend(&gradient, 0.001);

        assert_relative_eq!(gains.position.x, 15.9, epsilon = 1e-12);
        assert_relative_eq!(gains.position.y, 16.0, epsilon = 1e-12);
        assert_relative_eq!(gains.angular_velocity.x, 2.55, epsilon = 1e-12);
    }

    #[test]
    fn test_projection_is_per_component() {
        let mut gains = ControllerGains::default();
        gains.velocity.y = -3.0;
        gains.attitude.z = 0.2;
        gains.angular_velocity.x = 0.5;

        let clamped = gains.project(0.5);

        assert_eq!(clamped, 2);
        assert_eq!(gains.velocity, Vector3::new(5.6, 0.5, 5.6));
        assert_eq!(gains.attitude, Vector3::new(8.81, 8.81, 0.5));
        // Exactly at the floor is left alone
        assert_eq!(gains.angular_velocity.x, 0.5);
        assert!(gains.min_component() >= 0.5);
    }

    #[test]
    fn test_projection_replaces_nan() {
        let mut gains = ControllerGains::default();
        gains.position.z = f64::NAN;

        assert_eq!(gains.project(0.5), 1);
        assert_eq!(gains.position.z, 0.5);
    }

    #[test]
    fn test_seeded_jets_cover_gain_directions() {
        let vars = GainVars::seeded(&ControllerGains::default());

        assert_eq!(vars.position.jacobian[(0, GAIN_OFFSET)], 1.0);
        assert_eq!(vars.angular_velocity.jacobian[(2, GAIN_OFFSET + 11)], 1.0);
        assert_eq!(vars.attitude.value, Vector3::repeat(8.81));
    }
}
