//! Rotation matrices as body-axis triads
//!
//! A [`Triad`] stores a 3x3 matrix by its columns so that it can be built from
//! (and differentiated through) the tangent algebra.

use nalgebra::Matrix3;

use crate::math::Vector3Ops;

/// 3x3 matrix held as its three columns `[b₁ b₂ b₃]`
#[derive(Debug, Clone, Copy)]
pub struct Triad<V> {
    pub columns: [V; 3],
}

impl<V: Vector3Ops> Triad<V> {
    pub fn new(b1: V, b2: V, b3: V) -> Self {
        Self {
            columns: [b1, b2, b3],
        }
    }

    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Self::new(
            V::from_value(m.column(0).into_owned()),
            V::from_value(m.column(1).into_owned()),
            V::from_value(m.column(2).into_owned()),
        )
    }

    pub fn column(&self, j: usize) -> V {
        self.columns[j]
    }

    /// `R w`
    pub fn mul_vec(&self, w: &V) -> V {
        let [b1, b2, b3] = self.columns;
        b1.scale(w.component(0)) + b2.scale(w.component(1)) + b3.scale(w.component(2))
    }

    /// `Rᵀ w`
    pub fn tr_mul_vec(&self, w: &V) -> V {
        let [b1, b2, b3] = self.columns;
        V::from_components(b1.dot(w), b2.dot(w), b3.dot(w))
    }

    /// Numeric value, dropping any derivative information
    pub fn value(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[
            self.columns[0].value(),
            self.columns[1].value(),
            self.columns[2].value(),
        ])
    }
}

/// `vee(Aᵀ B)` without forming the product
///
/// Reads the same entries as [`crate::math::vee`]: `(-S₁₂, S₀₂, -S₀₁)` with
/// `Sᵢⱼ = aᵢ · bⱼ`.
pub fn vee_of_product<V: Vector3Ops>(a: &Triad<V>, b: &Triad<V>) -> V {
    let entry = |i: usize, j: usize| a.columns[i].dot(&b.columns[j]);
    V::from_components(-entry(1, 2), entry(0, 2), -entry(0, 1))
}
