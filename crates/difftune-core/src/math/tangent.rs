//! Tangent algebra for closed-form controller Jacobians
//!
//! The control law is written once against the [`Real`] and [`Vector3Ops`]
//! traits. Evaluated on `f64` / `Vector3<f64>` it is the plain controller.
//! Evaluated on [`ScalarJet`] / [`VectorJet`] every intermediate quantity also
//! carries its exact first derivative with respect to the 18 state scalars and
//! the 12 gain scalars, propagated by the product, quotient and cross-product
//! rules of each operation.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use nalgebra::{Matrix3, RowSVector, SMatrix, Vector3};

use crate::math::wedge;
use crate::{GAIN_DIM, STATE_DIM};

/// Number of independent directions carried by a jet: state then gains
pub const JET_DIM: usize = STATE_DIM + GAIN_DIM;

/// Column offset of the gain directions inside a jet
pub const GAIN_OFFSET: usize = STATE_DIM;

/// Scalar arithmetic needed by the control law
pub trait Real:
    Copy
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lift a constant
    fn from_f64(c: f64) -> Self;

    /// Numeric value, dropping any derivative information
    fn value(&self) -> f64;

    fn sqrt(self) -> Self;
}

/// 3-vector arithmetic needed by the control law
pub trait Vector3Ops:
    Copy + Debug + Add<Output = Self> + Sub<Output = Self> + Neg<Output = Self>
{
    type Scalar: Real;

    /// Lift a constant vector
    fn from_value(v: Vector3<f64>) -> Self;

    /// Numeric value, dropping any derivative information
    fn value(&self) -> Vector3<f64>;

    fn component(&self, i: usize) -> Self::Scalar;

    fn from_components(x: Self::Scalar, y: Self::Scalar, z: Self::Scalar) -> Self;

    fn dot(&self, rhs: &Self) -> Self::Scalar;

    fn cross(&self, rhs: &Self) -> Self;

    /// Multiply by a (possibly varying) scalar
    fn scale(&self, s: Self::Scalar) -> Self;

    /// Multiply by a constant
    fn scale_const(&self, c: f64) -> Self;

    /// Element-wise product, i.e. a diagonal gain matrix applied to a vector
    fn component_mul(&self, rhs: &Self) -> Self;

    /// Left-multiply by a constant matrix
    fn transform(&self, m: &Matrix3<f64>) -> Self;
}

impl Real for f64 {
    fn from_f64(c: f64) -> Self {
        c
    }

    fn value(&self) -> f64 {
        *self
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

impl Vector3Ops for Vector3<f64> {
    type Scalar = f64;

    fn from_value(v: Vector3<f64>) -> Self {
        v
    }

    fn value(&self) -> Vector3<f64> {
        *self
    }

    fn component(&self, i: usize) -> f64 {
        self[i]
    }

    fn from_components(x: f64, y: f64, z: f64) -> Self {
        Vector3::new(x, y, z)
    }

    fn dot(&self, rhs: &Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    fn cross(&self, rhs: &Self) -> Self {
        Vector3::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    fn scale(&self, s: f64) -> Self {
        self * s
    }

    fn scale_const(&self, c: f64) -> Self {
        self * c
    }

    fn component_mul(&self, rhs: &Self) -> Self {
        Vector3::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    fn transform(&self, m: &Matrix3<f64>) -> Self {
        m * self
    }
}

/// Scalar with its gradient over the jet directions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarJet {
    pub value: f64,
    pub gradient: RowSVector<f64, JET_DIM>,
}

impl ScalarJet {
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            gradient: RowSVector::zeros(),
        }
    }
}

impl Add for ScalarJet {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            gradient: self.gradient + rhs.gradient,
        }
    }
}

impl Sub for ScalarJet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
            gradient: self.gradient - rhs.gradient,
        }
    }
}

impl Mul for ScalarJet {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            value: self.value * rhs.value,
            gradient: self.gradient * rhs.value + rhs.gradient * self.value,
        }
    }
}

impl Div for ScalarJet {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let quotient = self.value / rhs.value;
        Self {
            value: quotient,
            gradient: (self.gradient - rhs.gradient * quotient) / rhs.value,
        }
    }
}

impl Neg for ScalarJet {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            value: -self.value,
            gradient: -self.gradient,
        }
    }
}

impl Real for ScalarJet {
    fn from_f64(c: f64) -> Self {
        Self::constant(c)
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn sqrt(self) -> Self {
        let root = self.value.sqrt();
        Self {
            value: root,
            gradient: self.gradient / (2.0 * root),
        }
    }
}

/// 3-vector with its Jacobian over the jet directions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorJet {
    pub value: Vector3<f64>,
    pub jacobian: SMatrix<f64, 3, JET_DIM>,
}

impl VectorJet {
    pub fn constant(value: Vector3<f64>) -> Self {
        Self {
            value,
            jacobian: SMatrix::zeros(),
        }
    }

    /// Independent variable occupying directions `offset..offset + 3`
    pub fn variable(value: Vector3<f64>, offset: usize) -> Self {
        let mut jacobian = SMatrix::<f64, 3, JET_DIM>::zeros();
        jacobian
            .fixed_view_mut::<3, 3>(0, offset)
            .copy_from(&Matrix3::identity());
        Self { value, jacobian }
    }

    /// Independent variable whose components sit at arbitrary directions
    pub fn variable_at(value: Vector3<f64>, directions: [usize; 3]) -> Self {
        let mut jacobian = SMatrix::<f64, 3, JET_DIM>::zeros();
        for (row, &col) in directions.iter().enumerate() {
            jacobian[(row, col)] = 1.0;
        }
        Self { value, jacobian }
    }
}

impl Add for VectorJet {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            jacobian: self.jacobian + rhs.jacobian,
        }
    }
}

impl Sub for VectorJet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
            jacobian: self.jacobian - rhs.jacobian,
        }
    }
}

impl Neg for VectorJet {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            value: -self.value,
            jacobian: -self.jacobian,
        }
    }
}

impl Vector3Ops for VectorJet {
    type Scalar = ScalarJet;

    fn from_value(v: Vector3<f64>) -> Self {
        Self::constant(v)
    }

    fn value(&self) -> Vector3<f64> {
        self.value
    }

    fn component(&self, i: usize) -> ScalarJet {
        ScalarJet {
            value: self.value[i],
            gradient: self.jacobian.row(i).into_owned(),
        }
    }

    fn from_components(x: ScalarJet, y: ScalarJet, z: ScalarJet) -> Self {
        Self {
            value: Vector3::new(x.value, y.value, z.value),
            jacobian: SMatrix::from_rows(&[x.gradient, y.gradient, z.gradient]),
        }
    }

    fn dot(&self, rhs: &Self) -> ScalarJet {
        ScalarJet {
            value: self.value.dot(&rhs.value),
            gradient: rhs.value.transpose() * self.jacobian + self.value.transpose() * rhs.jacobian,
        }
    }

    fn cross(&self, rhs: &Self) -> Self {
        // d(a × b) = a × db - b × da
        Self {
            value: self.value.cross(&rhs.value),
            jacobian: wedge(&self.value) * rhs.jacobian - wedge(&rhs.value) * self.jacobian,
        }
    }

    fn scale(&self, s: ScalarJet) -> Self {
        Self {
            value: self.value * s.value,
            jacobian: self.jacobian * s.value + self.value * s.gradient,
        }
    }

    fn scale_const(&self, c: f64) -> Self {
        Self {
            value: self.value * c,
            jacobian: self.jacobian * c,
        }
    }

    fn component_mul(&self, rhs: &Self) -> Self {
        Self {
            value: self.value.component_mul(&rhs.value),
            jacobian: Matrix3::from_diagonal(&self.value) * rhs.jacobian
                + Matrix3::from_diagonal(&rhs.value) * self.jacobian,
        }
    }

    fn transform(&self, m: &Matrix3<f64>) -> Self {
        Self {
            value: m * self.value,
            jacobian: m * self.jacobian,
        }
    }
}
