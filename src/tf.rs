//! Rational transfer functions
//!
//! A SISO LTI system `G(s) = N(s) / D(s)`. Values are immutable: every
//! composition returns a new transfer function.

use std::fmt;
use std::ops::{Add, Mul};

use nalgebra::Complex;
use serde::Serialize;

use crate::poly::Polynomial;
use crate::ControlError;

/// Transfer function as a numerator/denominator polynomial pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferFunction {
    num: Polynomial,
    den: Polynomial,
}

impl TransferFunction {
    /// Create a transfer function, rejecting a zero denominator.
    pub fn new(num: Polynomial, den: Polynomial) -> Result<Self, ControlError> {
        if den.is_zero() {
            return Err(ControlError::ZeroDenominator);
        }
        Ok(Self { num, den })
    }

    /// Create from descending-power coefficient slices.
    pub fn from_coeffs(num: &[f64], den: &[f64]) -> Result<Self, ControlError> {
        Self::new(Polynomial::new(num), Polynomial::new(den))
    }

    /// Static gain `k / 1`.
    pub fn gain(k: f64) -> Self {
        Self {
            num: Polynomial::constant(k),
            den: Polynomial::one(),
        }
    }

    pub fn num(&self) -> &Polynomial {
        &self.num
    }

    pub fn den(&self) -> &Polynomial {
        &self.den
    }

    /// Number of states of a minimal-order realization of the denominator.
    pub fn order(&self) -> usize {
        self.den.degree()
    }

    /// True when `deg N <= deg D`.
    pub fn is_proper(&self) -> bool {
        self.num.is_zero() || self.num.degree() <= self.den.degree()
    }

    pub fn poles(&self) -> Result<Vec<Complex<f64>>, ControlError> {
        self.den.roots()
    }

    /// Finite zeros. A zero numerator has none.
    pub fn zeros(&self) -> Result<Vec<Complex<f64>>, ControlError> {
        if self.num.is_zero() {
            return Ok(Vec::new());
        }
        self.num.roots()
    }

    pub fn evaluate(&self, s: Complex<f64>) -> Complex<f64> {
        self.num.eval_complex(s) / self.den.eval_complex(s)
    }

    /// Frequency response `G(jω)`.
    pub fn freq_response(&self, omega: f64) -> Complex<f64> {
        self.evaluate(Complex::new(0.0, omega))
    }

    /// `G(0)`; infinite when there is a pole at the origin.
    pub fn dc_gain(&self) -> f64 {
        let n0 = self.num.eval(0.0);
        let d0 = self.den.eval(0.0);
        if d0 == 0.0 {
            if n0 == 0.0 {
                f64::NAN
            } else {
                f64::INFINITY.copysign(n0)
            }
        } else {
            n0 / d0
        }
    }

    /// Unity negative feedback `G / (1 + G)`.
    ///
    /// No common factors are cancelled, so the closed-loop denominator is
    /// exactly the characteristic polynomial `D + N`.
    pub fn feedback(&self) -> Result<Self, ControlError> {
        let characteristic = &self.den + &self.num;
        if characteristic.is_zero() {
            return Err(ControlError::IllPosedLoop);
        }
        Ok(Self {
            num: self.num.clone(),
            den: characteristic,
        })
    }

    /// Closed-loop poles for loop gain `k`: the roots of `D + k N`.
    pub fn closed_loop_poles(&self, k: f64) -> Result<Vec<Complex<f64>>, ControlError> {
        (&self.den + &self.num.scale(k)).roots()
    }
}

impl fmt::Display for TransferFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) / ({})", self.num, self.den)
    }
}

impl Mul for &TransferFunction {
    type Output = TransferFunction;

    fn mul(self, rhs: &TransferFunction) -> TransferFunction {
        // Product of two non-zero denominators is non-zero.
        TransferFunction {
            num: &self.num * &rhs.num,
            den: &self.den * &rhs.den,
        }
    }
}

impl Mul<f64> for &TransferFunction {
    type Output = TransferFunction;

    fn mul(self, k: f64) -> TransferFunction {
        TransferFunction {
            num: self.num.scale(k),
            den: self.den.clone(),
        }
    }
}

impl Add for &TransferFunction {
    type Output = TransferFunction;

    fn add(self, rhs: &TransferFunction) -> TransferFunction {
        TransferFunction {
            num: &(&self.num * &rhs.den) + &(&rhs.num * &self.den),
            den: &self.den * &rhs.den,
        }
    }
}
