//! Real polynomials in the Laplace variable
//!
//! Coefficients are stored in descending powers of `s`, the convention used by
//! most control toolboxes: `[a_n, a_{n-1}, ..., a_0]` is
//! `a_n*s^n + ... + a_1*s + a_0`.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use nalgebra::{Complex, DMatrix};
use serde::Serialize;

use crate::ControlError;

/// Convergence tolerance for the Schur iteration.
const SCHUR_EPS: f64 = 1.0e-14;
/// Iteration cap for the Schur iteration.
const SCHUR_MAX_ITER: usize = 10_000;
/// Iteration cap for the Aberth-Ehrlich fallback.
const ABERTH_MAX_ITER: usize = 1_000;
/// Newton steps applied to every root against the original coefficients.
const POLISH_STEPS: usize = 3;
/// A difference coefficient within this many ulps of its operands is zero.
const CANCELLATION_ULPS: f64 = 8.0;

/// Polynomial with real coefficients in descending powers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// Build a polynomial from descending-power coefficients.
    ///
    /// Leading zeros are dropped; an empty slice is the zero polynomial.
    pub fn new(coeffs: &[f64]) -> Self {
        let first = coeffs.iter().position(|&c| c != 0.0);
        let coeffs = match first {
            Some(idx) => coeffs[idx..].to_vec(),
            None => vec![0.0],
        };
        Self { coeffs }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(&[value])
    }

    pub fn zero() -> Self {
        Self::constant(0.0)
    }

    pub fn one() -> Self {
        Self::constant(1.0)
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Degree of the polynomial (the zero polynomial reports 0).
    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0.0)
    }

    pub fn leading(&self) -> f64 {
        self.coeffs[0]
    }

    pub fn scale(&self, factor: f64) -> Self {
        let coeffs: Vec<f64> = self.coeffs.iter().map(|&c| c * factor).collect();
        Self::new(&coeffs)
    }

    /// Horner evaluation at a real point.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
    }

    /// Horner evaluation at a complex point.
    pub fn eval_complex(&self, z: Complex<f64>) -> Complex<f64> {
        self.coeffs
            .iter()
            .fold(Complex::new(0.0, 0.0), |acc, &c| acc * z + c)
    }

    /// Split `p(jω)` into real and imaginary parts, each a real polynomial in `ω`.
    ///
    /// Powers of `j` cycle through `1, j, -1, -j`.
    pub fn split_imaginary_axis(&self) -> (Polynomial, Polynomial) {
        let n = self.degree();
        let mut re = vec![0.0; n + 1];
        let mut im = vec![0.0; n + 1];

        for (idx, &c) in self.coeffs.iter().enumerate() {
            let power = n - idx;
            match power % 4 {
                0 => re[idx] = c,
                1 => im[idx] = c,
                2 => re[idx] = -c,
                _ => im[idx] = -c,
            }
        }

        (Polynomial::new(&re), Polynomial::new(&im))
    }

    /// `p(s)` as `E(s^2) + s O(s^2)`, returned as `(E, O)`.
    pub fn split_parity(&self) -> (Polynomial, Polynomial) {
        // Ascending order is easier to index by power.
        let mut even = Vec::new();
        let mut odd = Vec::new();
        for (power, &c) in self.coeffs.iter().rev().enumerate() {
            if power % 2 == 0 {
                even.push(c);
            } else {
                odd.push(c);
            }
        }
        even.reverse();
        odd.reverse();
        (Polynomial::new(&even), Polynomial::new(&odd))
    }

    pub fn derivative(&self) -> Polynomial {
        let n = self.degree();
        let coeffs: Vec<f64> = self.coeffs[..n]
            .iter()
            .enumerate()
            .map(|(idx, &c)| c * (n - idx) as f64)
            .collect();
        Polynomial::new(&coeffs)
    }

    /// `self - rhs`, with coefficients that cancel down to rounding noise of
    /// their operands set to exactly zero.
    pub fn cancelling_sub(&self, rhs: &Polynomial) -> Polynomial {
        let len = self.coeffs.len().max(rhs.coeffs.len());
        let pad = |c: &[f64]| {
            let mut out = vec![0.0; len - c.len()];
            out.extend_from_slice(c);
            out
        };
        let (a, b) = (pad(&self.coeffs), pad(&rhs.coeffs));
        let out: Vec<f64> = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| {
                let d = x - y;
                if d.abs() <= CANCELLATION_ULPS * f64::EPSILON * (x.abs() + y.abs()) {
                    0.0
                } else {
                    d
                }
            })
            .collect();
        Polynomial::new(&out)
    }

    /// All complex roots, with multiplicity.
    ///
    /// Roots at the origin are factored out exactly; the rest are the
    /// eigenvalues of the companion matrix of the monic remainder, or the
    /// Aberth-Ehrlich iterates when the Schur iteration stalls. Every root is
    /// then polished with Newton steps on the original coefficients.
    pub fn roots(&self) -> Result<Vec<Complex<f64>>, ControlError> {
        if self.is_zero() {
            return Err(ControlError::RootFinding(
                "the zero polynomial has no isolated roots".to_string(),
            ));
        }

        let mut coeffs = &self.coeffs[..];
        let mut roots = Vec::with_capacity(coeffs.len());
        while coeffs.len() > 1 && coeffs[coeffs.len() - 1] == 0.0 {
            roots.push(Complex::new(0.0, 0.0));
            coeffs = &coeffs[..coeffs.len() - 1];
        }

        let n = coeffs.len() - 1;
        if n == 0 {
            return Ok(roots);
        }

        let lead = coeffs[0];
        if n == 1 {
            roots.push(Complex::new(-coeffs[1] / lead, 0.0));
            return Ok(roots);
        }

        let monic: Vec<f64> = coeffs.iter().map(|&c| c / lead).collect();
        let found = match companion_eigenvalues(&monic) {
            Some(found) => found,
            None => {
                tracing::debug!(degree = n, "Schur iteration stalled, using Aberth-Ehrlich");
                aberth(&monic).ok_or_else(|| {
                    ControlError::RootFinding(format!(
                        "no root iteration converged for degree-{n} polynomial"
                    ))
                })?
            }
        };

        let remainder = Polynomial::new(coeffs);
        let slope = remainder.derivative();
        roots.extend(found.into_iter().map(|z| polish(&remainder, &slope, z)));
        Ok(roots)
    }
}

fn companion_eigenvalues(monic: &[f64]) -> Option<Vec<Complex<f64>>> {
    let n = monic.len() - 1;
    let companion = DMatrix::from_fn(n, n, |row, col| {
        if row == 0 {
            -monic[col + 1]
        } else if row == col + 1 {
            1.0
        } else {
            0.0
        }
    });
    let schur = companion.try_schur(SCHUR_EPS, SCHUR_MAX_ITER)?;
    let eigenvalues: Vec<Complex<f64>> = schur.complex_eigenvalues().iter().copied().collect();
    let finite = eigenvalues.iter().all(|z| z.re.is_finite() && z.im.is_finite());
    finite.then_some(eigenvalues)
}

/// Simultaneous Aberth-Ehrlich iteration on a monic polynomial.
fn aberth(monic: &[f64]) -> Option<Vec<Complex<f64>>> {
    let n = monic.len() - 1;
    let p = Polynomial::new(monic);
    let dp = p.derivative();

    // Fujiwara-style radius bound; the angular offset breaks the symmetry of
    // even and odd polynomials.
    let radius = monic[1..]
        .iter()
        .enumerate()
        .map(|(i, &c)| c.abs().powf(1.0 / (i + 1) as f64))
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let mut z: Vec<Complex<f64>> = (0..n)
        .map(|k| {
            let angle = std::f64::consts::TAU * k as f64 / n as f64 + 0.4;
            Complex::from_polar(radius, angle)
        })
        .collect();

    // Horner rounding bound: |p(z)| below 8 eps sum |a_i| |z|^i is noise.
    let magnitudes = Polynomial::new(&monic.iter().map(|c| c.abs()).collect::<Vec<_>>());
    let mut done = vec![false; n];

    for _ in 0..ABERTH_MAX_ITER {
        for k in 0..n {
            if done[k] {
                continue;
            }
            let pz = p.eval_complex(z[k]);
            if pz.norm() <= 8.0 * f64::EPSILON * magnitudes.eval(z[k].norm()) {
                done[k] = true;
                continue;
            }
            let ratio = pz / dp.eval_complex(z[k]);
            let repulsion: Complex<f64> = (0..n)
                .filter(|&j| j != k)
                .map(|j| (z[k] - z[j]).inv())
                .sum();
            let step = ratio / (Complex::new(1.0, 0.0) - ratio * repulsion);
            if !(step.re.is_finite() && step.im.is_finite()) {
                return None;
            }
            z[k] -= step;
            if step.norm() <= f64::EPSILON * z[k].norm() {
                done[k] = true;
            }
        }
        if done.iter().all(|&d| d) {
            return Some(z);
        }
    }
    None
}

/// Newton refinement, keeping a step only when it reduces `|p(z)|`.
fn polish(p: &Polynomial, dp: &Polynomial, mut z: Complex<f64>) -> Complex<f64> {
    let mut residual = p.eval_complex(z).norm();
    for _ in 0..POLISH_STEPS {
        let slope = dp.eval_complex(z);
        if residual == 0.0 || slope.norm() == 0.0 {
            break;
        }
        let candidate = z - p.eval_complex(z) / slope;
        let candidate_residual = p.eval_complex(candidate).norm();
        if !(candidate_residual < residual) {
            break;
        }
        z = candidate;
        residual = candidate_residual;
    }
    z
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.degree();
        let mut wrote = false;
        for (idx, &c) in self.coeffs.iter().enumerate() {
            if c == 0.0 && n > 0 {
                continue;
            }
            let power = n - idx;
            if wrote {
                write!(f, " {} ", if c < 0.0 { '-' } else { '+' })?;
            } else if c < 0.0 {
                write!(f, "-")?;
            }
            let mag = c.abs();
            match power {
                0 => write!(f, "{mag}")?,
                1 if mag == 1.0 => write!(f, "s")?,
                1 => write!(f, "{mag} s")?,
                _ if mag == 1.0 => write!(f, "s^{power}")?,
                _ => write!(f, "{mag} s^{power}")?,
            }
            wrote = true;
        }
        if !wrote {
            write!(f, "0")?;
        }
        Ok(())
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        let len = self.coeffs.len().max(rhs.coeffs.len());
        let mut out = vec![0.0; len];
        for (dst, &c) in out[len - self.coeffs.len()..].iter_mut().zip(&self.coeffs) {
            *dst += c;
        }
        for (dst, &c) in out[len - rhs.coeffs.len()..].iter_mut().zip(&rhs.coeffs) {
            *dst += c;
        }
        Polynomial::new(&out)
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        self + &(-rhs)
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &Polynomial) -> Polynomial {
        let mut out = vec![0.0; self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, &a) in self.coeffs.iter().enumerate() {
            for (j, &b) in rhs.coeffs.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        Polynomial::new(&out)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}
