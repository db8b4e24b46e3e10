//! Frequency-domain loop analysis
//!
//! Gain, phase and delay margins, Bode samples and root-locus branches for an
//! open-loop transfer function `L(s)`.
//!
//! Crossover frequencies are found exactly as positive real roots of
//! polynomials in `ω` rather than by scanning a frequency grid:
//!
//! * gain crossover: `|N(jω)|^2 - |D(jω)|^2 = 0`
//! * phase crossover: `Im(N(jω) conj(D(jω))) = 0` with `Re L(jω) < 0`

use nalgebra::Complex;
use serde::{Deserialize, Serialize};

use crate::poly::Polynomial;
use crate::tf::TransferFunction;
use crate::ControlError;

/// Relative imaginary part below which a root counts as real.
const REAL_ROOT_TOL: f64 = 1.0e-7;
/// Roots closer than this (relative) are merged.
const DUPLICATE_ROOT_TOL: f64 = 1.0e-9;

/// A margin and the frequency where it is measured
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Crossover {
    pub margin: f64,
    /// [rad/s]
    pub frequency: f64,
}

/// Classical stability margins of a unity-feedback loop.
///
/// `None` means the corresponding crossover does not exist, i.e. the margin is
/// infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityMargins {
    /// Linear gain margin at the phase-crossover frequency
    pub gain: Option<Crossover>,
    /// Phase margin [deg] at the gain-crossover frequency
    pub phase: Option<Crossover>,
}

impl StabilityMargins {
    /// Gain margin in decibels, `20 log10(gm)`.
    pub fn gain_margin_db(&self) -> Option<f64> {
        self.gain.map(|gm| 20.0 * gm.margin.log10())
    }

    /// Delay margin [s], `pm [rad] / ω_gc`.
    pub fn delay_margin(&self) -> Option<f64> {
        self.phase.map(|pm| pm.margin.to_radians() / pm.frequency)
    }
}

pub fn stability_margins(open_loop: &TransferFunction) -> Result<StabilityMargins, ControlError> {
    let (n_re, n_im) = open_loop.num().split_imaginary_axis();
    let (d_re, d_im) = open_loop.den().split_imaginary_axis();

    let magnitude_diff = (&(&n_re * &n_re) + &(&n_im * &n_im))
        .cancelling_sub(&(&(&d_re * &d_re) + &(&d_im * &d_im)));
    let cross_im = (&n_im * &d_re).cancelling_sub(&(&n_re * &d_im));

    let gain_crossovers = positive_real_roots(&magnitude_diff)?;
    let phase_crossovers: Vec<f64> = positive_real_roots(&cross_im)?
        .into_iter()
        .filter(|&w| open_loop.freq_response(w).re < 0.0)
        .collect();

    tracing::debug!(?gain_crossovers, ?phase_crossovers, "loop crossovers");

    let gain = phase_crossovers
        .iter()
        .map(|&w| Crossover {
            margin: 1.0 / open_loop.freq_response(w).norm(),
            frequency: w,
        })
        .min_by(|a, b| a.margin.ln().abs().total_cmp(&b.margin.ln().abs()));

    let phase = gain_crossovers
        .iter()
        .map(|&w| Crossover {
            margin: open_loop.freq_response(w).arg().to_degrees().rem_euclid(360.0) - 180.0,
            frequency: w,
        })
        .min_by(|a, b| a.margin.abs().total_cmp(&b.margin.abs()));

    Ok(StabilityMargins { gain, phase })
}

/// Strictly positive real roots, ascending and de-duplicated.
///
/// `|N|^2 - |D|^2` is even in `ω` and `Im(N conj D)` is odd, so their roots
/// come in `±` pairs. Solving for `x = ω^2` instead halves the degree and
/// removes the pairing.
fn positive_real_roots(p: &Polynomial) -> Result<Vec<f64>, ControlError> {
    if p.is_zero() {
        return Ok(Vec::new());
    }
    let (even, odd) = p.split_parity();
    let mut roots: Vec<f64> = if odd.is_zero() || even.is_zero() {
        let reduced = if odd.is_zero() { even } else { odd };
        if reduced.degree() == 0 {
            return Ok(Vec::new());
        }
        real_positive(reduced.roots()?).map(f64::sqrt).collect()
    } else {
        real_positive(p.roots()?).collect()
    };
    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() <= DUPLICATE_ROOT_TOL * b.abs().max(1.0));
    Ok(roots)
}

fn real_positive(roots: Vec<Complex<f64>>) -> impl Iterator<Item = f64> {
    roots
        .into_iter()
        .filter(|r| r.re > 0.0 && r.im.abs() <= REAL_ROOT_TOL * r.re.max(1.0))
        .map(|r| r.re)
}

/// Log-spaced sample grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogGrid {
    pub start: f64,
    pub stop: f64,
    pub points: usize,
}

impl LogGrid {
    pub fn validate(&self, name: &str) -> Result<(), ControlError> {
        if !(self.start.is_finite() && self.stop.is_finite() && self.start > 0.0) {
            return Err(ControlError::InvalidConfig(format!(
                "{name}: start and stop must be finite and > 0"
            )));
        }
        if self.stop <= self.start {
            return Err(ControlError::InvalidConfig(format!(
                "{name}: stop must be greater than start"
            )));
        }
        if self.points < 2 {
            return Err(ControlError::InvalidConfig(format!(
                "{name}: points must be at least 2"
            )));
        }
        Ok(())
    }

    pub fn values(&self) -> Vec<f64> {
        let log_start = self.start.log10();
        let step = (self.stop.log10() - log_start) / (self.points - 1) as f64;
        (0..self.points)
            .map(|i| 10f64.powf(log_start + i as f64 * step))
            .collect()
    }

    /// Default Bode range [rad/s].
    pub fn default_frequencies() -> Self {
        Self {
            start: 1.0e-3,
            stop: 1.0e2,
            points: 500,
        }
    }

    /// Default root-locus gain sweep, relative to the designed loop gain.
    pub fn default_gains() -> Self {
        Self {
            start: 1.0e-3,
            stop: 1.0e3,
            points: 400,
        }
    }
}

/// Magnitude and phase of `L(jω)` on a frequency grid
#[derive(Debug, Clone, Serialize)]
pub struct BodeResponse {
    /// [rad/s]
    pub frequency: Vec<f64>,
    /// [dB]
    pub magnitude_db: Vec<f64>,
    /// Unwrapped phase [deg]
    pub phase_deg: Vec<f64>,
}

pub fn bode(open_loop: &TransferFunction, grid: &LogGrid) -> Result<BodeResponse, ControlError> {
    grid.validate("bode frequencies")?;
    let frequency = grid.values();
    let mut magnitude_db = Vec::with_capacity(frequency.len());
    let mut phase_deg = Vec::with_capacity(frequency.len());

    let mut previous: Option<f64> = None;
    for &w in &frequency {
        let response = open_loop.freq_response(w);
        magnitude_db.push(20.0 * response.norm().log10());

        let mut phase = response.arg().to_degrees();
        if let Some(prev) = previous {
            phase += 360.0 * ((prev - phase) / 360.0).round();
        }
        phase_deg.push(phase);
        previous = Some(phase);
    }

    Ok(BodeResponse {
        frequency,
        magnitude_db,
        phase_deg,
    })
}

/// Closed-loop pole locations as the loop gain is scaled by `K`
#[derive(Debug, Clone)]
pub struct RootLocus {
    pub open_loop_poles: Vec<Complex<f64>>,
    pub open_loop_zeros: Vec<Complex<f64>>,
    /// Closed-loop poles at the designed gain (`K = 1`)
    pub design_poles: Vec<Complex<f64>>,
    pub gains: Vec<f64>,
    /// `poles[i]` are the roots of `D + gains[i] N`
    pub poles: Vec<Vec<Complex<f64>>>,
}

pub fn root_locus(open_loop: &TransferFunction, gains: &LogGrid) -> Result<RootLocus, ControlError> {
    gains.validate("root-locus gains")?;
    let gain_values = gains.values();
    let poles = gain_values
        .iter()
        .map(|&k| open_loop.closed_loop_poles(k))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RootLocus {
        open_loop_poles: open_loop.poles()?,
        open_loop_zeros: open_loop.zeros()?,
        design_poles: open_loop.closed_loop_poles(1.0)?,
        gains: gain_values,
        poles,
    })
}
