//! Time-domain step response
//!
//! The transfer function is realized in controllable canonical form and
//! discretized exactly under a zero-order hold, so a unit step input is
//! propagated without integration error:
//!
//!   exp([[A, B], [0, 0]] dt) = [[Ad, Bd], [0, 1]]
//!   x[k+1] = Ad x[k] + Bd,  y[k] = C x[k] + D

use nalgebra::{DMatrix, DVector, RowDVector};
use serde::{Deserialize, Serialize};

use crate::tf::TransferFunction;
use crate::ControlError;

/// Band around the final value used for settling time.
const SETTLING_BAND: f64 = 0.02;

/// Sampling of simulated responses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    /// Number of uniformly spaced samples from `t = 0` to the horizon, inclusive
    pub samples: usize,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self { samples: 1000 }
    }
}

impl SimulationOptions {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.samples < 2 {
            return Err(ControlError::InvalidConfig(
                "simulation samples must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// State-space realization `dx/dt = A x + B u, y = C x + D u`
#[derive(Debug, Clone)]
pub struct StateSpace {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub c: RowDVector<f64>,
    pub d: f64,
}

impl StateSpace {
    /// Controllable canonical form of a proper transfer function.
    pub fn from_transfer_function(tf: &TransferFunction) -> Result<Self, ControlError> {
        if !tf.is_proper() {
            return Err(ControlError::Improper {
                num: tf.num().degree(),
                den: tf.den().degree(),
            });
        }

        let lead = tf.den().leading();
        let den: Vec<f64> = tf.den().coeffs().iter().map(|&c| c / lead).collect();
        let n = den.len() - 1;

        // Numerator padded to the denominator length.
        let mut num = vec![0.0; n + 1];
        let raw = tf.num().coeffs();
        for (dst, &c) in num[n + 1 - raw.len()..].iter_mut().zip(raw) {
            *dst = c / lead;
        }

        // Strip the feedthrough so the remainder is strictly proper.
        let d = num[0];
        let c_coeffs: Vec<f64> = (1..=n).map(|i| num[i] - d * den[i]).collect();

        let a = DMatrix::from_fn(n, n, |row, col| {
            if row == 0 {
                -den[col + 1]
            } else if row == col + 1 {
                1.0
            } else {
                0.0
            }
        });
        let mut b = DVector::zeros(n);
        if n > 0 {
            b[0] = 1.0;
        }
        let c = RowDVector::from_vec(c_coeffs);

        Ok(Self { a, b, c, d })
    }

    pub fn order(&self) -> usize {
        self.a.nrows()
    }

    /// Zero-order-hold discretization `(Ad, Bd)` for step `dt`.
    pub fn discretize(&self, dt: f64) -> (DMatrix<f64>, DVector<f64>) {
        let n = self.order();
        let mut augmented = DMatrix::zeros(n + 1, n + 1);
        augmented.view_mut((0, 0), (n, n)).copy_from(&(&self.a * dt));
        augmented.view_mut((0, n), (n, 1)).copy_from(&(&self.b * dt));

        let transition = augmented.exp();
        let ad = transition.view((0, 0), (n, n)).into_owned();
        let bd = transition.view((0, n), (n, 1)).column(0).into_owned();
        (ad, bd)
    }
}

/// Sampled response, time ascending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTrace {
    /// [s]
    pub time: Vec<f64>,
    pub output: Vec<f64>,
}

impl StepTrace {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn last_value(&self) -> f64 {
        self.output.last().copied().unwrap_or(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.output.iter().all(|y| y.is_finite())
    }

    /// Value of the sample closest to `t`.
    pub fn value_at(&self, t: f64) -> Option<f64> {
        let idx = self.time.partition_point(|&ti| ti < t);
        match (idx.checked_sub(1), self.time.get(idx)) {
            (Some(prev), Some(&next)) if t - self.time[prev] < next - t => Some(self.output[prev]),
            (_, Some(_)) => Some(self.output[idx]),
            (Some(prev), None) => Some(self.output[prev]),
            (None, None) => None,
        }
    }
}

/// Unit-step response of `tf` over `[0, horizon]`.
pub fn step_response(
    tf: &TransferFunction,
    horizon: f64,
    options: &SimulationOptions,
) -> Result<StepTrace, ControlError> {
    if !(horizon.is_finite() && horizon > 0.0) {
        return Err(ControlError::InvalidParameter {
            name: "horizon",
            value: horizon,
            reason: "must be finite and > 0",
        });
    }
    options.validate()?;

    let ss = StateSpace::from_transfer_function(tf)?;
    let samples = options.samples;
    let dt = horizon / (samples - 1) as f64;
    let time: Vec<f64> = (0..samples).map(|i| i as f64 * dt).collect();

    let output = if ss.order() == 0 {
        vec![ss.d; samples]
    } else {
        let (ad, bd) = ss.discretize(dt);
        let mut x = DVector::zeros(ss.order());
        let mut output = Vec::with_capacity(samples);
        for _ in 0..samples {
            output.push((&ss.c * &x)[0] + ss.d);
            x = &ad * &x + &bd;
        }
        output
    };

    let trace = StepTrace { time, output };
    if !trace.is_finite() {
        tracing::warn!(system = %tf, horizon, "step response diverged to non-finite values");
    }
    Ok(trace)
}

/// Transient characteristics of a step response
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepMetrics {
    pub steady_state: f64,
    pub peak: f64,
    /// [s]
    pub peak_time: f64,
    /// Peak above steady state [%]
    pub overshoot_percent: f64,
    /// 10 % to 90 % of steady state [s]
    pub rise_time: Option<f64>,
    /// Time after which the response stays within 2 % of steady state [s]
    pub settling_time: Option<f64>,
}

impl StepMetrics {
    /// Metrics against `steady_state`; a non-finite target falls back to the
    /// last sample.
    pub fn from_trace(trace: &StepTrace, steady_state: f64) -> Self {
        let target = if steady_state.is_finite() {
            steady_state
        } else {
            trace.last_value()
        };

        let (peak_idx, peak) = trace
            .output
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .unwrap_or((0, 0.0));
        let peak_time = trace.time.get(peak_idx).copied().unwrap_or(0.0);

        let overshoot_percent = if target != 0.0 {
            ((peak - target) / target.abs() * 100.0).max(0.0)
        } else {
            0.0
        };

        let crossing = |fraction: f64| {
            trace
                .output
                .iter()
                .position(|&y| y * target.signum() >= fraction * target.abs())
                .map(|i| trace.time[i])
        };
        let rise_time = if target != 0.0 {
            match (crossing(0.1), crossing(0.9)) {
                (Some(t10), Some(t90)) => Some(t90 - t10),
                _ => None,
            }
        } else {
            None
        };

        let band = SETTLING_BAND * target.abs().max(f64::EPSILON);
        let settling_time = match trace
            .output
            .iter()
            .rposition(|&y| y.is_nan() || (y - target).abs() > band)
        {
            None => Some(0.0),
            Some(last_out) => trace.time.get(last_out + 1).copied(),
        };

        Self {
            steady_state: target,
            peak,
            peak_time,
            overshoot_percent,
            rise_time,
            settling_time,
        }
    }
}
