//! Simulation harness for robustness studies
//!
//! Rebuilds the plant for each `(m, k)` pair, closes the loop around a fixed
//! compensator and simulates the step response. Each cell is a pure function
//! of its inputs.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::loops::LoopSystems;
use crate::plant::{plant, Compensator};
use crate::report::sweep_label;
use crate::response::{step_response, SimulationOptions, StepMetrics, StepTrace};
use crate::ControlError;

/// One cell of a robustness sweep
#[derive(Debug, Clone)]
pub struct SweepTrace {
    pub mass: f64,
    pub damping: f64,
    pub label: String,
    pub trace: StepTrace,
    pub metrics: StepMetrics,
    pub stable: bool,
}

/// Closed-loop step response of `compensator` around `P(s) = 1/(s(ms+k))`.
pub fn simulate(
    mass: f64,
    damping: f64,
    compensator: &Compensator,
    horizon: f64,
    options: &SimulationOptions,
) -> Result<SweepTrace, ControlError> {
    let loops = LoopSystems::new(compensator.transfer_function()?, plant(mass, damping)?)?;
    let stable = loops.is_stable()?;
    let trace = step_response(&loops.closed_loop, horizon, options)?;
    let metrics = StepMetrics::from_trace(&trace, loops.closed_loop.dc_gain());

    tracing::debug!(
        compensator = compensator.slug(),
        mass,
        damping,
        stable,
        settling_time = ?metrics.settling_time,
        "simulated sweep cell"
    );

    Ok(SweepTrace {
        mass,
        damping,
        label: sweep_label(mass, damping),
        trace,
        metrics,
        stable,
    })
}

/// Cartesian product `masses x dampings`, masses outermost.
pub fn robustness_sweep(
    compensator: &Compensator,
    masses: &[f64],
    dampings: &[f64],
    horizon: f64,
    options: &SimulationOptions,
) -> Result<Vec<SweepTrace>, ControlError> {
    let mut cells = Vec::with_capacity(masses.len() * dampings.len());
    for &mass in masses {
        for &damping in dampings {
            cells.push(simulate(mass, damping, compensator, horizon, options)?);
        }
    }
    Ok(cells)
}

/// Random plant dispersion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionConfig {
    /// Number of random plants; 0 disables the study
    pub runs: usize,
    pub seed: u64,
    /// Uniform mass bounds [kg]
    pub mass_range: [f64; 2],
    /// Uniform damping bounds [N s/m]
    pub damping_range: [f64; 2],
}

impl Default for DispersionConfig {
    fn default() -> Self {
        Self {
            runs: 200,
            seed: 2026,
            mass_range: [5.0, 15.0],
            damping_range: [0.25, 0.75],
        }
    }
}

impl DispersionConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        for (name, [lo, hi]) in [
            ("mass_range", self.mass_range),
            ("damping_range", self.damping_range),
        ] {
            if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && hi > lo) {
                return Err(ControlError::InvalidConfig(format!(
                    "dispersion {name} must satisfy 0 < lo < hi, got [{lo}, {hi}]"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate outcome of a dispersion study
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispersionSummary {
    pub runs: usize,
    pub seed: u64,
    pub stable_runs: usize,
    pub settled_runs: usize,
    /// Mean settling time over runs that settled within the horizon [s]
    pub mean_settling_time: Option<f64>,
    pub worst_settling_time: Option<f64>,
    pub worst_overshoot_percent: f64,
}

/// Step responses for `config.runs` plants drawn uniformly from the configured
/// ranges. The same seed always draws the same plants.
pub fn monte_carlo(
    compensator: &Compensator,
    config: &DispersionConfig,
    horizon: f64,
    options: &SimulationOptions,
) -> Result<DispersionSummary, ControlError> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mass_dist = Uniform::new(config.mass_range[0], config.mass_range[1]);
    let damping_dist = Uniform::new(config.damping_range[0], config.damping_range[1]);

    let mut stable_runs = 0;
    let mut settling_times = Vec::with_capacity(config.runs);
    let mut worst_overshoot_percent = 0.0_f64;

    for _ in 0..config.runs {
        let mass = mass_dist.sample(&mut rng);
        let damping = damping_dist.sample(&mut rng);
        let cell = simulate(mass, damping, compensator, horizon, options)?;

        if cell.stable {
            stable_runs += 1;
        }
        if let Some(ts) = cell.metrics.settling_time {
            settling_times.push(ts);
        }
        worst_overshoot_percent = worst_overshoot_percent.max(cell.metrics.overshoot_percent);
    }

    let settled_runs = settling_times.len();
    let mean_settling_time =
        (settled_runs > 0).then(|| settling_times.iter().sum::<f64>() / settled_runs as f64);
    // Any unsettled run makes the worst case unbounded within the horizon.
    let worst_settling_time = if settled_runs == config.runs && settled_runs > 0 {
        settling_times.iter().copied().reduce(f64::max)
    } else {
        None
    };

    tracing::info!(
        compensator = compensator.slug(),
        runs = config.runs,
        stable_runs,
        settled_runs,
        "dispersion study complete"
    );

    Ok(DispersionSummary {
        runs: config.runs,
        seed: config.seed,
        stable_runs,
        settled_runs,
        mean_settling_time,
        worst_settling_time,
        worst_overshoot_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const MASSES: [f64; 3] = [5.0, 10.0, 15.0];
    const DAMPINGS: [f64; 3] = [0.25, 0.5, 0.75];

    fn lead() -> Compensator {
        Compensator::Lead {
            kl: 0.4,
            tau_p: 1.0,
            tau_z: 18.0,
        }
    }

    #[test]
    fn test_sweep_completeness() {
        let opts = SimulationOptions { samples: 200 };
        for (c, horizon) in [(Compensator::Proportional { kp: 0.018 }, 250.0), (lead(), 40.0)] {
            let cells = robustness_sweep(&c, &MASSES, &DAMPINGS, horizon, &opts).unwrap();
            assert_eq!(cells.len(), 9);

            let labels: HashSet<&str> = cells.iter().map(|cell| cell.label.as_str()).collect();
            assert_eq!(labels.len(), 9);

            let pairs: HashSet<(u64, u64)> = cells
                .iter()
                .map(|cell| (cell.mass.to_bits(), cell.damping.to_bits()))
                .collect();
            assert_eq!(pairs.len(), 9);

            for cell in &cells {
                assert_eq!(cell.trace.len(), 200);
                assert!(cell.stable);
                assert!(cell.trace.is_finite());
            }
        }
    }

    #[test]
    fn test_sweep_order_and_labels() {
        let opts = SimulationOptions { samples: 50 };
        let cells = robustness_sweep(&lead(), &MASSES, &DAMPINGS, 40.0, &opts).unwrap();
        assert_eq!(cells[0].label, "m = 5 - k = 0.25");
        assert_eq!(cells[1].label, "m = 5 - k = 0.5");
        assert_eq!(cells[8].label, "m = 15 - k = 0.75");
    }

    #[test]
    fn test_simulate_is_pure() {
        let opts = SimulationOptions::default();
        let a = simulate(10.0, 0.5, &lead(), 40.0, &opts).unwrap();
        let b = simulate(10.0, 0.5, &lead(), 40.0, &opts).unwrap();
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_monte_carlo_reproducible() {
        let cfg = DispersionConfig {
            runs: 12,
            ..Default::default()
        };
        let opts = SimulationOptions { samples: 200 };
        let a = monte_carlo(&lead(), &cfg, 40.0, &opts).unwrap();
        let b = monte_carlo(&lead(), &cfg, 40.0, &opts).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.runs, 12);
        assert_eq!(a.stable_runs, 12);
    }

    #[test]
    fn test_dispersion_validation() {
        let cfg = DispersionConfig {
            mass_range: [15.0, 5.0],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
