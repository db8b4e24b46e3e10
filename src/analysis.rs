//! End-to-end comparison of the proportional and lead designs
//!
//! For each compensator: loop formation, stability margins, Bode and root
//! locus data, nominal step responses of position and force, the parametric
//! robustness sweep and, when enabled, a random dispersion study.

use crate::config::AnalysisConfig;
use crate::loops::LoopSystems;
use crate::margins::{bode, root_locus, stability_margins, BodeResponse, RootLocus, StabilityMargins};
use crate::plant::{plant, Compensator};
use crate::response::{step_response, StepMetrics, StepTrace};
use crate::sim::{monte_carlo, robustness_sweep, DispersionSummary, SweepTrace};
use crate::ControlError;

/// Everything computed for one compensator
#[derive(Debug, Clone)]
pub struct CompensatorAnalysis {
    pub compensator: Compensator,
    pub loops: LoopSystems,
    pub margins: StabilityMargins,
    pub bode: BodeResponse,
    pub root_locus: RootLocus,
    /// Position step response [m]
    pub nominal_output: StepTrace,
    /// Control force for the same step [N]
    pub nominal_effort: StepTrace,
    pub nominal_metrics: StepMetrics,
    pub sweep: Vec<SweepTrace>,
    pub sweep_horizon: f64,
    pub dispersion: Option<DispersionSummary>,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub config: AnalysisConfig,
    pub proportional: CompensatorAnalysis,
    pub lead: CompensatorAnalysis,
}

impl Analysis {
    /// Proportional first, then lead.
    pub fn compensators(&self) -> impl Iterator<Item = &CompensatorAnalysis> {
        [&self.proportional, &self.lead].into_iter()
    }
}

pub fn run_analysis(cfg: &AnalysisConfig) -> Result<Analysis, ControlError> {
    cfg.validate()?;
    let proportional = analyze_compensator(cfg, cfg.proportional(), cfg.proportional_sweep_horizon)?;
    let lead = analyze_compensator(cfg, cfg.lead(), cfg.lead_sweep_horizon)?;
    Ok(Analysis {
        config: cfg.clone(),
        proportional,
        lead,
    })
}

fn analyze_compensator(
    cfg: &AnalysisConfig,
    compensator: Compensator,
    sweep_horizon: f64,
) -> Result<CompensatorAnalysis, ControlError> {
    let loops = LoopSystems::new(compensator.transfer_function()?, plant(cfg.mass, cfg.damping)?)?;

    let margins = stability_margins(&loops.open_loop)?;
    tracing::info!(
        compensator = compensator.slug(),
        gain_margin_db = ?margins.gain_margin_db(),
        phase_margin_deg = ?margins.phase.map(|c| c.margin),
        delay_margin_s = ?margins.delay_margin(),
        "computed stability margins"
    );

    let bode = bode(&loops.open_loop, &cfg.frequencies)?;
    let root_locus = root_locus(&loops.open_loop, &cfg.gains)?;

    let nominal_output = step_response(&loops.closed_loop, cfg.nominal_horizon, &cfg.simulation)?;
    let nominal_effort = step_response(&loops.effort, cfg.nominal_horizon, &cfg.simulation)?;
    let nominal_metrics = StepMetrics::from_trace(&nominal_output, loops.closed_loop.dc_gain());
    tracing::info!(
        compensator = compensator.slug(),
        overshoot_percent = nominal_metrics.overshoot_percent,
        settling_time_s = ?nominal_metrics.settling_time,
        "nominal step response"
    );

    let sweep = robustness_sweep(
        &compensator,
        &cfg.masses,
        &cfg.dampings,
        sweep_horizon,
        &cfg.simulation,
    )?;
    tracing::info!(
        compensator = compensator.slug(),
        cells = sweep.len(),
        unstable = sweep.iter().filter(|cell| !cell.stable).count(),
        "robustness sweep complete"
    );

    let dispersion = if cfg.dispersion.runs > 0 {
        let summary = monte_carlo(&compensator, &cfg.dispersion, sweep_horizon, &cfg.simulation)?;
        tracing::info!(
            compensator = compensator.slug(),
            stable_runs = summary.stable_runs,
            worst_settling_time_s = ?summary.worst_settling_time,
            worst_overshoot_percent = summary.worst_overshoot_percent,
            "dispersion summary"
        );
        Some(summary)
    } else {
        None
    };

    Ok(CompensatorAnalysis {
        compensator,
        loops,
        margins,
        bode,
        root_locus,
        nominal_output,
        nominal_effort,
        nominal_metrics,
        sweep,
        sweep_horizon,
        dispersion,
    })
}
