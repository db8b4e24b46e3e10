//! Text reporting
//!
//! Margins are printed with three significant figures using C `%g` rules:
//! fixed notation unless the decimal exponent is below -4 or at least the
//! precision, trailing zeros removed.

use serde::Serialize;

use crate::analysis::{Analysis, CompensatorAnalysis};
use crate::margins::StabilityMargins;
use crate::plant::{Compensator, PhaseLead};
use crate::response::StepMetrics;
use crate::sim::DispersionSummary;

/// Significant figures used for every reported number.
pub const REPORT_DIGITS: usize = 3;

/// Format `value` with `digits` significant figures, `%g` style.
pub fn fmt_sig(value: f64, digits: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let precision = digits.max(1);
    // Rounding to `precision` digits can bump the exponent (999.6 -> 1.00e3).
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}"))
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn sig(value: f64) -> String {
    fmt_sig(value, REPORT_DIGITS)
}

/// Gain, phase and delay margin lines.
///
/// A missing crossover prints an infinite margin and `none` for its frequency.
pub fn format_margins(margins: &StabilityMargins) -> [String; 3] {
    let (gm_db, pc) = match margins.gain {
        Some(gm) => (sig(20.0 * gm.margin.log10()), sig(gm.frequency)),
        None => (sig(f64::INFINITY), "none".to_string()),
    };
    let (pm, gc) = match margins.phase {
        Some(pm) => (sig(pm.margin), sig(pm.frequency)),
        None => (sig(f64::INFINITY), "none".to_string()),
    };
    let delay = sig(margins.delay_margin().unwrap_or(f64::INFINITY));

    [
        format!("Gain Margin: {gm_db} dB at frequency {pc} rad/sec"),
        format!("Phase Margin: {pm} deg at frequency {gc} rad/sec"),
        format!("Delay Margin: {delay} seconds"),
    ]
}

/// Legend label of one robustness-sweep cell.
pub fn sweep_label(mass: f64, damping: f64) -> String {
    format!("m = {} - k = {}", sig(mass), sig(damping))
}

/// Machine-readable digest of an analysis run
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub mass: f64,
    pub damping: f64,
    pub compensators: Vec<CompensatorSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompensatorSummary {
    pub name: String,
    pub compensator: Compensator,
    pub open_loop: String,
    pub closed_loop: String,
    pub margins: StabilityMargins,
    pub gain_margin_db: Option<f64>,
    pub delay_margin_s: Option<f64>,
    pub phase_lead: Option<PhaseLead>,
    pub nominal: StepMetrics,
    pub sweep: Vec<SweepRow>,
    pub dispersion: Option<DispersionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRow {
    pub label: String,
    pub mass: f64,
    pub damping: f64,
    pub stable: bool,
    pub metrics: StepMetrics,
}

pub fn summarize(analysis: &Analysis) -> Summary {
    Summary {
        mass: analysis.config.mass,
        damping: analysis.config.damping,
        compensators: analysis.compensators().map(summarize_compensator).collect(),
    }
}

fn summarize_compensator(ca: &CompensatorAnalysis) -> CompensatorSummary {
    CompensatorSummary {
        name: ca.compensator.name().to_string(),
        compensator: ca.compensator,
        open_loop: ca.loops.open_loop.to_string(),
        closed_loop: ca.loops.closed_loop.to_string(),
        margins: ca.margins,
        gain_margin_db: ca.margins.gain_margin_db(),
        delay_margin_s: ca.margins.delay_margin(),
        phase_lead: ca.compensator.max_phase_lead(),
        nominal: ca.nominal_metrics,
        sweep: ca
            .sweep
            .iter()
            .map(|cell| SweepRow {
                label: cell.label.clone(),
                mass: cell.mass,
                damping: cell.damping,
                stable: cell.stable,
                metrics: cell.metrics,
            })
            .collect(),
        dispersion: ca.dispersion.clone(),
    }
}

/// Human-readable report: a heading and the three margin lines per
/// compensator, separated by blank lines.
pub fn render_text(analysis: &Analysis) -> String {
    let mut lines = Vec::new();
    for ca in analysis.compensators() {
        lines.push(ca.compensator.name().to_string());
        lines.extend(format_margins(&ca.margins));
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margins::Crossover;

    #[test]
    fn test_fmt_sig_fixed() {
        assert_eq!(fmt_sig(58.47, 3), "58.5");
        assert_eq!(fmt_sig(0.030683, 3), "0.0307");
        assert_eq!(fmt_sig(33.26, 3), "33.3");
        assert_eq!(fmt_sig(1.0, 3), "1");
        assert_eq!(fmt_sig(100.0, 3), "100");
        assert_eq!(fmt_sig(0.25, 3), "0.25");
        assert_eq!(fmt_sig(-1.646, 3), "-1.65");
        assert_eq!(fmt_sig(0.0001234, 3), "0.000123");
    }

    #[test]
    fn test_fmt_sig_scientific() {
        assert_eq!(fmt_sig(1234.0, 3), "1.23e+03");
        assert_eq!(fmt_sig(0.00001234, 3), "1.23e-05");
        assert_eq!(fmt_sig(999.6, 3), "1e+03");
        assert_eq!(fmt_sig(2.0e10, 3), "2e+10");
    }

    #[test]
    fn test_fmt_sig_special() {
        assert_eq!(fmt_sig(0.0, 3), "0");
        assert_eq!(fmt_sig(f64::INFINITY, 3), "inf");
        assert_eq!(fmt_sig(f64::NEG_INFINITY, 3), "-inf");
        assert_eq!(fmt_sig(f64::NAN, 3), "nan");
    }

    #[test]
    fn test_format_margins() {
        let margins = StabilityMargins {
            gain: Some(Crossover {
                margin: 6.0,
                frequency: 2.0_f64.sqrt(),
            }),
            phase: Some(Crossover {
                margin: 53.4,
                frequency: 0.446,
            }),
        };
        let lines = format_margins(&margins);
        assert_eq!(lines[0], "Gain Margin: 15.6 dB at frequency 1.41 rad/sec");
        assert_eq!(lines[1], "Phase Margin: 53.4 deg at frequency 0.446 rad/sec");
        assert_eq!(lines[2], "Delay Margin: 2.09 seconds");
    }

    #[test]
    fn test_format_missing_margins() {
        let margins = StabilityMargins {
            gain: None,
            phase: None,
        };
        let lines = format_margins(&margins);
        assert_eq!(lines[0], "Gain Margin: inf dB at frequency none rad/sec");
        assert_eq!(lines[1], "Phase Margin: inf deg at frequency none rad/sec");
        assert_eq!(lines[2], "Delay Margin: inf seconds");
    }

    #[test]
    fn test_sweep_label() {
        assert_eq!(sweep_label(5.0, 0.25), "m = 5 - k = 0.25");
        assert_eq!(sweep_label(15.0, 0.75), "m = 15 - k = 0.75");
    }
}
