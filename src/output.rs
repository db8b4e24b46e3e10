use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use nalgebra::Complex;
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Serialize;

use crate::analysis::{Analysis, CompensatorAnalysis};
use crate::response::StepTrace;

const FIGURE_SIZE: (u32, u32) = (1280, 720);
const TALL_FIGURE_SIZE: (u32, u32) = (1280, 960);

#[derive(Debug, Clone, Serialize)]
pub struct FigureFiles {
    pub output_dir: PathBuf,
    pub root_locus_proportional: PathBuf,
    pub root_locus_lead: PathBuf,
    pub bode_proportional: PathBuf,
    pub bode_lead: PathBuf,
    pub step_nominal: PathBuf,
    pub robustness_proportional: PathBuf,
    pub robustness_lead: PathBuf,
}

impl FigureFiles {
    pub fn in_dir(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            root_locus_proportional: output_dir.join("root_locus_proportional.svg"),
            root_locus_lead: output_dir.join("root_locus_lead.svg"),
            bode_proportional: output_dir.join("bode_proportional.svg"),
            bode_lead: output_dir.join("bode_lead.svg"),
            step_nominal: output_dir.join("step_nominal.svg"),
            robustness_proportional: output_dir.join("robustness_proportional.svg"),
            robustness_lead: output_dir.join("robustness_lead.svg"),
        }
    }

    pub fn paths(&self) -> [&Path; 7] {
        [
            &self.root_locus_proportional,
            &self.root_locus_lead,
            &self.bode_proportional,
            &self.bode_lead,
            &self.step_nominal,
            &self.robustness_proportional,
            &self.robustness_lead,
        ]
    }
}

/// Fresh `<base>/<YYYYmmdd-HHMMSS>` directory, suffixed `-NN` on collision.
pub fn create_timestamped_run_dir(base_dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(base_dir)
        .with_context(|| format!("failed to create output base directory {}", base_dir.display()))?;

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let run_dir = base_dir.join(&timestamp);
    if !run_dir.exists() {
        fs::create_dir_all(&run_dir)?;
        return Ok(run_dir);
    }

    let mut counter: usize = 1;
    loop {
        let candidate = base_dir.join(format!("{timestamp}-{counter:02}"));
        if !candidate.exists() {
            fs::create_dir_all(&candidate)?;
            return Ok(candidate);
        }
        counter += 1;
    }
}

pub fn make_plots(analysis: &Analysis, output_dir: &Path) -> anyhow::Result<FigureFiles> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create figure directory {}", output_dir.display()))?;
    let files = FigureFiles::in_dir(output_dir);

    plot_root_locus(&analysis.proportional, &files.root_locus_proportional)?;
    plot_root_locus(&analysis.lead, &files.root_locus_lead)?;
    plot_bode(&analysis.proportional, &files.bode_proportional)?;
    plot_bode(&analysis.lead, &files.bode_lead)?;
    plot_nominal_step(analysis, &files.step_nominal)?;
    plot_robustness(&analysis.proportional, &files.robustness_proportional)?;
    plot_robustness(&analysis.lead, &files.robustness_lead)?;

    tracing::info!(dir = %output_dir.display(), "figures written");
    Ok(files)
}

fn plot_root_locus(ca: &CompensatorAnalysis, path: &Path) -> anyhow::Result<()> {
    let rl = &ca.root_locus;
    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let all_points = rl
        .poles
        .iter()
        .flatten()
        .chain(&rl.open_loop_poles)
        .chain(&rl.open_loop_zeros)
        .chain(&rl.design_poles);
    let re_range = padded_range(all_points.clone().map(|p| p.re));
    let im_range = padded_range(all_points.map(|p| p.im));

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Root locus - {}", ca.compensator.name()),
            ("sans-serif", 34).into_font(),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(re_range, im_range)?;

    chart
        .configure_mesh()
        .x_desc("Real axis [1/s]")
        .y_desc("Imaginary axis [1/s]")
        .draw()?;

    let branch = BLUE.mix(0.6);
    chart
        .draw_series(
            rl.poles
                .iter()
                .flatten()
                .map(|p| Circle::new((p.re, p.im), 2, branch.filled())),
        )?
        .label("Closed-loop poles, K sweep")
        .legend(move |(x, y)| Circle::new((x + 12, y), 3, branch.filled()));

    chart
        .draw_series(marker_points(&rl.open_loop_poles).map(|p| Cross::new(p, 7, RED.stroke_width(2))))?
        .label("Open-loop poles")
        .legend(|(x, y)| Cross::new((x + 12, y), 5, RED.stroke_width(2)));

    if !rl.open_loop_zeros.is_empty() {
        chart
            .draw_series(
                marker_points(&rl.open_loop_zeros).map(|p| Circle::new(p, 7, GREEN.stroke_width(2))),
            )?
            .label("Open-loop zeros")
            .legend(|(x, y)| Circle::new((x + 12, y), 5, GREEN.stroke_width(2)));
    }

    chart
        .draw_series(marker_points(&rl.design_poles).map(|p| Circle::new(p, 6, BLACK.filled())))?
        .label("Designed closed-loop poles")
        .legend(|(x, y)| Circle::new((x + 12, y), 4, BLACK.filled()));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .border_style(BLACK)
        .background_style(WHITE.mix(0.7))
        .draw()?;

    root.present()?;
    Ok(())
}

fn plot_bode(ca: &CompensatorAnalysis, path: &Path) -> anyhow::Result<()> {
    let bode = &ca.bode;
    let root = SVGBackend::new(path, TALL_FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!("Bode diagram - {}", ca.compensator.name()),
        ("sans-serif", 34).into_font(),
    )?;
    let panels = root.split_evenly((2, 1));

    let w_range = bode_frequency_range(&bode.frequency);
    let magnitude: Vec<(f64, f64)> = finite_pairs(&bode.frequency, &bode.magnitude_db);
    let phase: Vec<(f64, f64)> = finite_pairs(&bode.frequency, &bode.phase_deg);

    let mut mag_chart = ChartBuilder::on(&panels[0])
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(
            w_range.clone().log_scale(),
            padded_range(magnitude.iter().map(|p| p.1)),
        )?;
    mag_chart
        .configure_mesh()
        .x_desc("Frequency [rad/s]")
        .y_desc("Magnitude [dB]")
        .draw()?;
    mag_chart
        .draw_series(LineSeries::new(magnitude, &BLUE))?
        .label("Open-loop magnitude")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], BLUE.stroke_width(3)));
    // 0 dB reference
    mag_chart.draw_series(LineSeries::new(
        [(w_range.start, 0.0), (w_range.end, 0.0)],
        BLACK.mix(0.5),
    ))?;

    let mut phase_chart = ChartBuilder::on(&panels[1])
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(
            w_range.clone().log_scale(),
            padded_range(phase.iter().map(|p| p.1).chain([-180.0])),
        )?;
    phase_chart
        .configure_mesh()
        .x_desc("Frequency [rad/s]")
        .y_desc("Phase [deg]")
        .draw()?;
    phase_chart
        .draw_series(LineSeries::new(phase, &BLUE))?
        .label("Open-loop phase")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], BLUE.stroke_width(3)));
    phase_chart.draw_series(LineSeries::new(
        [(w_range.start, -180.0), (w_range.end, -180.0)],
        BLACK.mix(0.5),
    ))?;

    if let Some(pm) = ca.margins.phase {
        mag_chart
            .draw_series(std::iter::once(Circle::new((pm.frequency, 0.0), 5, RED.filled())))?
            .label(format!("Gain crossover, PM = {:.1} deg", pm.margin))
            .legend(|(x, y)| Circle::new((x + 12, y), 4, RED.filled()));
    }
    if let Some(gm) = ca.margins.gain {
        phase_chart
            .draw_series(std::iter::once(Circle::new((gm.frequency, -180.0), 5, RED.filled())))?
            .label(format!("Phase crossover, GM = {:.1} dB", 20.0 * gm.margin.log10()))
            .legend(|(x, y)| Circle::new((x + 12, y), 4, RED.filled()));
    }
    mag_chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .border_style(BLACK)
        .background_style(WHITE.mix(0.7))
        .draw()?;
    phase_chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .border_style(BLACK)
        .background_style(WHITE.mix(0.7))
        .draw()?;

    root.present()?;
    Ok(())
}

fn plot_nominal_step(analysis: &Analysis, path: &Path) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, TALL_FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled("Step response - nominal", ("sans-serif", 34).into_font())?;
    let panels = root.split_evenly((2, 1));

    let series = [(&analysis.proportional, BLUE), (&analysis.lead, RED)];

    draw_trace_panel(
        &panels[0],
        "Position [m]",
        series.iter().map(|(ca, color)| (ca.compensator.name(), &ca.nominal_output, *color)),
    )?;
    draw_trace_panel(
        &panels[1],
        "Force [N]",
        series.iter().map(|(ca, color)| (ca.compensator.name(), &ca.nominal_effort, *color)),
    )?;

    root.present()?;
    Ok(())
}

fn plot_robustness(ca: &CompensatorAnalysis, path: &Path) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!("Step response - {} - Robustness", ca.compensator.name()),
        ("sans-serif", 34).into_font(),
    )?;

    draw_trace_panel(
        &root,
        "Position [m]",
        ca.sweep.iter().enumerate().map(|(i, cell)| {
            (cell.label.as_str(), &cell.trace, Palette99::pick(i).to_rgba())
        }),
    )?;

    root.present()?;
    Ok(())
}

fn draw_trace_panel<'a, C>(
    area: &DrawingArea<SVGBackend, Shift>,
    y_desc: &str,
    traces: impl Iterator<Item = (&'a str, &'a StepTrace, C)> + Clone,
) -> anyhow::Result<()>
where
    C: Color + Copy + 'static,
{
    let t_end = traces
        .clone()
        .filter_map(|(_, trace, _)| trace.time.last().copied())
        .fold(0.0_f64, f64::max)
        .max(1.0e-9);
    let y_range = padded_range(
        traces
            .clone()
            .flat_map(|(_, trace, _)| trace.output.iter().copied()),
    );

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..t_end, y_range)?;

    chart
        .configure_mesh()
        .x_desc("Time [s]")
        .y_desc(y_desc)
        .draw()?;

    for (label, trace, color) in traces {
        chart
            .draw_series(LineSeries::new(
                finite_pairs(&trace.time, &trace.output),
                color.stroke_width(2),
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], color.stroke_width(3)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .border_style(BLACK)
        .background_style(WHITE.mix(0.7))
        .draw()?;

    Ok(())
}

fn marker_points(points: &[Complex<f64>]) -> impl Iterator<Item = (f64, f64)> + '_ {
    points.iter().map(|p| (p.re, p.im))
}

fn finite_pairs(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    x.iter()
        .copied()
        .zip(y.iter().copied())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .collect()
}

fn bode_frequency_range(frequency: &[f64]) -> Range<f64> {
    match (frequency.first(), frequency.last()) {
        (Some(&lo), Some(&hi)) if hi > lo && lo > 0.0 => lo..hi,
        _ => 1.0e-3..1.0e2,
    }
}

/// Finite min/max of `values` widened by 5 %; a degenerate span becomes ±1.
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return -1.0..1.0;
    }
    let span = hi - lo;
    if span <= 1.0e-12 * lo.abs().max(1.0) {
        return (lo - 1.0)..(hi + 1.0);
    }
    let pad = 0.05 * span;
    (lo - pad)..(hi + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::run_analysis;
    use crate::config::AnalysisConfig;
    use crate::margins::LogGrid;
    use crate::response::SimulationOptions;
    use crate::sim::DispersionConfig;

    #[test]
    fn test_make_plots_writes_all_figures() {
        let cfg = AnalysisConfig {
            simulation: SimulationOptions { samples: 200 },
            frequencies: LogGrid {
                start: 1.0e-3,
                stop: 1.0e2,
                points: 80,
            },
            gains: LogGrid {
                start: 1.0e-2,
                stop: 1.0e2,
                points: 30,
            },
            dispersion: DispersionConfig {
                runs: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let analysis = run_analysis(&cfg).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let files = make_plots(&analysis, dir.path()).unwrap();
        for path in files.paths() {
            let content = fs::read_to_string(path).unwrap();
            assert!(content.contains("<svg"), "{} is not an SVG", path.display());
        }
        let nominal = fs::read_to_string(&files.step_nominal).unwrap();
        assert!(nominal.contains("Step response - nominal"));
        assert!(nominal.contains("Lead compensator"));

        // The proportional loop has no phase crossover; its phase panel still
        // carries a legend.
        let bode = fs::read_to_string(&files.bode_proportional).unwrap();
        assert!(bode.contains("Open-loop magnitude"));
        assert!(bode.contains("Open-loop phase"));
        assert!(!bode.contains("Phase crossover"));
    }

    #[test]
    fn test_timestamped_run_dirs_are_unique() {
        let base = tempfile::tempdir().unwrap();
        let a = create_timestamped_run_dir(base.path()).unwrap();
        let b = create_timestamped_run_dir(base.path()).unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
    }

    #[test]
    fn test_padded_range() {
        let r = padded_range([0.0, 10.0, f64::NAN].into_iter());
        assert!((r.start + 0.5).abs() < 1e-12);
        assert!((r.end - 10.5).abs() < 1e-12);

        let flat = padded_range([2.0, 2.0].into_iter());
        assert_eq!(flat, 1.0..3.0);

        assert_eq!(padded_range(std::iter::empty()), -1.0..1.0);
    }
}
