use approx::assert_relative_eq;
use lead_compensator::report::{format_margins, render_text, summarize};
use lead_compensator::sim::DispersionConfig;
use lead_compensator::{plant, run_analysis, stability_margins, AnalysisConfig, TransferFunction};

fn config() -> AnalysisConfig {
    AnalysisConfig {
        dispersion: DispersionConfig {
            runs: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_plant_poles_and_zeros() {
    let p = plant(10.0, 0.5).unwrap();
    assert!(p.zeros().unwrap().is_empty());

    let mut poles: Vec<f64> = p.poles().unwrap().iter().map(|z| z.re).collect();
    poles.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(poles.len(), 2);
    assert_relative_eq!(poles[0], -0.05, epsilon = 1e-12);
    assert_eq!(poles[1], 0.0);
}

#[test]
fn test_nominal_tracking_and_settling() {
    let analysis = run_analysis(&config()).unwrap();

    let p_end = analysis.proportional.nominal_output.value_at(250.0).unwrap();
    assert!((p_end - 1.0).abs() < 0.01, "proportional y(250) = {p_end}");

    let lead_40 = analysis.lead.nominal_output.value_at(40.0).unwrap();
    assert!((lead_40 - 1.0).abs() < 0.02, "lead y(40) = {lead_40}");

    let p_ts = analysis.proportional.nominal_metrics.settling_time.unwrap();
    let lead_ts = analysis.lead.nominal_metrics.settling_time.unwrap();
    assert!(lead_ts < 40.0);
    assert!(lead_ts < p_ts);
}

#[test]
fn test_lead_adds_phase_margin_and_bandwidth() {
    let analysis = run_analysis(&config()).unwrap();
    let p_pm = analysis.proportional.margins.phase.unwrap();
    let lead_pm = analysis.lead.margins.phase.unwrap();

    assert!(lead_pm.frequency > 10.0 * p_pm.frequency);
    assert!(lead_pm.margin > 50.0);
    assert!(p_pm.margin > 50.0);
    // Neither loop's phase reaches -180 deg at finite frequency.
    assert!(analysis.proportional.margins.gain.is_none());
    assert!(analysis.lead.margins.gain.is_none());
}

#[test]
fn test_margin_identities() {
    let l = TransferFunction::from_coeffs(&[1.0], &[1.0, 3.0, 2.0, 0.0]).unwrap();
    let margins = stability_margins(&l).unwrap();

    let gm = margins.gain.unwrap();
    assert_relative_eq!(margins.gain_margin_db().unwrap(), 20.0 * gm.margin.log10());
    assert_relative_eq!(gm.margin, 6.0, epsilon = 1e-8);

    let pm = margins.phase.unwrap();
    assert_relative_eq!(
        margins.delay_margin().unwrap(),
        pm.margin.to_radians() / pm.frequency
    );
}

#[test]
fn test_sweeps_cover_the_grid() {
    let analysis = run_analysis(&config()).unwrap();
    for ca in analysis.compensators() {
        assert_eq!(ca.sweep.len(), 9);
        assert!(ca.sweep.iter().all(|cell| cell.stable && cell.trace.is_finite()));
    }
    // Every lead cell has settled by the end of its shorter horizon.
    for cell in &analysis.lead.sweep {
        assert!(
            (cell.trace.last_value() - 1.0).abs() < 0.05,
            "{} ends at {}",
            cell.label,
            cell.trace.last_value()
        );
    }
}

#[test]
fn test_text_report_and_summary() {
    let analysis = run_analysis(&config()).unwrap();
    let text = render_text(&analysis);

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Proportional compensator");
    assert_eq!(lines[1], "Gain Margin: inf dB at frequency none rad/sec");
    assert!(lines[2].starts_with("Phase Margin: 58."));
    // Heading and three margin lines per compensator, nothing else.
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[4], "");
    assert_eq!(lines[5], "Lead compensator");
    assert_eq!(lines.iter().filter(|line| !line.is_empty()).count(), 8);

    for ca in analysis.compensators() {
        for line in format_margins(&ca.margins) {
            assert!(text.contains(&line));
        }
    }

    let summary = summarize(&analysis);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["compensators"].as_array().unwrap().len(), 2);
    assert_eq!(json["compensators"][1]["compensator"]["kind"], "lead");
}

#[test]
fn test_lag_configuration_prints_finite_gain_margin() {
    let cfg = AnalysisConfig {
        tau_p: 18.0,
        tau_z: 1.0,
        ..config()
    };
    let analysis = run_analysis(&cfg).unwrap();
    let text = render_text(&analysis);

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[5], "Lead compensator");
    let gain_line = lines[6];
    assert!(gain_line.starts_with("Gain Margin: -"), "{gain_line}");
    assert!(!gain_line.contains("inf dB"), "{gain_line}");
    assert!(gain_line.ends_with(" rad/sec"), "{gain_line}");
    assert!(!gain_line.contains("none"), "{gain_line}");
    assert_eq!(gain_line, format_margins(&analysis.lead.margins)[0]);
}
