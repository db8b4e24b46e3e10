use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lead_compensator::config::AnalysisConfig;
use lead_compensator::output::{create_timestamped_run_dir, make_plots};
use lead_compensator::report::{render_text, summarize};
use lead_compensator::run_analysis;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Proportional vs. lead compensator design for a mass-damper plant"
)]
struct Cli {
    /// TOML file overriding any subset of the default parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output base directory for the figures
    #[arg(long, default_value = "output-lead-compensator")]
    output: PathBuf,

    /// Skip figure rendering
    #[arg(long)]
    no_plots: bool,

    /// Print a JSON summary instead of the text report
    #[arg(long)]
    json: bool,

    /// Dispersion study seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of random plants in the dispersion study (0 disables it)
    #[arg(long)]
    dispersion_runs: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => AnalysisConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(v) = cli.seed {
        cfg.dispersion.seed = v;
    }
    if let Some(v) = cli.dispersion_runs {
        cfg.dispersion.runs = v;
    }

    let analysis = run_analysis(&cfg).context("analysis failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summarize(&analysis))?);
    } else {
        print!("{}", render_text(&analysis));
    }

    if cli.no_plots {
        return Ok(());
    }

    let run_dir = create_timestamped_run_dir(&cli.output)?;
    let files = make_plots(&analysis, &run_dir)?;
    for path in files.paths() {
        tracing::info!(path = %path.display(), "figure");
    }

    Ok(())
}
