//! Lead compensator design
//!
//! Designs and compares a proportional controller and a lead compensator for
//! the mass-damper plant `P(s) = 1 / (s (m s + k))`: stability margins,
//! closed-loop step responses, and robustness to plant parameter changes.

pub mod analysis;
pub mod config;
pub mod loops;
pub mod margins;
pub mod output;
pub mod plant;
pub mod poly;
pub mod report;
pub mod response;
pub mod sim;
pub mod tf;

use thiserror::Error;

// Re-export main types
pub use analysis::{run_analysis, Analysis, CompensatorAnalysis};
pub use config::AnalysisConfig;
pub use loops::LoopSystems;
pub use margins::{stability_margins, Crossover, StabilityMargins};
pub use plant::{plant, Compensator};
pub use poly::Polynomial;
pub use response::{step_response, SimulationOptions, StepMetrics, StepTrace};
pub use sim::{robustness_sweep, simulate, SweepTrace};
pub use tf::TransferFunction;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("transfer function denominator is the zero polynomial")]
    ZeroDenominator,
    #[error("feedback loop is ill-posed: 1 + L(s) is identically zero")]
    IllPosedLoop,
    #[error("improper transfer function: numerator degree {num} exceeds denominator degree {den}")]
    Improper { num: usize, den: usize },
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("root finding failed: {0}")]
    RootFinding(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
