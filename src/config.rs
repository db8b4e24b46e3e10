use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::margins::LogGrid;
use crate::plant::Compensator;
use crate::response::SimulationOptions;
use crate::sim::DispersionConfig;
use crate::ControlError;

/// Parameters of the compensator comparison.
///
/// Every field has a default, so a TOML file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Nominal mass [kg]
    pub mass: f64,
    /// Nominal damping/friction coefficient [N s/m]
    pub damping: f64,
    /// Proportional gain
    pub kp: f64,
    /// Lead compensator gain
    pub kl: f64,
    /// Lead pole time constant [s]
    pub tau_p: f64,
    /// Lead zero time constant [s]
    pub tau_z: f64,
    /// Horizon of the nominal step responses [s]
    pub nominal_horizon: f64,
    /// Robustness sweep horizon for the proportional loop [s]
    pub proportional_sweep_horizon: f64,
    /// Robustness sweep horizon for the lead loop [s]
    pub lead_sweep_horizon: f64,
    /// Sweep grid masses [kg]
    pub masses: Vec<f64>,
    /// Sweep grid damping values [N s/m]
    pub dampings: Vec<f64>,
    pub simulation: SimulationOptions,
    /// Bode frequency grid [rad/s]
    pub frequencies: LogGrid,
    /// Root-locus gain multipliers
    pub gains: LogGrid,
    pub dispersion: DispersionConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mass: 10.0,
            damping: 0.5,
            kp: 0.018,
            kl: 0.4,
            tau_p: 1.0,
            tau_z: 18.0,
            nominal_horizon: 250.0,
            proportional_sweep_horizon: 250.0,
            lead_sweep_horizon: 40.0,
            masses: vec![5.0, 10.0, 15.0],
            dampings: vec![0.25, 0.5, 0.75],
            simulation: SimulationOptions::default(),
            frequencies: LogGrid::default_frequencies(),
            gains: LogGrid::default_gains(),
            dispersion: DispersionConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ControlError> {
        let raw = fs::read_to_string(path)?;
        let cfg: AnalysisConfig = toml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        self.proportional().validate()?;
        self.lead().validate()?;

        for (name, value) in [
            ("mass", self.mass),
            ("damping", self.damping),
            ("nominal_horizon", self.nominal_horizon),
            ("proportional_sweep_horizon", self.proportional_sweep_horizon),
            ("lead_sweep_horizon", self.lead_sweep_horizon),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ControlError::InvalidConfig(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }

        for (name, grid) in [("masses", &self.masses), ("dampings", &self.dampings)] {
            if grid.is_empty() {
                return Err(ControlError::InvalidConfig(format!("{name} must be non-empty")));
            }
            if grid.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
                return Err(ControlError::InvalidConfig(format!(
                    "{name} must contain only finite values > 0"
                )));
            }
        }

        self.simulation.validate()?;
        self.frequencies.validate("frequencies")?;
        self.gains.validate("gains")?;
        self.dispersion.validate()?;
        Ok(())
    }

    pub fn proportional(&self) -> Compensator {
        Compensator::Proportional { kp: self.kp }
    }

    pub fn lead(&self) -> Compensator {
        Compensator::Lead {
            kl: self.kl,
            tau_p: self.tau_p,
            tau_z: self.tau_z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "kp = 0.02\nmasses = [8.0, 12.0]\n\n[simulation]\nsamples = 400\n\n[dispersion]\nruns = 0"
        )
        .unwrap();

        let cfg = AnalysisConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(cfg.kp, 0.02);
        assert_eq!(cfg.masses, vec![8.0, 12.0]);
        assert_eq!(cfg.simulation.samples, 400);
        assert_eq!(cfg.dispersion.runs, 0);
        assert_eq!(cfg.dispersion.seed, DispersionConfig::default().seed);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.tau_z, 18.0);
        assert_eq!(cfg.dampings, vec![0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cfg = AnalysisConfig {
            dampings: vec![0.5, -0.1],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ControlError::InvalidConfig(_))));

        let cfg = AnalysisConfig {
            tau_p: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ControlError::InvalidParameter { name: "tau_p", .. })
        ));
    }

    #[test]
    fn test_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "kp = \"fast\"").unwrap();
        assert!(matches!(
            AnalysisConfig::from_toml_file(file.path()),
            Err(ControlError::Toml(_))
        ));
    }

    #[test]
    fn test_compensators() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.proportional(), Compensator::Proportional { kp: 0.018 });
        assert_eq!(
            cfg.lead(),
            Compensator::Lead {
                kl: 0.4,
                tau_p: 1.0,
                tau_z: 18.0
            }
        );
    }
}
