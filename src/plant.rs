//! Plant model and compensators

use serde::{Deserialize, Serialize};

use crate::tf::TransferFunction;
use crate::ControlError;

/// Mass-damper plant `P(s) = 1 / (s (m s + k))`.
///
/// Poles at `0` and `-k/m`, no finite zeros.
pub fn plant(mass: f64, damping: f64) -> Result<TransferFunction, ControlError> {
    ensure_positive("mass", mass)?;
    ensure_positive("damping", damping)?;
    TransferFunction::from_coeffs(&[1.0], &[mass, damping, 0.0])
}

fn ensure_positive(name: &'static str, value: f64) -> Result<(), ControlError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ControlError::InvalidParameter {
            name,
            value,
            reason: "must be finite and > 0",
        })
    }
}

/// Feedback compensator acting on the position error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Compensator {
    /// Constant gain `kp`
    Proportional { kp: f64 },
    /// `kl (tau_z s + 1) / (tau_p s + 1)`
    Lead { kl: f64, tau_p: f64, tau_z: f64 },
}

/// Peak phase contributed by a lead network
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseLead {
    /// Maximum phase lead [deg]
    pub phase_deg: f64,
    /// Frequency of maximum lead [rad/s]
    pub frequency: f64,
}

impl Compensator {
    /// Legend/report label.
    pub fn name(&self) -> &'static str {
        match self {
            Compensator::Proportional { .. } => "Proportional compensator",
            Compensator::Lead { .. } => "Lead compensator",
        }
    }

    /// Identifier used in file names.
    pub fn slug(&self) -> &'static str {
        match self {
            Compensator::Proportional { .. } => "proportional",
            Compensator::Lead { .. } => "lead",
        }
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        match *self {
            Compensator::Proportional { kp } => ensure_positive("kp", kp),
            Compensator::Lead { kl, tau_p, tau_z } => {
                ensure_positive("kl", kl)?;
                ensure_positive("tau_p", tau_p)?;
                ensure_positive("tau_z", tau_z)?;
                if tau_z <= tau_p {
                    tracing::warn!(
                        tau_z,
                        tau_p,
                        "tau_z <= tau_p: compensator adds phase lag, not lead"
                    );
                }
                Ok(())
            }
        }
    }

    pub fn transfer_function(&self) -> Result<TransferFunction, ControlError> {
        self.validate()?;
        match *self {
            Compensator::Proportional { kp } => Ok(TransferFunction::gain(kp)),
            Compensator::Lead { kl, tau_p, tau_z } => {
                TransferFunction::from_coeffs(&[kl * tau_z, kl], &[tau_p, 1.0])
            }
        }
    }

    /// Maximum phase lead `asin((a - 1) / (a + 1))`, `a = tau_z / tau_p`,
    /// reached at `1 / sqrt(tau_z tau_p)`. `None` for a proportional gain.
    pub fn max_phase_lead(&self) -> Option<PhaseLead> {
        match *self {
            Compensator::Proportional { .. } => None,
            Compensator::Lead { tau_p, tau_z, .. } => {
                let a = tau_z / tau_p;
                Some(PhaseLead {
                    phase_deg: ((a - 1.0) / (a + 1.0)).asin().to_degrees(),
                    frequency: 1.0 / (tau_z * tau_p).sqrt(),
                })
            }
        }
    }
}
