//! Open- and closed-loop formation around a compensator/plant pair

use crate::tf::TransferFunction;
use crate::ControlError;

/// Transfer functions of one unity-feedback loop
#[derive(Debug, Clone)]
pub struct LoopSystems {
    pub controller: TransferFunction,
    pub plant: TransferFunction,
    /// `L = C P`
    pub open_loop: TransferFunction,
    /// Reference to output, `L / (1 + L)`
    pub closed_loop: TransferFunction,
    /// Reference to control effort, `C / (1 + L)`
    pub effort: TransferFunction,
}

impl LoopSystems {
    pub fn new(controller: TransferFunction, plant: TransferFunction) -> Result<Self, ControlError> {
        let open_loop = &controller * &plant;
        let closed_loop = open_loop.feedback()?;

        // C / (1 + C P) = N_C D_P / (D_C D_P + N_C N_P); the controller
        // denominator cancels exactly.
        let effort = TransferFunction::new(
            controller.num() * plant.den(),
            open_loop.den() + open_loop.num(),
        )?;

        tracing::debug!(
            open_loop = %open_loop,
            closed_loop = %closed_loop,
            effort = %effort,
            "formed loop"
        );

        Ok(Self {
            controller,
            plant,
            open_loop,
            closed_loop,
            effort,
        })
    }

    /// Closed-loop poles, the roots of the characteristic polynomial `D_L + N_L`.
    pub fn closed_loop_poles(&self) -> Result<Vec<nalgebra::Complex<f64>>, ControlError> {
        self.closed_loop.poles()
    }

    /// True when every closed-loop pole lies strictly in the left half-plane.
    pub fn is_stable(&self) -> Result<bool, ControlError> {
        Ok(self.closed_loop_poles()?.iter().all(|p| p.re < 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::{plant, Compensator};
    use approx::assert_relative_eq;
    use nalgebra::Complex;

    fn lead() -> Compensator {
        Compensator::Lead {
            kl: 0.4,
            tau_p: 1.0,
            tau_z: 18.0,
        }
    }

    #[test]
    fn test_proportional_loop_is_stable() {
        let c = Compensator::Proportional { kp: 0.018 };
        let loops = LoopSystems::new(c.transfer_function().unwrap(), plant(10.0, 0.5).unwrap())
            .unwrap();
        assert_eq!(loops.closed_loop.den().coeffs(), &[10.0, 0.5, 0.018]);

        let poles = loops.closed_loop_poles().unwrap();
        assert_eq!(poles.len(), 2);
        assert!(poles.iter().all(|p| p.re < 0.0));
        assert!(loops.is_stable().unwrap());
    }

    #[test]
    fn test_lead_characteristic_polynomial() {
        let loops = LoopSystems::new(
            lead().transfer_function().unwrap(),
            plant(10.0, 0.5).unwrap(),
        )
        .unwrap();
        let den = loops.closed_loop.den().coeffs();
        let expected = [10.0, 10.5, 7.7, 0.4];
        assert_eq!(den.len(), expected.len());
        for (got, want) in den.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert!(loops.is_stable().unwrap());
    }

    #[test]
    fn test_effort_equals_c_over_one_plus_l() {
        let controller = lead().transfer_function().unwrap();
        let loops = LoopSystems::new(controller.clone(), plant(10.0, 0.5).unwrap()).unwrap();
        let one_plus_l = &TransferFunction::gain(1.0) + &loops.open_loop;

        for &w in &[0.005, 0.05, 0.6, 4.0] {
            let s = Complex::new(0.0, w);
            let expected = controller.evaluate(s) / one_plus_l.evaluate(s);
            let got = loops.effort.evaluate(s);
            assert_relative_eq!(got.re, expected.re, epsilon = 1e-10, max_relative = 1e-10);
            assert_relative_eq!(got.im, expected.im, epsilon = 1e-10, max_relative = 1e-10);
        }
        assert!(loops.effort.is_proper());
    }
}
