// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Simulation of the regulation equipment on top of the phase flow solver.
//!
//! A simulation runs, in this order:
//!
//! 1. the forced-mode calibration, when the scenario is
//!    [`Forced`](crate::model::Scenario::Forced),
//! 2. an unregulated baseline pass,
//! 3. the voltage regulators, iterated to a fixed point,
//! 4. the neutral current compensators, in a single pass.

mod convergence;
mod equi8;
mod forced;
mod srg2;

pub use convergence::{
    run_fixed_point, ConvergenceController, ConvergenceReport, ConvergenceStatus, StopReason,
    Verdict,
};
pub use equi8::{CompensatorOutcome, NeutralCompensator};
pub use srg2::{RegulatorOutcome, RegulatorState, RegulatorThresholds, VoltageRegulator};

use serde::Serialize;

use crate::calculator::{ElectricalCalculator, FlowInputs, RegulationTable};
use crate::config::CalculatorConfig;
use crate::diagnostics::{Category, Diagnostics};
use crate::model::{Project, Scenario};
use crate::result::CalculationResult;
use crate::Error;

/// Why a device took no part in a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    Disabled,
    /// The node is missing or not connected to the source.
    NodeNotFound,
    /// Thresholds, steps or impedances are not consistent.
    InvalidSettings,
    /// The node is too far from the source for the device.
    Ineligible,
    /// Another device of the same kind is installed on the node.
    DuplicateNode,
    /// The neutral current or the voltage spread is too small to act on.
    BelowThreshold,
    /// The voltage system has no neutral conductor.
    NoNeutral,
}

/// Status of a device after a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Active,
    Inactive(InactiveReason),
}

/// Output of a simulation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationResult {
    /// The network state with all devices applied.
    pub result: CalculationResult,
    /// The network state without any device.
    pub baseline: CalculationResult,
    /// Convergence of the voltage regulators, if any was active.
    pub regulation: Option<ConvergenceReport>,
}

impl SimulationResult {
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.result.diagnostics
    }
}

/// Runs a scenario with voltage regulators and neutral current
/// compensators installed on the network.
#[derive(Clone, Debug, Default)]
pub struct SimulationCalculator {
    calculator: ElectricalCalculator,
}

impl SimulationCalculator {
    pub fn new(config: CalculatorConfig) -> Self {
        Self {
            calculator: ElectricalCalculator::new(config),
        }
    }

    /// The solver the simulation runs its passes with.
    pub fn calculator(&self) -> &ElectricalCalculator {
        &self.calculator
    }

    /// Simulates `scenario` with the given devices.
    ///
    /// The `result` field of every device is replaced with its outcome.
    pub fn run(
        &self,
        project: &Project,
        scenario: Scenario,
        regulators: &mut [VoltageRegulator],
        compensators: &mut [NeutralCompensator],
    ) -> Result<SimulationResult, Error> {
        let calculator = &self.calculator;
        let network = calculator.prepare(project)?;
        let mut inputs = FlowInputs::from_project(project, scenario);
        let mut diagnostics = Diagnostics::new();

        let mut calibration = None;
        if scenario == Scenario::Forced {
            match &project.forced_mode {
                Some(config) => {
                    let (calibrated, outcome) =
                        forced::calibrate(calculator, &network, &inputs, config, &mut diagnostics)?;
                    inputs = calibrated;
                    calibration = Some(outcome);
                }
                None => {
                    tracing::warn!("Forced scenario without measurements, nothing is calibrated.");
                    diagnostics.warn(
                        Category::Calibration,
                        None,
                        "Forced scenario without measurements, the project settings are used.",
                    );
                }
            }
        }

        let baseline = calculator.solve(&network, &inputs, &RegulationTable::new());

        let (mut result, regulation) = match srg2::regulate(
            calculator,
            &network,
            &inputs,
            regulators,
            &baseline,
            &mut diagnostics,
        ) {
            Some((result, report)) => (result, Some(report)),
            None => (baseline.clone(), None),
        };

        equi8::compensate(
            &network,
            &mut result,
            compensators,
            &calculator.config().limits,
            &mut diagnostics,
        );

        result.calibration = calibration;
        result.diagnostics.extend(diagnostics);

        tracing::debug!(
            "Simulated {} with {} regulators and {} compensators ({} warnings, {} errors).",
            scenario,
            regulators.len(),
            compensators.len(),
            result.diagnostics.warning_count(),
            result.diagnostics.error_count()
        );

        Ok(SimulationResult {
            result,
            baseline,
            regulation,
        })
    }
}
