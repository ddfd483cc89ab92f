// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Calibration of the load diversity and the phase distribution on field
//! measurements.
//!
//! The load diversity is first searched so that the mean voltage at the
//! measurement node matches the baseline target.  The phase distribution is
//! then shifted, phase by phase, until the computed voltages match the
//! measured ones.

use super::convergence::run_fixed_point;
use crate::calculator::{ElectricalCalculator, FlowInputs, PreparedNetwork, RegulationTable};
use crate::config::CalibrationSettings;
use crate::diagnostics::{Category, Diagnostics};
use crate::model::{ForcedModeConfig, LoadModel, PhaseDistribution, Scenario};
use crate::phasor::{Phase, PHASES};
use crate::result::CalibrationOutcome;
use crate::Error;

/// Share of one phase in an equal distribution, in percent.
const THIRD: f64 = 100.0 / 3.0;

/// Shift applied to one phase when measuring the voltage sensitivity.
const TRIAL_SHIFT: f64 = 2.0;

/// Diversity step used to measure the slope of the mean voltage, in percent.
const DIVERSITY_STEP: f64 = 5.0;

/// Sensitivity used when the trial shift gives nothing usable, in volts per
/// percent of shift.
const FALLBACK_SENSITIVITY: f64 = 0.05;

/// Load diversity and per-phase shift of the distribution.
#[derive(Clone, Debug, PartialEq)]
struct CalibrationState {
    diversity_percent: f64,
    /// Positive values move load away from the phase and production onto
    /// it.  Sums to zero.
    shift: [f64; 3],
}

fn mean(values: &[f64; 3]) -> f64 {
    values.iter().sum::<f64>() / 3.0
}

fn centred(values: [f64; 3]) -> [f64; 3] {
    let m = mean(&values);
    values.map(|v| v - m)
}

/// Re-centres a shift and keeps every phase share within `[0, 2/3]`.
fn bounded(shift: [f64; 3]) -> [f64; 3] {
    centred(shift).map(|v| if v.is_finite() { v.clamp(-THIRD, THIRD) } else { 0.0 })
}

fn distribution(shift: [f64; 3]) -> PhaseDistribution {
    PhaseDistribution {
        loads: shift.map(|x| THIRD - x),
        productions: shift.map(|x| THIRD + x),
    }
    .normalized()
}

/// Completes the measured voltages, estimating missing phases halfway
/// between the nominal voltage and the mean of the supplied phases.
fn measured_voltages(
    config: &ForcedModeConfig,
    nominal_v: f64,
    diagnostics: &mut Diagnostics,
) -> Result<([f64; 3], Vec<Phase>), Error> {
    if let Some(phase) = PHASES
        .iter()
        .find(|p| config.measured_voltages_v[p.index()].is_some_and(|v| !v.is_finite() || v <= 0.0))
    {
        return Err(Error::invalid_input(format!(
            "Measured voltage of phase {phase} is not a positive number."
        )));
    }

    let supplied = config
        .measured_voltages_v
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>();
    if supplied.is_empty() {
        return Err(Error::invalid_input(format!(
            "No measured voltage supplied for node {}.",
            config.measurement_node_id
        )));
    }
    let estimate = (nominal_v + supplied.iter().sum::<f64>() / supplied.len() as f64) / 2.0;

    let mut estimated = vec![];
    let voltages = PHASES.map(|p| match config.measured_voltages_v[p.index()] {
        Some(v) => v,
        None => {
            estimated.push(p);
            estimate
        }
    });
    for phase in &estimated {
        tracing::warn!(
            "No measured voltage for phase {} at node {}, using {:.2} V.",
            phase,
            config.measurement_node_id,
            estimate
        );
        diagnostics.warn(
            Category::Calibration,
            Some(config.measurement_node_id.as_str()),
            format!("Voltage of phase {phase} was not measured, {estimate:.2} V is assumed."),
        );
    }

    Ok((voltages, estimated))
}

/// Runs the solver on the given inputs and reads the voltages at the
/// measurement node.
struct Sampler<'a> {
    calculator: &'a ElectricalCalculator,
    network: &'a PreparedNetwork,
    base: FlowInputs,
    node_id: &'a str,
}

impl Sampler<'_> {
    fn voltages(&self, inputs: &FlowInputs) -> [f64; 3] {
        self.calculator
            .solve(self.network, inputs, &RegulationTable::new())
            .node(self.node_id)
            .map(|n| n.phase_voltages_v)
            .unwrap_or([f64::NAN; 3])
    }

    fn withdrawal(&self, diversity_percent: f64) -> [f64; 3] {
        self.voltages(&FlowInputs {
            scenario: Scenario::Withdrawal,
            load_diversity_percent: diversity_percent,
            load_model: LoadModel::Unbalanced,
            manual_distribution: Some(PhaseDistribution::equal()),
            ..self.base.clone()
        })
    }

    fn forced_inputs(&self, state: &CalibrationState) -> FlowInputs {
        FlowInputs {
            scenario: Scenario::Forced,
            load_diversity_percent: state.diversity_percent,
            load_model: LoadModel::Unbalanced,
            manual_distribution: Some(distribution(state.shift)),
            ..self.base.clone()
        }
    }

    fn forced(&self, state: &CalibrationState) -> [f64; 3] {
        self.voltages(&self.forced_inputs(state))
    }

    /// Voltage change per percent of shift on one phase, relative to the
    /// other phases.
    ///
    /// The phase is shifted by [`TRIAL_SHIFT`] and the two others by half
    /// of it in the other direction.
    fn sensitivity(&self, state: &CalibrationState, voltages: &[f64; 3], phase: usize) -> f64 {
        let mut step = [-TRIAL_SHIFT / 2.0; 3];
        step[phase] = TRIAL_SHIFT;
        if state.shift[phase] + TRIAL_SHIFT > THIRD {
            step = step.map(|s| -s);
        }

        let shifted = self.forced(&CalibrationState {
            diversity_percent: state.diversity_percent,
            shift: [0, 1, 2].map(|p| state.shift[p] + step[p]),
        });
        let change = centred([0, 1, 2].map(|p| shifted[p] - voltages[p]));

        let sensitivity = (0..3).map(|p| change[p] * step[p]).sum::<f64>()
            / step.iter().map(|s| s * s).sum::<f64>();
        if sensitivity.is_finite() && sensitivity > 1e-6 {
            sensitivity
        } else {
            FALLBACK_SENSITIVITY
        }
    }

    /// Change of the mean voltage per percent of load diversity, at the
    /// shift of `state`.  `None` when the voltage doesn't fall with the load.
    fn diversity_slope(
        &self,
        state: &CalibrationState,
        voltages: &[f64; 3],
        max_percent: f64,
    ) -> Option<f64> {
        let step = if state.diversity_percent + DIVERSITY_STEP > max_percent {
            -DIVERSITY_STEP
        } else {
            DIVERSITY_STEP
        };
        let stepped = self.forced(&CalibrationState {
            diversity_percent: state.diversity_percent + step,
            shift: state.shift,
        });
        let slope = (mean(&stepped) - mean(voltages)) / step;
        (slope.is_finite() && slope < -1e-6).then_some(slope)
    }
}

/// Bisection of the load diversity on the mean voltage at the measurement
/// node.  Returns the best diversity found.
fn calibrate_diversity(sampler: &Sampler, target_v: f64, settings: &CalibrationSettings) -> f64 {
    let (mut low, mut high) = settings.diversity_range_percent;
    let mut best = (f64::INFINITY, (low + high) / 2.0);

    for _ in 0..settings.max_evaluations {
        let diversity = (low + high) / 2.0;
        let error = mean(&sampler.withdrawal(diversity)) - target_v;
        if !error.is_finite() {
            // Too much load for the network to carry.
            high = diversity;
            continue;
        }
        if error.abs() < best.0 {
            best = (error.abs(), diversity);
        }
        if error.abs() < settings.diversity_tolerance_v {
            break;
        }
        // The voltage falls as the load grows.
        if error > 0.0 {
            low = diversity;
        } else {
            high = diversity;
        }
    }

    tracing::debug!(
        "Load diversity calibrated to {:.2} % (mean voltage error {:.4} V).",
        best.1,
        best.0
    );
    best.1
}

/// Calibrates the load diversity and the phase distribution of `inputs` on
/// the measurements of `config`.
///
/// Returns the calibrated inputs, to be used for the forced scenario, and
/// the outcome of the calibration.
pub(crate) fn calibrate(
    calculator: &ElectricalCalculator,
    network: &PreparedNetwork,
    inputs: &FlowInputs,
    config: &ForcedModeConfig,
    diagnostics: &mut Diagnostics,
) -> Result<(FlowInputs, CalibrationOutcome), Error> {
    network.position(&config.measurement_node_id)?;

    let system = network.voltage_system();
    let (measured, estimated_phases) =
        measured_voltages(config, system.reference_voltage(), diagnostics)?;
    let measured_mean = mean(&measured);
    let target_v = config.target_voltage_v.unwrap_or(measured_mean);
    let settings = &calculator.config().calibration;

    let sampler = Sampler {
        calculator,
        network,
        base: inputs.clone(),
        node_id: &config.measurement_node_id,
    };

    let (min, max) = settings.diversity_range_percent;
    let diversity_percent = calibrate_diversity(&sampler, target_v, settings);

    // Seed the shift from the measured pattern.
    let flat = CalibrationState {
        diversity_percent,
        shift: [0.0; 3],
    };
    let flat_voltages = sampler.forced(&flat);
    let sensitivity = sampler.sensitivity(&flat, &flat_voltages, 0);
    let initial = CalibrationState {
        diversity_percent,
        shift: bounded(centred(measured).map(|v| v / sensitivity)),
    };

    let follow_mean = config.target_voltage_v.is_none();

    let (state, report) = run_fixed_point(&settings.distribution, initial, |state| {
        let voltages = sampler.forced(state);
        let errors = [0, 1, 2].map(|p| voltages[p] - measured[p]);
        let error = errors.iter().fold(0.0, |m: f64, e| m.max(e.abs()));
        if !error.is_finite() {
            return (f64::INFINITY, state.clone());
        }

        let worst = (0..3)
            .max_by(|&a, &b| errors[a].abs().total_cmp(&errors[b].abs()))
            .unwrap_or(0);
        let sensitivity = sampler.sensitivity(state, &voltages, worst);
        let mean_error = mean(&errors);
        let shift = bounded([0, 1, 2].map(|p| state.shift[p] - (errors[p] - mean_error) / sensitivity));

        let mut diversity_percent = state.diversity_percent;
        if follow_mean {
            if let Some(slope) = sampler.diversity_slope(state, &voltages, max) {
                diversity_percent = (diversity_percent - mean_error / slope).clamp(min, max);
            }
        }

        (
            error,
            CalibrationState {
                diversity_percent,
                shift,
            },
        )
    });

    let calibrated = sampler.forced_inputs(&state);
    let computed = sampler.voltages(&calibrated);

    if report.converged() {
        tracing::debug!(
            "Forced mode calibrated in {} iterations, largest residual {:.3} V.",
            report.iterations,
            report.final_error
        );
    } else {
        tracing::warn!(
            "Forced mode calibration did not converge after {} iterations ({:?}).",
            report.iterations,
            report.reason
        );
        diagnostics.warn(
            Category::Convergence,
            Some(config.measurement_node_id.as_str()),
            format!(
                "Calibration did not converge, largest residual {:.2} V.",
                report.final_error
            ),
        );
    }

    let outcome = CalibrationOutcome {
        status: report.status,
        iterations: report.iterations,
        measurement_node_id: config.measurement_node_id.clone(),
        load_diversity_percent: state.diversity_percent,
        distribution: distribution(state.shift),
        measured_voltages_v: measured,
        computed_voltages_v: computed,
        residuals_v: [0, 1, 2].map(|p| computed[p] - measured[p]),
        estimated_phases,
    };

    Ok((calibrated, outcome))
}
