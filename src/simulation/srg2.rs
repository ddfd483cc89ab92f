// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Per-phase voltage regulator with five discrete states.
//!
//! The regulator reads the voltage on its upstream side and selects, per
//! phase, a ratio that lowers (`LO`) or boosts (`BO`) the voltage fed to the
//! downstream part of the network.

use serde::{Deserialize, Serialize};

use super::convergence::{run_fixed_point, ConvergenceReport};
use super::{DeviceStatus, InactiveReason};
use crate::calculator::{ElectricalCalculator, FlowInputs, PreparedNetwork, RegulationTable};
use crate::diagnostics::{Category, Diagnostics};
use crate::phasor::PHASES;
use crate::result::CalculationResult;

/// Switching thresholds, in reference volts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorThresholds {
    pub lo2_v: f64,
    pub lo1_v: f64,
    pub bypass_upper_v: f64,
    pub bypass_lower_v: f64,
    pub bo1_v: f64,
    pub bo2_v: f64,
}

impl Default for RegulatorThresholds {
    fn default() -> Self {
        Self {
            lo2_v: 246.0,
            lo1_v: 238.0,
            bypass_upper_v: 236.0,
            bypass_lower_v: 224.0,
            bo1_v: 222.0,
            bo2_v: 214.0,
        }
    }
}

impl RegulatorThresholds {
    /// Returns `true` if the thresholds are finite and ordered
    /// `lo2 ≥ lo1 ≥ bypass_upper > bypass_lower ≥ bo1 ≥ bo2`.
    pub fn is_valid(&self) -> bool {
        let t = [
            self.lo2_v,
            self.lo1_v,
            self.bypass_upper_v,
            self.bypass_lower_v,
            self.bo1_v,
            self.bo2_v,
        ];
        t.iter().all(|v| v.is_finite())
            && self.lo2_v >= self.lo1_v
            && self.lo1_v >= self.bypass_upper_v
            && self.bypass_upper_v > self.bypass_lower_v
            && self.bypass_lower_v >= self.bo1_v
            && self.bo1_v >= self.bo2_v
    }
}

/// State of one phase of a regulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegulatorState {
    /// Boost, second step.
    Bo2,
    /// Boost, first step.
    Bo1,
    #[default]
    Byp,
    /// Lower, first step.
    Lo1,
    /// Lower, second step.
    Lo2,
}

impl RegulatorState {
    /// Direction of the correction: `1` boosts, `-1` lowers, `0` bypasses.
    pub fn direction(self) -> i8 {
        match self {
            RegulatorState::Bo2 | RegulatorState::Bo1 => 1,
            RegulatorState::Byp => 0,
            RegulatorState::Lo1 | RegulatorState::Lo2 => -1,
        }
    }

    /// Voltage ratio of the state for the given step sizes, in percent.
    pub fn ratio(self, step1_percent: f64, step2_percent: f64) -> f64 {
        match self {
            RegulatorState::Bo2 => 1.0 + step2_percent / 100.0,
            RegulatorState::Bo1 => 1.0 + step1_percent / 100.0,
            RegulatorState::Byp => 1.0,
            RegulatorState::Lo1 => 1.0 - step1_percent / 100.0,
            RegulatorState::Lo2 => 1.0 - step2_percent / 100.0,
        }
    }

    /// Selects the state of one phase from its upstream voltage.
    ///
    /// Inside the gaps between the bypass band and the first thresholds, a
    /// phase that was already regulating in that direction stays at the
    /// first step.  Anything else bypasses.
    pub fn select(voltage_v: f64, thresholds: &RegulatorThresholds, previous: Self) -> Self {
        let t = thresholds;
        if !voltage_v.is_finite() {
            RegulatorState::Byp
        } else if voltage_v >= t.lo2_v {
            RegulatorState::Lo2
        } else if voltage_v >= t.lo1_v {
            RegulatorState::Lo1
        } else if voltage_v <= t.bo2_v {
            RegulatorState::Bo2
        } else if voltage_v <= t.bo1_v {
            RegulatorState::Bo1
        } else if voltage_v > t.bypass_lower_v && voltage_v < t.bypass_upper_v {
            RegulatorState::Byp
        } else if voltage_v >= t.bypass_upper_v {
            if previous.direction() < 0 {
                RegulatorState::Lo1
            } else {
                RegulatorState::Byp
            }
        } else if previous.direction() > 0 {
            RegulatorState::Bo1
        } else {
            RegulatorState::Byp
        }
    }
}

/// A voltage regulator installed at a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoltageRegulator {
    pub id: String,
    pub node_id: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub thresholds: RegulatorThresholds,
    #[serde(default = "step1")]
    pub step1_percent: f64,
    #[serde(default = "step2")]
    pub step2_percent: f64,
    /// Forbid phases regulating in opposite directions at the same time.
    #[serde(default = "enabled")]
    pub single_direction: bool,
    /// Largest phase impedance between the source and the node the device
    /// may be installed at.
    #[serde(default)]
    pub max_path_impedance_ohm: Option<f64>,
    #[serde(default)]
    pub max_injection_kva: Option<f64>,
    #[serde(default)]
    pub max_withdrawal_kva: Option<f64>,
    /// Overwritten by every simulation.
    #[serde(skip_deserializing)]
    pub result: Option<RegulatorOutcome>,
}

fn enabled() -> bool {
    true
}

fn step1() -> f64 {
    3.75
}

fn step2() -> f64 {
    7.5
}

impl VoltageRegulator {
    pub fn new(id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            enabled: true,
            thresholds: RegulatorThresholds::default(),
            step1_percent: step1(),
            step2_percent: step2(),
            single_direction: true,
            max_path_impedance_ohm: None,
            max_injection_kva: None,
            max_withdrawal_kva: None,
            result: None,
        }
    }

    fn has_valid_settings(&self) -> bool {
        let steps_valid = [self.step1_percent, self.step2_percent]
            .iter()
            .all(|s| s.is_finite() && *s >= 0.0 && *s < 100.0);
        steps_valid && self.thresholds.is_valid()
    }

    /// Selects the states of the three phases from the upstream voltages.
    pub fn select_states(
        &self,
        voltages_v: [f64; 3],
        nominal_v: f64,
        previous: [RegulatorState; 3],
    ) -> [RegulatorState; 3] {
        let mut states =
            [0, 1, 2].map(|p| RegulatorState::select(voltages_v[p], &self.thresholds, previous[p]));

        let conflict = states.iter().any(|s| s.direction() > 0)
            && states.iter().any(|s| s.direction() < 0);
        if self.single_direction && conflict {
            let dominant = (0..3)
                .filter(|&p| states[p].direction() != 0)
                .max_by(|&a, &b| {
                    (voltages_v[a] - nominal_v)
                        .abs()
                        .total_cmp(&(voltages_v[b] - nominal_v).abs())
                })
                .map(|p| states[p].direction())
                .unwrap_or(0);
            for state in states.iter_mut() {
                if state.direction() != dominant {
                    *state = RegulatorState::Byp;
                }
            }
        }

        states
    }

    fn ratios(&self, states: [RegulatorState; 3]) -> [f64; 3] {
        states.map(|s| s.ratio(self.step1_percent, self.step2_percent))
    }
}

/// What a regulator did in the last simulation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegulatorOutcome {
    pub status: DeviceStatus,
    pub states: [RegulatorState; 3],
    pub ratios: [f64; 3],
    /// Upstream-side voltages, in reference volts.
    pub input_voltages_v: [f64; 3],
    /// Downstream-side voltages, in reference volts.
    pub output_voltages_v: [f64; 3],
    /// Net power through the node, positive when drawn from the source.
    pub power_through_kva: f64,
    /// The power through the node exceeds the configured limit.
    pub limited: bool,
    pub convergence: Option<ConvergenceReport>,
}

impl RegulatorOutcome {
    fn inactive(reason: InactiveReason) -> Self {
        Self {
            status: DeviceStatus::Inactive(reason),
            states: [RegulatorState::Byp; 3],
            ratios: [1.0; 3],
            input_voltages_v: [0.0; 3],
            output_voltages_v: [0.0; 3],
            power_through_kva: 0.0,
            limited: false,
            convergence: None,
        }
    }
}

/// A regulator that passed the activation checks.
struct ActiveRegulator {
    device: usize,
    node_id: String,
}

#[derive(Clone)]
struct RegulationState {
    states: Vec<[RegulatorState; 3]>,
    result: CalculationResult,
}

/// Upstream-side voltages of a node, in reference volts.
fn upstream_voltages(network: &PreparedNetwork, result: &CalculationResult, node_id: &str) -> [f64; 3] {
    let system = network.voltage_system();
    result
        .node(node_id)
        .map(|n| n.upstream_phasors.map(|v| system.to_reference(v.norm())))
        .unwrap_or([f64::NAN; 3])
}

fn max_voltage_change(a: &CalculationResult, b: &CalculationResult) -> f64 {
    a.nodes
        .iter()
        .zip(b.nodes.iter())
        .flat_map(|(x, y)| {
            PHASES.map(|p| (x.phase_voltage_v(p) - y.phase_voltage_v(p)).abs())
        })
        .fold(0.0, f64::max)
}

fn activate(
    network: &PreparedNetwork,
    regulators: &mut [VoltageRegulator],
    diagnostics: &mut Diagnostics,
) -> Vec<ActiveRegulator> {
    let mut active: Vec<ActiveRegulator> = vec![];

    for (device, regulator) in regulators.iter_mut().enumerate() {
        let reason = if !regulator.enabled {
            Some(InactiveReason::Disabled)
        } else if !network.contains(&regulator.node_id) {
            diagnostics.error(
                Category::Equipment,
                Some(regulator.id.as_str()),
                format!("Node {} is not part of the network.", regulator.node_id),
            );
            Some(InactiveReason::NodeNotFound)
        } else if !regulator.has_valid_settings() {
            diagnostics.error(
                Category::Equipment,
                Some(regulator.id.as_str()),
                "Thresholds or steps are not consistent.",
            );
            Some(InactiveReason::InvalidSettings)
        } else if active.iter().any(|a| a.node_id == regulator.node_id) {
            diagnostics.warn(
                Category::Equipment,
                Some(regulator.id.as_str()),
                format!("Another regulator already acts on node {}.", regulator.node_id),
            );
            Some(InactiveReason::DuplicateNode)
        } else {
            let path = network
                .path_impedance(&regulator.node_id)
                .map(|(z1, _)| z1.norm())
                .unwrap_or(f64::INFINITY);
            match regulator.max_path_impedance_ohm {
                Some(max) if path > max => {
                    diagnostics.warn(
                        Category::Equipment,
                        Some(regulator.id.as_str()),
                        format!(
                            "Path impedance {path:.4} ohm exceeds the limit of {max:.4} ohm."
                        ),
                    );
                    Some(InactiveReason::Ineligible)
                }
                _ => None,
            }
        };

        match reason {
            Some(reason) => {
                tracing::debug!("Regulator {} is inactive: {:?}", regulator.id, reason);
                regulator.result = Some(RegulatorOutcome::inactive(reason));
            }
            None => active.push(ActiveRegulator {
                device,
                node_id: regulator.node_id.clone(),
            }),
        }
    }

    active
}

/// Runs the regulators to a fixed point on top of `baseline`.
///
/// Returns the regulated result and the convergence report, or `None` when
/// no regulator is active.
pub(crate) fn regulate(
    calculator: &ElectricalCalculator,
    network: &PreparedNetwork,
    inputs: &FlowInputs,
    regulators: &mut [VoltageRegulator],
    baseline: &CalculationResult,
    diagnostics: &mut Diagnostics,
) -> Option<(CalculationResult, ConvergenceReport)> {
    let active = activate(network, regulators, diagnostics);
    if active.is_empty() {
        return None;
    }

    let system = network.voltage_system();
    let nominal = system.reference_voltage();
    let tolerance = calculator.config().regulation.tolerance;
    let devices: &[VoltageRegulator] = regulators;

    let initial = RegulationState {
        states: vec![[RegulatorState::Byp; 3]; active.len()],
        result: baseline.clone(),
    };

    let (state, report) = run_fixed_point(&calculator.config().regulation, initial, |current| {
        let states = active
            .iter()
            .zip(current.states.iter())
            .map(|(a, previous)| {
                let voltages = upstream_voltages(network, &current.result, &a.node_id);
                devices[a.device].select_states(voltages, nominal, *previous)
            })
            .collect::<Vec<_>>();

        if states == current.states {
            return (0.0, current.clone());
        }

        let mut table = RegulationTable::new();
        for (a, s) in active.iter().zip(states.iter()) {
            table.set(a.node_id.clone(), devices[a.device].ratios(*s));
        }
        tracing::debug!("Re-solving with {} regulated nodes.", table.len());
        let result = calculator.solve(network, inputs, &table);
        let error = max_voltage_change(&result, &current.result).max(tolerance);

        (error, RegulationState { states, result })
    });

    if !report.converged() {
        tracing::warn!(
            "Voltage regulators did not converge after {} iterations ({:?}).",
            report.iterations,
            report.reason
        );
        diagnostics.warn(
            Category::Convergence,
            None,
            format!(
                "Voltage regulators did not converge after {} iterations.",
                report.iterations
            ),
        );
    }

    for (a, states) in active.iter().zip(state.states.iter()) {
        let regulator = &mut regulators[a.device];
        let input_voltages_v = upstream_voltages(network, &state.result, &a.node_id);
        let output_voltages_v = state
            .result
            .node(&a.node_id)
            .map(|n| n.phase_voltages_v)
            .unwrap_or([0.0; 3]);
        let power_through_kva = power_through(network, &state.result, &a.node_id);
        let limited = if power_through_kva >= 0.0 {
            regulator
                .max_withdrawal_kva
                .is_some_and(|max| power_through_kva > max)
        } else {
            regulator
                .max_injection_kva
                .is_some_and(|max| -power_through_kva > max)
        };
        if limited {
            tracing::warn!(
                "Regulator {} carries {:.1} kVA, above its limit.",
                regulator.id,
                power_through_kva.abs()
            );
            diagnostics.warn(
                Category::Equipment,
                Some(regulator.id.as_str()),
                format!(
                    "Power through the regulator ({:.1} kVA) exceeds its limit.",
                    power_through_kva.abs()
                ),
            );
        }

        regulator.result = Some(RegulatorOutcome {
            status: DeviceStatus::Active,
            states: *states,
            ratios: regulator.ratios(*states),
            input_voltages_v,
            output_voltages_v,
            power_through_kva,
            limited,
            convergence: Some(report.clone()),
        });
    }

    Some((state.result, report))
}

/// Net power of the node and everything downstream of it, loads minus
/// productions.
fn power_through(network: &PreparedNetwork, result: &CalculationResult, node_id: &str) -> f64 {
    let Ok(position) = network.position(node_id) else {
        return 0.0;
    };
    std::iter::once(position)
        .chain(network.downstream_of(position))
        .filter_map(|i| result.nodes.get(i))
        .map(|n| n.load_kva - n.production_kva)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn regulator() -> VoltageRegulator {
        VoltageRegulator::new("srg2-1", "n1")
    }

    #[test]
    fn test_band_selection() {
        let t = RegulatorThresholds::default();
        let byp = RegulatorState::Byp;
        assert_eq!(RegulatorState::select(250.0, &t, byp), RegulatorState::Lo2);
        assert_eq!(RegulatorState::select(240.0, &t, byp), RegulatorState::Lo1);
        assert_eq!(RegulatorState::select(230.0, &t, byp), RegulatorState::Byp);
        assert_eq!(RegulatorState::select(220.0, &t, byp), RegulatorState::Bo1);
        assert_eq!(RegulatorState::select(214.0, &t, byp), RegulatorState::Bo2);
        assert_eq!(RegulatorState::select(f64::NAN, &t, byp), RegulatorState::Byp);
    }

    #[test]
    fn test_hysteresis_gaps() {
        let t = RegulatorThresholds::default();
        // Between the bypass band and LO1.
        assert_eq!(
            RegulatorState::select(237.0, &t, RegulatorState::Lo2),
            RegulatorState::Lo1
        );
        assert_eq!(
            RegulatorState::select(237.0, &t, RegulatorState::Byp),
            RegulatorState::Byp
        );
        assert_eq!(
            RegulatorState::select(237.0, &t, RegulatorState::Bo1),
            RegulatorState::Byp
        );
        // Between BO1 and the bypass band.
        assert_eq!(
            RegulatorState::select(223.0, &t, RegulatorState::Bo1),
            RegulatorState::Bo1
        );
        assert_eq!(
            RegulatorState::select(224.0, &t, RegulatorState::Lo1),
            RegulatorState::Byp
        );
    }

    #[test]
    fn test_ratios() {
        assert_eq!(RegulatorState::Byp.ratio(3.75, 7.5), 1.0);
        assert_abs_diff_eq!(RegulatorState::Lo1.ratio(3.75, 7.5), 0.9625, epsilon = 1e-12);
        assert_abs_diff_eq!(RegulatorState::Bo2.ratio(3.75, 7.5), 1.075, epsilon = 1e-12);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(RegulatorThresholds::default().is_valid());
        let inverted = RegulatorThresholds {
            bypass_upper_v: 220.0,
            ..Default::default()
        };
        assert!(!inverted.is_valid());
    }

    #[test]
    fn test_cross_phase_conflict() {
        let byp = [RegulatorState::Byp; 3];

        // B deviates more than A: boosting wins and A is forced to bypass.
        let states = regulator().select_states([250.0, 205.0, 230.0], 230.0, byp);
        assert_eq!(
            states,
            [RegulatorState::Byp, RegulatorState::Bo2, RegulatorState::Byp]
        );

        // A deviates more than B: lowering wins.
        let states = regulator().select_states([258.0, 212.0, 230.0], 230.0, byp);
        assert_eq!(
            states,
            [RegulatorState::Lo2, RegulatorState::Byp, RegulatorState::Byp]
        );

        // Without the constraint each phase follows its own threshold.
        let mut free = regulator();
        free.single_direction = false;
        let states = free.select_states([250.0, 205.0, 230.0], 230.0, byp);
        assert_eq!(
            states,
            [RegulatorState::Lo2, RegulatorState::Bo2, RegulatorState::Byp]
        );
    }
}
