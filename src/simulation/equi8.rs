// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Neutral current compensator.
//!
//! The compensator draws the neutral current of its node through a
//! low-impedance zig-zag path, which brings the phase voltages closer to
//! their mean.  Its effect is estimated with an empirical model on top of a
//! solved result, in a single pass without re-solving the network.

use serde::{Deserialize, Serialize};

use super::{DeviceStatus, InactiveReason};
use crate::calculator::{update_compliance, update_node_voltages, PreparedNetwork};
use crate::config::ComplianceLimits;
use crate::diagnostics::{Category, Diagnostics};
use crate::phasor::MIN_DIVISOR;
use crate::result::CalculationResult;

/// Spread of the phase voltages below which there is nothing to balance.
const MIN_SPREAD_V: f64 = 1e-3;

/// A neutral current compensator installed at a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeutralCompensator {
    pub id: String,
    pub node_id: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Phase impedance seen by the device.  Derived from the path to the
    /// source when absent.
    #[serde(default)]
    pub zph_ohm: Option<f64>,
    /// Neutral impedance seen by the device.  Derived from the path to the
    /// source when absent.
    #[serde(default)]
    pub zn_ohm: Option<f64>,
    #[serde(default = "min_neutral_current")]
    pub min_neutral_current_a: f64,
    #[serde(default)]
    pub max_power_kva: Option<f64>,
    /// Impedances below this value are outside the validity range of the
    /// model.
    #[serde(default = "min_impedance")]
    pub min_impedance_ohm: f64,
    /// Overwritten by every simulation.
    #[serde(skip_deserializing)]
    pub result: Option<CompensatorOutcome>,
}

fn enabled() -> bool {
    true
}

fn min_neutral_current() -> f64 {
    1.0
}

fn min_impedance() -> f64 {
    0.15
}

impl NeutralCompensator {
    pub fn new(id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            enabled: true,
            zph_ohm: None,
            zn_ohm: None,
            min_neutral_current_a: min_neutral_current(),
            max_power_kva: None,
            min_impedance_ohm: min_impedance(),
            result: None,
        }
    }
}

/// What a compensator did in the last simulation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompensatorOutcome {
    pub status: DeviceStatus,
    pub initial_neutral_current_a: f64,
    pub neutral_current_a: f64,
    pub reduction_percent: f64,
    pub initial_voltages_v: [f64; 3],
    pub voltages_v: [f64; 3],
    pub zph_ohm: f64,
    pub zn_ohm: f64,
    pub apparent_power_kva: f64,
    /// The apparent power exceeds `max_power_kva`.
    pub limited: bool,
    /// An impedance is below `min_impedance_ohm`.
    pub precision_warning: bool,
}

impl CompensatorOutcome {
    /// An outcome that leaves the node untouched.
    fn unchanged(status: DeviceStatus, neutral_current_a: f64, voltages_v: [f64; 3]) -> Self {
        Self {
            status,
            initial_neutral_current_a: neutral_current_a,
            neutral_current_a,
            reduction_percent: 0.0,
            initial_voltages_v: voltages_v,
            voltages_v,
            zph_ohm: 0.0,
            zn_ohm: 0.0,
            apparent_power_kva: 0.0,
            limited: false,
            precision_warning: false,
        }
    }
}

/// Result of the empirical model for one node.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Compensation {
    pub(crate) neutral_current_a: f64,
    pub(crate) voltages_v: [f64; 3],
    pub(crate) reduction_percent: f64,
}

/// Applies the empirical compensation model.
///
/// `voltages_v` are the phase voltages at the node and `neutral_current_a`
/// the neutral current of its feeder, before compensation.
pub(crate) fn compensation(
    voltages_v: [f64; 3],
    neutral_current_a: f64,
    zph_ohm: f64,
    zn_ohm: f64,
) -> Compensation {
    let mean = voltages_v.iter().sum::<f64>() / 3.0;
    let max = voltages_v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = voltages_v.iter().copied().fold(f64::INFINITY, f64::min);
    let spread = max - min;

    let k = 2.0 * zph_ohm / (zph_ohm + zn_ohm);
    let denominator = 0.9119 * zph_ohm.ln() + 3.8654;
    let factor = if denominator <= 0.0 {
        1.0
    } else {
        (k / denominator).min(1.0)
    };
    let spread_after = spread * factor;

    let current = (0.392 * zph_ohm.powf(-0.8065) * spread * k).min(neutral_current_a);
    let voltages_after = voltages_v.map(|u| mean + (u - mean) / spread * spread_after);

    Compensation {
        neutral_current_a: current,
        voltages_v: voltages_after,
        reduction_percent: if neutral_current_a > 0.0 {
            (neutral_current_a - current) / neutral_current_a * 100.0
        } else {
            0.0
        },
    }
}

/// Scales the phasors of a node so that their reference magnitudes become
/// `voltages_v`.
fn rescale(result: &mut CalculationResult, position: usize, voltages_v: [f64; 3]) {
    let Some(node) = result.nodes.get_mut(position) else {
        return;
    };
    for p in 0..3 {
        let before = node.phase_voltages_v[p];
        if before > MIN_DIVISOR {
            node.phasors[p] *= voltages_v[p].max(0.0) / before;
        }
    }
}

/// Applies the compensators to `result`, one after the other.
pub(crate) fn compensate(
    network: &PreparedNetwork,
    result: &mut CalculationResult,
    compensators: &mut [NeutralCompensator],
    limits: &ComplianceLimits,
    diagnostics: &mut Diagnostics,
) {
    let system = network.voltage_system();
    let mut seen: Vec<String> = vec![];
    let mut changed = false;

    for compensator in compensators.iter_mut() {
        let outcome = match apply(network, result, compensator, &seen, diagnostics) {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::debug!("Compensator {} is inactive: {:?}", compensator.id, reason);
                let node = result.node(&compensator.node_id);
                CompensatorOutcome::unchanged(
                    DeviceStatus::Inactive(reason),
                    node.map(|n| n.neutral_current_a).unwrap_or(0.0),
                    node.map(|n| n.phase_voltages_v).unwrap_or([0.0; 3]),
                )
            }
        };
        if outcome.status == DeviceStatus::Active {
            seen.push(compensator.node_id.clone());
            changed = true;
        }
        compensator.result = Some(outcome);
    }

    if changed {
        for node in result.nodes.iter_mut() {
            update_node_voltages(node, system, false);
        }
        update_compliance(result, limits);
    }
}

fn apply(
    network: &PreparedNetwork,
    result: &mut CalculationResult,
    compensator: &NeutralCompensator,
    seen: &[String],
    diagnostics: &mut Diagnostics,
) -> Result<CompensatorOutcome, InactiveReason> {
    let entity = Some(compensator.id.as_str());
    if !compensator.enabled {
        return Err(InactiveReason::Disabled);
    }
    let Ok(position) = network.position(&compensator.node_id) else {
        diagnostics.error(
            Category::Equipment,
            entity,
            format!("Node {} is not part of the network.", compensator.node_id),
        );
        return Err(InactiveReason::NodeNotFound);
    };
    if seen.contains(&compensator.node_id) {
        diagnostics.warn(
            Category::Equipment,
            entity,
            format!("Another compensator already acts on node {}.", compensator.node_id),
        );
        return Err(InactiveReason::DuplicateNode);
    }
    if !network.voltage_system().has_neutral() {
        return Err(InactiveReason::NoNeutral);
    }

    let (path_z1, path_zn) = network
        .path_impedance(&compensator.node_id)
        .map_err(|_| InactiveReason::NodeNotFound)?;
    let zph = compensator.zph_ohm.unwrap_or(path_z1.norm());
    let zn = compensator.zn_ohm.unwrap_or(path_zn.norm());
    if !(zph.is_finite() && zph > 0.0 && zn.is_finite() && zn >= 0.0) {
        diagnostics.error(
            Category::Equipment,
            entity,
            format!("Impedances Zph = {zph} ohm and Zn = {zn} ohm are not usable."),
        );
        return Err(InactiveReason::InvalidSettings);
    }

    let node = result
        .nodes
        .get(position)
        .ok_or(InactiveReason::NodeNotFound)?;
    let initial_voltages = node.phase_voltages_v;
    let initial_current = node.neutral_current_a;
    let spread = node.max_voltage_v() - node.min_voltage_v();
    if initial_current <= compensator.min_neutral_current_a.max(0.0)
        || spread.is_nan()
        || spread < MIN_SPREAD_V
    {
        return Err(InactiveReason::BelowThreshold);
    }

    let compensated = compensation(initial_voltages, initial_current, zph, zn);
    let mean = initial_voltages.iter().sum::<f64>() / 3.0;
    let apparent_power_kva = compensated.neutral_current_a * mean / 1000.0;

    let limited = compensator
        .max_power_kva
        .is_some_and(|max| apparent_power_kva > max);
    if limited {
        tracing::warn!(
            "Compensator {} needs {:.2} kVA, above its rating.",
            compensator.id,
            apparent_power_kva
        );
        diagnostics.warn(
            Category::Equipment,
            entity,
            format!("Apparent power {apparent_power_kva:.2} kVA exceeds the device rating."),
        );
    }
    let precision_warning =
        zph < compensator.min_impedance_ohm || zn < compensator.min_impedance_ohm;
    if precision_warning {
        diagnostics.warn(
            Category::Equipment,
            entity,
            format!(
                "Impedances below {} ohm are outside the validity range of the model.",
                compensator.min_impedance_ohm
            ),
        );
    }

    let corrections = [0, 1, 2].map(|p| compensated.voltages_v[p] - initial_voltages[p]);
    rescale(result, position, compensated.voltages_v);
    if let Some(node) = result.nodes.get_mut(position) {
        node.neutral_current_a = compensated.neutral_current_a;
    }
    if let Some(cable) = result
        .cables
        .iter_mut()
        .find(|c| c.to_node_id == compensator.node_id)
    {
        cable.neutral_current_a = compensated.neutral_current_a;
    }

    for downstream in network.downstream_of(position) {
        let Some(node) = result.nodes.get(downstream) else {
            continue;
        };
        let distance = (network.nodes[downstream].path_z1 - path_z1).norm();
        let shift = distance * compensated.neutral_current_a;
        let voltages = [0, 1, 2].map(|p| node.phase_voltages_v[p] + corrections[p] - shift);
        rescale(result, downstream, voltages);
    }

    tracing::debug!(
        "Compensator {} reduced the neutral current from {:.2} A to {:.2} A.",
        compensator.id,
        initial_current,
        compensated.neutral_current_a
    );

    Ok(CompensatorOutcome {
        status: DeviceStatus::Active,
        initial_neutral_current_a: initial_current,
        neutral_current_a: compensated.neutral_current_a,
        reduction_percent: compensated.reduction_percent,
        initial_voltages_v: initial_voltages,
        voltages_v: compensated.voltages_v,
        zph_ohm: zph,
        zn_ohm: zn,
        apparent_power_kva,
        limited,
        precision_warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, Scenario};
    use crate::test_utils::NetworkBuilder;
    use crate::{ElectricalCalculator, Error};
    use approx::assert_abs_diff_eq;

    fn street(builder: NetworkBuilder) -> Project {
        builder
            .node("n1", 0.0, 0.0)
            .node("n2", 30.0, 0.0)
            .node("n3", 10.0, 0.0)
            .cable("c1", "S", "n1", 150.0)
            .cable("c2", "n1", "n2", 150.0)
            .cable("c3", "n2", "n3", 100.0)
            .build()
    }

    fn run(
        project: &Project,
        compensators: &mut [NeutralCompensator],
    ) -> Result<(CalculationResult, CalculationResult), Error> {
        let calculator = ElectricalCalculator::default();
        let network = calculator.prepare(project)?;
        let before = calculator.calculate(project, Scenario::Withdrawal)?;
        let mut after = before.clone();
        let mut diagnostics = Diagnostics::new();
        compensate(
            &network,
            &mut after,
            compensators,
            &calculator.config().limits,
            &mut diagnostics,
        );
        after.diagnostics.extend(diagnostics);
        Ok((before, after))
    }

    #[test]
    fn test_compensation_model() {
        let c = compensation([235.0, 225.0, 227.0], 40.0, 0.3, 0.3);
        assert_abs_diff_eq!(c.neutral_current_a, 10.351_130, epsilon = 1e-5);
        assert_abs_diff_eq!(c.voltages_v[0], 231.168_024, epsilon = 1e-5);
        assert_abs_diff_eq!(c.voltages_v[1], 227.554_651, epsilon = 1e-5);
        assert_abs_diff_eq!(c.voltages_v[2], 228.277_325, epsilon = 1e-5);
        assert_abs_diff_eq!(c.reduction_percent, 74.122_174, epsilon = 1e-5);

        // The current can't exceed the initial neutral current.
        let c = compensation([235.0, 225.0, 227.0], 5.0, 0.3, 0.3);
        assert_eq!(c.neutral_current_a, 5.0);
        assert_eq!(c.reduction_percent, 0.0);

        // Without neutral current there is nothing to reduce.
        let c = compensation([235.0, 225.0, 227.0], 0.0, 0.3, 0.3);
        assert_eq!(c.neutral_current_a, 0.0);
        assert_eq!(c.reduction_percent, 0.0);
    }

    #[test]
    fn test_negative_threshold_is_ignored() -> Result<(), Error> {
        let project = street(NetworkBuilder::four_wire());
        let mut compensator = NeutralCompensator::new("equi8-1", "n2");
        compensator.min_neutral_current_a = -1.0;
        let mut compensators = [compensator];

        let (before, after) = run(&project, &mut compensators)?;
        assert_eq!(before, after);

        let outcome = compensators[0].result.as_ref().unwrap();
        assert_eq!(
            outcome.status,
            DeviceStatus::Inactive(InactiveReason::BelowThreshold)
        );
        assert_eq!(outcome.neutral_current_a, 0.0);
        assert_eq!(outcome.reduction_percent, 0.0);

        Ok(())
    }

    #[test]
    fn test_below_threshold_is_noop() -> Result<(), Error> {
        let project = street(NetworkBuilder::four_wire());
        let mut compensators = [NeutralCompensator::new("equi8-1", "n2")];

        let (before, after) = run(&project, &mut compensators)?;
        assert_eq!(before, after);

        let outcome = compensators[0].result.as_ref().unwrap();
        assert_eq!(
            outcome.status,
            DeviceStatus::Inactive(InactiveReason::BelowThreshold)
        );
        assert_eq!(outcome.reduction_percent, 0.0);
        assert_eq!(outcome.voltages_v, outcome.initial_voltages_v);

        Ok(())
    }

    #[test]
    fn test_three_wire_has_no_neutral() -> Result<(), Error> {
        let project = street(NetworkBuilder::three_wire().unbalanced(60.0));
        let mut compensators = [NeutralCompensator::new("equi8-1", "n2")];

        let (before, after) = run(&project, &mut compensators)?;
        assert_eq!(before, after);
        assert_eq!(
            compensators[0].result.as_ref().unwrap().status,
            DeviceStatus::Inactive(InactiveReason::NoNeutral)
        );

        Ok(())
    }

    #[test]
    fn test_compensation_balances_the_node() -> Result<(), Error> {
        let project = street(NetworkBuilder::four_wire().unbalanced(60.0));
        let mut compensators = [
            NeutralCompensator::new("equi8-1", "n2"),
            NeutralCompensator::new("equi8-2", "n2"),
            NeutralCompensator::new("equi8-3", "n9"),
        ];

        let (before, after) = run(&project, &mut compensators)?;
        let outcome = compensators[0].result.as_ref().unwrap();
        assert_eq!(outcome.status, DeviceStatus::Active);
        assert!(outcome.initial_neutral_current_a > 1.0);
        assert!(outcome.neutral_current_a <= outcome.initial_neutral_current_a);
        assert!(outcome.reduction_percent >= 0.0);
        // Zph of 300 m of T1 cable is below the validity range.
        assert!(outcome.precision_warning);

        let spread = |v: [f64; 3]| {
            v.iter().copied().fold(f64::NEG_INFINITY, f64::max)
                - v.iter().copied().fold(f64::INFINITY, f64::min)
        };
        assert!(spread(outcome.voltages_v) < spread(outcome.initial_voltages_v));
        assert_abs_diff_eq!(
            outcome.voltages_v.iter().sum::<f64>(),
            outcome.initial_voltages_v.iter().sum::<f64>(),
            epsilon = 1e-9
        );

        let node = after.node("n2").unwrap();
        for p in 0..3 {
            assert_abs_diff_eq!(node.phase_voltages_v[p], outcome.voltages_v[p], epsilon = 1e-9);
        }
        assert_eq!(node.neutral_current_a, outcome.neutral_current_a);
        assert_eq!(
            after.cable("c2").unwrap().neutral_current_a,
            outcome.neutral_current_a
        );

        // Upstream nodes are untouched, downstream nodes follow.
        assert_eq!(before.node("n1"), after.node("n1"));
        assert_ne!(before.node("n3"), after.node("n3"));

        assert_eq!(
            compensators[1].result.as_ref().unwrap().status,
            DeviceStatus::Inactive(InactiveReason::DuplicateNode)
        );
        assert_eq!(
            compensators[2].result.as_ref().unwrap().status,
            DeviceStatus::Inactive(InactiveReason::NodeNotFound)
        );
        assert!(after
            .diagnostics
            .in_category(Category::Equipment)
            .any(|i| i.entity.as_deref() == Some("equi8-3")));

        Ok(())
    }
}
