// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Turns a converged flow state into a [`CalculationResult`].

use crate::config::ComplianceLimits;
use crate::diagnostics::{Category, Diagnostics};
use crate::model::{LoadModel, VoltageSystem};
use crate::phasor::Phasor;
use crate::result::{
    CableResult, CalculationResult, CircuitSummary, Compliance, Direction, NodeResult,
    VirtualBusbar,
};

use super::injection::{FlowInputs, NodeInjection};
use super::sweep::FlowState;
use super::PreparedNetwork;

/// Phase whose magnitude is reported for phase `p`.  In the balanced model
/// all phases report phase A, so they are identical.
fn source_phase(balanced: bool, p: usize) -> usize {
    if balanced {
        0
    } else {
        p
    }
}

/// Signed drop of a reference voltage, in percent of the reference.
fn drop_percent(system: VoltageSystem, reference_v: f64) -> f64 {
    let nominal = system.reference_voltage();
    (nominal - reference_v) / nominal * 100.0
}

/// Recomputes the reference voltages and drops of a node from its phasors.
pub(crate) fn update_node_voltages(node: &mut NodeResult, system: VoltageSystem, balanced: bool) {
    let phasors = node.phasors;
    node.phase_voltages_v =
        [0, 1, 2].map(|p| system.to_reference(phasors[source_phase(balanced, p)].norm()));
    node.voltage_v = node.phase_voltages_v.iter().sum::<f64>() / 3.0;
    node.phase_drop_percent = node.phase_voltages_v.map(|v| drop_percent(system, v));
    node.voltage_drop_percent = node
        .phase_drop_percent
        .iter()
        .copied()
        .fold(0.0, |worst: f64, d| if d.abs() > worst.abs() { d } else { worst });
}

/// Recomputes the compliance totals and the circuit voltage ranges from the
/// node voltages of `result`.
pub(crate) fn update_compliance(result: &mut CalculationResult, limits: &ComplianceLimits) {
    let mut under: f64 = 0.0;
    let mut over: f64 = 0.0;
    let mut worst: f64 = 0.0;
    let mut worst_circuit = None;

    for node in &result.nodes {
        for &d in &node.phase_drop_percent {
            if d > 0.0 {
                under = under.max(d);
            } else {
                over = over.max(-d);
            }
            if d.abs() > worst.abs() {
                worst = d;
                worst_circuit = node.circuit;
            }
        }
    }

    result.max_undervoltage_percent = under;
    result.max_overvoltage_percent = over;
    result.max_voltage_drop_percent = worst;
    result.max_voltage_drop_circuit = worst_circuit;
    result.compliance = if worst.abs() > limits.critical_percent {
        Compliance::Critical
    } else if worst.abs() > limits.warning_percent {
        Compliance::Warning
    } else {
        Compliance::Normal
    };

    for circuit in result.virtual_busbar.circuits.iter_mut() {
        let nodes = result
            .nodes
            .iter()
            .filter(|n| n.circuit == Some(circuit.number));
        let (min, max) = nodes.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), n| {
            (lo.min(n.min_voltage_v()), hi.max(n.max_voltage_v()))
        });
        if min.is_finite() && max.is_finite() {
            circuit.min_voltage_v = min;
            circuit.max_voltage_v = max;
        }
    }
}

/// Builds the result of one solver pass.
pub(crate) fn build_result(
    network: &PreparedNetwork,
    inputs: &FlowInputs,
    injections: &[NodeInjection],
    state: &FlowState,
    limits: &ComplianceLimits,
    mut diagnostics: Diagnostics,
) -> CalculationResult {
    let system = network.voltage_system;
    let balanced = inputs.load_model == LoadModel::Balanced;
    let phase = |p| source_phase(balanced, p);

    // Σ over the phases of a per-phase quantity, phase A three times in the
    // balanced model.
    let phase_sum = |f: &dyn Fn(usize) -> Phasor| -> Phasor {
        [0, 1, 2].iter().map(|&p| f(phase(p))).sum()
    };

    let nodes = network
        .nodes
        .iter()
        .enumerate()
        .map(|(n, node)| {
            let mut result = NodeResult {
                node_id: node.id.clone(),
                circuit: node.circuit,
                voltage_v: 0.0,
                phase_voltages_v: [0.0; 3],
                voltage_drop_percent: 0.0,
                phase_drop_percent: [0.0; 3],
                phasors: state.voltages[n],
                upstream_phasors: state.upstream[n],
                neutral_current_a: state.neutral_currents[n].norm(),
                load_kva: injections[n].load_kva,
                production_kva: injections[n].production_kva,
            };
            update_node_voltages(&mut result, system, balanced);
            result
        })
        .collect::<Vec<_>>();

    let mut cable_losses_kw = 0.0;
    let cables = network
        .cable_order
        .iter()
        .filter_map(|&n| {
            let node = &network.nodes[n];
            let (feeder, parent) = (node.feeder.as_ref()?, node.parent?);
            let currents = state.branch_currents[n];
            let phase_currents_a = [0, 1, 2].map(|p| currents[phase(p)].norm());
            let current_a = phase_currents_a.iter().copied().fold(0.0, f64::max);
            let neutral_current_a = state.neutral_currents[n].norm();

            let losses_w = phase_currents_a.iter().map(|i| i * i * feeder.z1.re).sum::<f64>()
                + neutral_current_a.powi(2) * feeder.zn.map(|z| z.re).unwrap_or(0.0);
            cable_losses_kw += losses_w / 1000.0;

            let apparent = phase_sum(&|p| state.voltages[parent][p] * currents[p].conj());
            let voltage_drop_v = [0, 1, 2]
                .map(|p| {
                    system.to_reference(state.voltages[parent][phase(p)].norm())
                        - system.to_reference(state.upstream[n][phase(p)].norm())
                })
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max);

            let overloaded = feeder.ampacity_a.is_some_and(|a| current_a > a);
            if overloaded {
                tracing::warn!(
                    "Cable {} carries {:.1} A, above its ampacity.",
                    feeder.cable_id,
                    current_a
                );
                diagnostics.warn(
                    Category::Equipment,
                    Some(feeder.cable_id.as_str()),
                    format!("Current {current_a:.1} A exceeds the cable ampacity."),
                );
            }

            Some(CableResult {
                cable_id: feeder.cable_id.clone(),
                name: feeder.name.clone(),
                circuit: node.circuit,
                from_node_id: network.nodes[parent].id.clone(),
                to_node_id: node.id.clone(),
                length_m: feeder.length_m,
                phase_currents_a,
                current_a,
                neutral_current_a,
                apparent_power_kva: apparent.norm() / 1000.0,
                voltage_drop_v,
                voltage_drop_percent: voltage_drop_v / system.reference_voltage() * 100.0,
                losses_kw: losses_w / 1000.0,
                ampacity_a: feeder.ampacity_a,
                overloaded,
            })
        })
        .collect::<Vec<_>>();

    let transformer_currents = state.branch_currents.first().copied().unwrap_or_default();
    let r_tr = network.transformer.map(|t| t.series.re).unwrap_or(0.0);
    let transformer_losses_kw = [0, 1, 2]
        .iter()
        .map(|&p| transformer_currents[phase(p)].norm_sqr() * r_tr)
        .sum::<f64>()
        / 1000.0;
    let source_power = phase_sum(&|p| state.emf[p] * transformer_currents[p].conj());

    let total_load_kva = injections.iter().map(|i| i.load_kva).sum::<f64>();
    let total_production_kva = injections.iter().map(|i| i.production_kva).sum::<f64>();

    let circuits = network
        .circuits
        .iter()
        .filter_map(|circuit| {
            let head = *network.index.get(&circuit.head_node_id)?;
            let currents = state.branch_currents[head];
            let power = phase_sum(&|p| state.voltages[0][p] * currents[p].conj()) / 1000.0;
            Some(CircuitSummary {
                number: circuit.number,
                cable_id: circuit.cable_id.clone(),
                apparent_power_kva: power.norm(),
                active_power_kw: power.re,
                reactive_power_kvar: power.im,
                direction: if power.re < 0.0 {
                    Direction::Injection
                } else {
                    Direction::Withdrawal
                },
                current_a: [0, 1, 2]
                    .map(|p| currents[phase(p)].norm())
                    .into_iter()
                    .fold(0.0, f64::max),
                voltage_drop_v: cables
                    .iter()
                    .find(|c| c.cable_id == circuit.cable_id)
                    .map(|c| c.voltage_drop_v)
                    .unwrap_or(0.0),
                min_voltage_v: 0.0,
                max_voltage_v: 0.0,
                node_count: nodes
                    .iter()
                    .filter(|n| n.circuit == Some(circuit.number))
                    .count(),
            })
        })
        .collect::<Vec<_>>();

    let transformer_voltage_drop_v = state
        .upstream
        .first()
        .map(|v| {
            [0, 1, 2]
                .map(|p| {
                    system.to_reference(state.emf[p].norm())
                        - system.to_reference(v[phase(p)].norm())
                })
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .unwrap_or(0.0);

    let transformer_current_a = [0, 1, 2]
        .map(|p| transformer_currents[phase(p)].norm())
        .into_iter()
        .fold(0.0, f64::max);
    let transformer_loading_percent = network
        .transformer
        .filter(|t| t.nominal_current_a > 0.0)
        .map(|t| transformer_current_a / t.nominal_current_a * 100.0)
        .unwrap_or(0.0);

    let virtual_busbar = VirtualBusbar {
        voltage_v: nodes.first().map(|n| n.voltage_v).unwrap_or(0.0),
        net_apparent_power_kva: total_load_kva - total_production_kva,
        transformer_current_a,
        transformer_loading_percent,
        transformer_voltage_drop_v,
        transformer_voltage_drop_percent: transformer_voltage_drop_v / system.reference_voltage()
            * 100.0,
        transformer_losses_kw,
        circuits,
    };

    let mut result = CalculationResult {
        scenario: inputs.scenario,
        load_model: inputs.load_model,
        nodes,
        cables,
        total_load_kva,
        total_production_kva,
        cable_losses_kw,
        transformer_losses_kw,
        total_losses_kw: cable_losses_kw + transformer_losses_kw,
        source_active_power_kw: source_power.re / 1000.0,
        source_reactive_power_kvar: source_power.im / 1000.0,
        max_voltage_drop_percent: 0.0,
        max_voltage_drop_circuit: None,
        max_undervoltage_percent: 0.0,
        max_overvoltage_percent: 0.0,
        compliance: Compliance::Normal,
        virtual_busbar,
        disconnected_node_ids: network.disconnected.clone(),
        sweep_iterations: state.iterations,
        sweep_converged: state.converged,
        calibration: None,
        diagnostics,
    };
    update_compliance(&mut result, limits);

    result
}
