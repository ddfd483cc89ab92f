// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Plain result data of a calculation, handed over to the reporting layer.
//!
//! Voltages are given in reference volts (see
//! [`VoltageSystem::reference_voltage`](crate::model::VoltageSystem::reference_voltage)),
//! phasors in star-equivalent phase volts, powers in kVA, kW and kvar.

use serde::Serialize;

use crate::diagnostics::Diagnostics;
use crate::model::{LoadModel, PhaseDistribution, Scenario};
use crate::phasor::{Phase, Phasor};
use crate::simulation::ConvergenceStatus;

/// Voltage drop classification of a calculation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Compliance {
    Normal,
    Warning,
    Critical,
}

/// Direction of the power flowing through a circuit head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// The circuit exports towards the transformer.
    Injection,
    /// The circuit draws from the transformer.
    Withdrawal,
}

/// Voltage metrics of one connected node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeResult {
    pub node_id: String,
    pub circuit: Option<usize>,
    /// Mean of the phase voltages.
    pub voltage_v: f64,
    pub phase_voltages_v: [f64; 3],
    /// Voltage drop of the worst phase, in percent of the reference
    /// voltage.  Negative values are over-voltages.
    pub voltage_drop_percent: f64,
    pub phase_drop_percent: [f64; 3],
    /// Phase voltage phasors at the node.
    pub phasors: [Phasor; 3],
    /// Phase voltage phasors at the node before a regulator installed on it
    /// applies its ratio.  Equal to `phasors` on unregulated nodes.
    pub upstream_phasors: [Phasor; 3],
    /// Neutral current of the cable feeding the node, in amperes.
    pub neutral_current_a: f64,
    /// Load and production at the node, after diversity.
    pub load_kva: f64,
    pub production_kva: f64,
}

impl NodeResult {
    pub fn min_voltage_v(&self) -> f64 {
        self.phase_voltages_v
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max_voltage_v(&self) -> f64 {
        self.phase_voltages_v
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn phase_voltage_v(&self, phase: Phase) -> f64 {
        self.phase_voltages_v[phase.index()]
    }
}

/// Flow through one cable of the tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CableResult {
    pub cable_id: String,
    pub name: String,
    pub circuit: Option<usize>,
    /// The end closer to the source.
    pub from_node_id: String,
    pub to_node_id: String,
    pub length_m: f64,
    pub phase_currents_a: [f64; 3],
    /// Largest phase current.
    pub current_a: f64,
    pub neutral_current_a: f64,
    pub apparent_power_kva: f64,
    /// Largest phase voltage drop along the cable.
    pub voltage_drop_v: f64,
    pub voltage_drop_percent: f64,
    pub losses_kw: f64,
    pub ampacity_a: Option<f64>,
    pub overloaded: bool,
}

/// Aggregate flow of one circuit, seen from the busbar.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CircuitSummary {
    pub number: usize,
    pub cable_id: String,
    pub apparent_power_kva: f64,
    pub active_power_kw: f64,
    pub reactive_power_kvar: f64,
    pub direction: Direction,
    pub current_a: f64,
    /// Voltage drop along the head cable.
    pub voltage_drop_v: f64,
    pub min_voltage_v: f64,
    pub max_voltage_v: f64,
    pub node_count: usize,
}

/// State of the low-voltage terminal of the transformer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VirtualBusbar {
    pub voltage_v: f64,
    /// Loads minus productions, after diversity.
    pub net_apparent_power_kva: f64,
    pub transformer_current_a: f64,
    /// Transformer current in percent of its nominal current.  Zero for an
    /// ideal transformer.
    pub transformer_loading_percent: f64,
    pub transformer_voltage_drop_v: f64,
    pub transformer_voltage_drop_percent: f64,
    pub transformer_losses_kw: f64,
    pub circuits: Vec<CircuitSummary>,
}

/// Calibrated parameters of a forced-mode calculation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalibrationOutcome {
    pub status: ConvergenceStatus,
    pub iterations: usize,
    pub measurement_node_id: String,
    pub load_diversity_percent: f64,
    pub distribution: PhaseDistribution,
    /// Measured voltages, with the missing phases estimated.
    pub measured_voltages_v: [f64; 3],
    pub computed_voltages_v: [f64; 3],
    /// Computed minus measured, per phase.
    pub residuals_v: [f64; 3],
    pub estimated_phases: Vec<Phase>,
}

/// Output of one solver pass for one scenario.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalculationResult {
    pub scenario: Scenario,
    pub load_model: LoadModel,
    /// Connected nodes, parents before children.
    pub nodes: Vec<NodeResult>,
    /// Tree cables, by circuit and distance from the source.
    pub cables: Vec<CableResult>,
    pub total_load_kva: f64,
    pub total_production_kva: f64,
    pub cable_losses_kw: f64,
    pub transformer_losses_kw: f64,
    pub total_losses_kw: f64,
    pub source_active_power_kw: f64,
    pub source_reactive_power_kvar: f64,
    /// Largest voltage drop in magnitude, under- or over-voltage.
    pub max_voltage_drop_percent: f64,
    pub max_voltage_drop_circuit: Option<usize>,
    pub max_undervoltage_percent: f64,
    pub max_overvoltage_percent: f64,
    pub compliance: Compliance,
    pub virtual_busbar: VirtualBusbar,
    pub disconnected_node_ids: Vec<String>,
    pub sweep_iterations: usize,
    pub sweep_converged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationOutcome>,
    pub diagnostics: Diagnostics,
}

impl CalculationResult {
    pub fn node(&self, node_id: &str) -> Option<&NodeResult> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn cable(&self, cable_id: &str) -> Option<&CableResult> {
        self.cables.iter().find(|c| c.cable_id == cable_id)
    }
}
