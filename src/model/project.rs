// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

use serde::{Deserialize, Serialize};

use super::{Cable, CableType, Node, PhaseDistribution, TransformerConfig};
use crate::{Error, NetworkTopology, TopologyConfig};

/// Voltage system of the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoltageSystem {
    /// Three wires, 230 V between phases, no neutral.
    ThreePhase230,
    /// Three phases and neutral, 400 V between phases, 230 V phase to
    /// neutral.
    FourWire400,
}

impl VoltageSystem {
    /// Nominal line-to-line voltage.
    pub fn line_voltage(&self) -> f64 {
        match self {
            VoltageSystem::ThreePhase230 => 230.0,
            VoltageSystem::FourWire400 => 400.0,
        }
    }

    /// Nominal voltage of the star-equivalent phase.
    pub fn phase_voltage(&self) -> f64 {
        match self {
            VoltageSystem::ThreePhase230 => 230.0 / 3.0_f64.sqrt(),
            VoltageSystem::FourWire400 => 230.0,
        }
    }

    /// The voltage drop percentages and regulator thresholds refer to:
    /// the line voltage in 3-wire systems, the phase-to-neutral voltage in
    /// 4-wire systems.  230 V in both cases.
    pub fn reference_voltage(&self) -> f64 {
        230.0
    }

    pub fn has_neutral(&self) -> bool {
        matches!(self, VoltageSystem::FourWire400)
    }

    /// Converts a star-equivalent phase voltage into reference volts.
    pub fn to_reference(&self, phase_v: f64) -> f64 {
        match self {
            VoltageSystem::ThreePhase230 => phase_v * 3.0_f64.sqrt(),
            VoltageSystem::FourWire400 => phase_v,
        }
    }

    /// Converts a value in reference volts into a star-equivalent phase
    /// voltage.
    pub fn from_reference(&self, reference_v: f64) -> f64 {
        match self {
            VoltageSystem::ThreePhase230 => reference_v / 3.0_f64.sqrt(),
            VoltageSystem::FourWire400 => reference_v,
        }
    }
}

/// How loads and productions are spread over the phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadModel {
    /// Polyphase consumers, equal on the three phases.
    Balanced,
    /// Single-phase consumers spread over the three phases.
    Unbalanced,
}

/// The situation being calculated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    /// Loads only.
    Withdrawal,
    /// Loads and productions.
    Mixed,
    /// Productions only.
    Production,
    /// Loads and productions with parameters calibrated on measurements.
    Forced,
}

impl Scenario {
    pub fn includes_loads(&self) -> bool {
        !matches!(self, Scenario::Production)
    }

    pub fn includes_productions(&self) -> bool {
        !matches!(self, Scenario::Withdrawal)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::Withdrawal => write!(f, "Withdrawal"),
            Scenario::Mixed => write!(f, "Mixed"),
            Scenario::Production => write!(f, "Production"),
            Scenario::Forced => write!(f, "Forced"),
        }
    }
}

/// Field measurements driving the forced scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForcedModeConfig {
    pub measurement_node_id: String,
    /// Measured U1, U2, U3 in reference volts.  Missing phases are
    /// estimated.
    pub measured_voltages_v: [Option<f64>; 3],
    /// Night-time baseline voltage used to calibrate the load diversity.
    /// Defaults to the mean of the measured voltages.
    #[serde(default)]
    pub target_voltage_v: Option<f64>,
}

/// The aggregate describing a network and its calculation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    pub voltage_system: VoltageSystem,
    pub power_factor: f64,
    pub load_diversity_percent: f64,
    pub production_diversity_percent: f64,
    pub load_model: LoadModel,
    #[serde(default)]
    pub unbalance_percent: f64,
    pub transformer: TransformerConfig,
    pub nodes: Vec<Node>,
    pub cables: Vec<Cable>,
    pub cable_types: Vec<CableType>,
    #[serde(default)]
    pub manual_phase_distribution: Option<PhaseDistribution>,
    #[serde(default)]
    pub forced_mode: Option<ForcedModeConfig>,
}

impl Project {
    /// Creates an empty project with common defaults: 4-wire 400 V, cos φ
    /// 0.95, full diversity, balanced loads.
    pub fn new(name: impl Into<String>, voltage_system: VoltageSystem) -> Self {
        Self {
            name: name.into(),
            voltage_system,
            power_factor: 0.95,
            load_diversity_percent: 100.0,
            production_diversity_percent: 100.0,
            load_model: LoadModel::Balanced,
            unbalance_percent: 0.0,
            transformer: TransformerConfig::default(),
            nodes: vec![],
            cables: vec![],
            cable_types: vec![],
            manual_phase_distribution: None,
            forced_mode: None,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn cable_type(&self, id: &str) -> Result<&CableType, Error> {
        self.cable_types
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::cable_type_not_found(format!("Cable type {id} not found.")))
    }

    /// Resolves the network topology of the project.
    ///
    /// This is the lookup collaborators use to find the connected and
    /// disconnected parts of the network without running a calculation.
    pub fn topology(
        &self,
        config: TopologyConfig,
    ) -> Result<NetworkTopology<&Node, &Cable>, Error> {
        NetworkTopology::try_new(self.nodes.iter(), self.cables.iter(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_voltage_system_references() {
        let s = VoltageSystem::ThreePhase230;
        assert_abs_diff_eq!(s.phase_voltage(), 132.790_56, epsilon = 1e-5);
        assert_abs_diff_eq!(s.to_reference(s.phase_voltage()), 230.0, epsilon = 1e-9);
        assert!(!s.has_neutral());

        let s = VoltageSystem::FourWire400;
        assert_eq!(s.phase_voltage(), 230.0);
        assert_eq!(s.line_voltage(), 400.0);
        assert_eq!(s.to_reference(228.0), 228.0);
        assert_eq!(s.from_reference(228.0), 228.0);
        assert!(s.has_neutral());
    }

    #[test]
    fn test_scenario_contents() {
        assert!(Scenario::Withdrawal.includes_loads());
        assert!(!Scenario::Withdrawal.includes_productions());
        assert!(!Scenario::Production.includes_loads());
        assert!(Scenario::Mixed.includes_loads() && Scenario::Mixed.includes_productions());
        assert!(Scenario::Forced.includes_loads() && Scenario::Forced.includes_productions());
    }

    #[test]
    fn test_missing_cable_type() {
        let project = Project::new("p", VoltageSystem::FourWire400);
        assert!(project
            .cable_type("nope")
            .is_err_and(|e| e == Error::cable_type_not_found("Cable type nope not found.")));
    }
}
