// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module is only compiled when running unit tests and contains the
//! `NetworkBuilder`, which assembles small projects for the calculator and
//! simulation tests.

use crate::model::{
    Cable, CableType, ForcedModeConfig, LoadModel, Node, PhaseDistribution, Project,
    VoltageSystem,
};

/// The cable type every test cable uses.
pub(crate) const CABLE_TYPE: &str = "T1";

/// Builds a project around a source node `S`.
///
/// Nodes are added with their load and production, cables with their
/// length.  All cables use the `T1` cable type: `Z1 = 0.32 + j0.08 Ω/km`,
/// `Zn = 0.32 + j0.08 Ω/km`.
pub(crate) struct NetworkBuilder {
    project: Project,
}

impl NetworkBuilder {
    fn new(voltage_system: VoltageSystem) -> Self {
        let mut project = Project::new("test", voltage_system);
        project
            .cable_types
            .push(CableType::new(CABLE_TYPE, 0.32, 0.08, 1.28, 0.32));
        project.nodes.push(Node::source("S"));
        Self { project }
    }

    pub(crate) fn four_wire() -> Self {
        Self::new(VoltageSystem::FourWire400)
    }

    pub(crate) fn three_wire() -> Self {
        Self::new(VoltageSystem::ThreePhase230)
    }

    /// Adds a node with the given load and production, in kVA.
    pub(crate) fn node(mut self, id: &str, load_kva: f64, production_kva: f64) -> Self {
        let mut node = Node::new(id);
        if load_kva != 0.0 {
            node = node.with_load(load_kva);
        }
        if production_kva != 0.0 {
            node = node.with_production(production_kva);
        }
        self.project.nodes.push(node);
        self
    }

    pub(crate) fn cable(mut self, id: &str, node_a: &str, node_b: &str, length_m: f64) -> Self {
        self.project
            .cables
            .push(Cable::new(id, node_a, node_b, CABLE_TYPE, vec![]).with_length(length_m));
        self
    }

    /// Switches to the unbalanced load model.
    pub(crate) fn unbalanced(mut self, unbalance_percent: f64) -> Self {
        self.project.load_model = LoadModel::Unbalanced;
        self.project.unbalance_percent = unbalance_percent;
        self
    }

    pub(crate) fn node_distribution(mut self, id: &str, distribution: PhaseDistribution) -> Self {
        if let Some(node) = self.project.nodes.iter_mut().find(|n| n.id == id) {
            node.phase_distribution = Some(distribution);
        }
        self
    }

    /// Imposes the voltage of the source node, in reference volts.
    pub(crate) fn source_voltage(mut self, voltage_v: f64) -> Self {
        if let Some(source) = self.project.nodes.iter_mut().find(|n| n.is_source) {
            source.target_voltage_v = Some(voltage_v);
        }
        self
    }

    pub(crate) fn forced(mut self, config: ForcedModeConfig) -> Self {
        self.project.forced_mode = Some(config);
        self
    }

    pub(crate) fn build(self) -> Project {
        self.project
    }
}
