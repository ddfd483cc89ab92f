// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! A project resolved once into the arrays the solver walks.

use std::collections::HashMap;

use crate::config::CalculatorConfig;
use crate::diagnostics::{Category, Diagnostics};
use crate::model::{Cable, PhaseDistribution, Project, TransformerImpedance, VoltageSystem};
use crate::phasor::{Phasor, PhasorOps};
use crate::topology::Circuit;
use crate::{Error, TopologyEdge, TopologyNode};

/// The cable feeding a node, with its total impedances.
#[derive(Clone, Debug)]
pub(crate) struct Feeder {
    pub(crate) cable_id: String,
    pub(crate) name: String,
    pub(crate) length_m: f64,
    /// Phase impedance over the whole length.
    pub(crate) z1: Phasor,
    /// Neutral impedance over the whole length, `None` without a neutral.
    pub(crate) zn: Option<Phasor>,
    pub(crate) ampacity_a: Option<f64>,
}

#[derive(Clone, Debug)]
pub(crate) struct NetworkNode {
    pub(crate) id: String,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) circuit: Option<usize>,
    pub(crate) feeder: Option<Feeder>,
    pub(crate) load_kva: f64,
    pub(crate) production_kva: f64,
    pub(crate) distribution: Option<PhaseDistribution>,
    /// Summed phase impedance of the cables from the source.
    pub(crate) path_z1: Phasor,
    /// Summed neutral impedance of the cables from the source.
    pub(crate) path_zn: Phasor,
}

/// A project resolved for the solver: the connected tree in breadth-first
/// order with the impedance of every cable.
///
/// Preparing a network validates the topology and looks up the cable types,
/// so it fails on structural errors.  One prepared network is shared by all
/// the solver passes of a top-level calculation.
#[derive(Clone, Debug)]
pub struct PreparedNetwork {
    pub(crate) voltage_system: VoltageSystem,
    pub(crate) power_factor: f64,
    /// Magnitude of the transformer EMF, in phase volts.
    pub(crate) emf_v: f64,
    pub(crate) transformer: Option<TransformerImpedance>,
    /// Connected nodes, the source first and parents before children.
    pub(crate) nodes: Vec<NetworkNode>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) circuits: Vec<Circuit>,
    /// Positions of the nodes whose feeder cables are reported, in
    /// presentation order.
    pub(crate) cable_order: Vec<usize>,
    pub(crate) disconnected: Vec<String>,
    pub(crate) diagnostics: Diagnostics,
}

impl PreparedNetwork {
    /// Resolves the topology of `project` and the impedances of its cables.
    pub fn new(project: &Project, config: &CalculatorConfig) -> Result<Self, Error> {
        let topology = project.topology(config.topology.clone())?;
        let system = project.voltage_system;
        let mut diagnostics = Diagnostics::new();
        let mut nodes: Vec<NetworkNode> = vec![];
        let mut index: HashMap<String, usize> = HashMap::new();

        for node in topology.nodes_from_source() {
            let id = node.node_id();
            let parent = topology
                .parent(id)?
                .and_then(|p| index.get(p.node_id()).copied());
            let feeder = match topology.feeder_cable(id)? {
                Some(cable) => Some(Self::feeder(project, cable, system, &mut diagnostics)?),
                None => None,
            };

            let (mut path_z1, mut path_zn) = parent
                .map(|p: usize| (nodes[p].path_z1, nodes[p].path_zn))
                .unwrap_or_default();
            if let Some(f) = &feeder {
                path_z1 += f.z1;
                path_zn += f.zn.unwrap_or_default();
            }

            let position = nodes.len();
            if let Some(p) = parent {
                nodes[p].children.push(position);
            }
            index.insert(id.to_string(), position);
            nodes.push(NetworkNode {
                id: id.to_string(),
                parent,
                children: vec![],
                circuit: topology.circuit_of(id).map(|c| c.number),
                feeder,
                load_kva: node.total_load_kva(),
                production_kva: node.total_production_kva(),
                distribution: node.phase_distribution.clone(),
                path_z1,
                path_zn,
            });
        }

        let cable_order = topology
            .ordered_cables()
            .into_iter()
            .filter_map(|cable| {
                [cable.node_a(), cable.node_b()]
                    .into_iter()
                    .filter_map(|nid| index.get(nid).copied())
                    .find(|&i| {
                        nodes[i]
                            .feeder
                            .as_ref()
                            .is_some_and(|f| f.cable_id == cable.cable_id())
                    })
            })
            .collect();

        let mut disconnected = topology
            .disconnected_nodes()
            .map(|n| n.node_id().to_string())
            .collect::<Vec<_>>();
        disconnected.sort();
        for id in &disconnected {
            diagnostics.warn(
                Category::Topology,
                Some(id.as_str()),
                "Node is not connected to the source and is left out of the calculation.",
            );
        }
        for cable in topology.detached_cables() {
            diagnostics.warn(
                Category::Topology,
                Some(cable.cable_id()),
                "Cable is not connected to the source and is left out of the calculation.",
            );
        }

        let transformer = project.transformer.impedance(config.default_xr_ratio);
        if transformer.is_none() {
            tracing::warn!("Transformer rating is not usable, treating the transformer as ideal.");
            diagnostics.warn(
                Category::Equipment,
                None,
                "Transformer rating is not usable, the transformer is treated as ideal.",
            );
        }

        let source = topology.source();
        let emf_v = match source.target_voltage_v {
            Some(v) if v.is_finite() && v > 0.0 => system.from_reference(v),
            Some(v) => {
                diagnostics.warn(
                    Category::Validation,
                    Some(source.node_id()),
                    format!("Target voltage {v} V is not usable, the nominal voltage is used."),
                );
                system.phase_voltage()
            }
            None => system.phase_voltage(),
        };

        let pf = project.power_factor;
        let power_factor = if pf.is_finite() && pf > 0.0 && pf <= 1.0 {
            pf
        } else {
            tracing::warn!("Power factor {pf} is out of range, using 1.0.");
            diagnostics.warn(
                Category::Validation,
                None,
                format!("Power factor {pf} is out of range, 1.0 is used."),
            );
            1.0
        };

        Ok(Self {
            voltage_system: system,
            power_factor,
            emf_v,
            transformer,
            nodes,
            index,
            circuits: topology.circuits().to_vec(),
            cable_order,
            disconnected,
            diagnostics,
        })
    }

    fn feeder(
        project: &Project,
        cable: &Cable,
        system: VoltageSystem,
        diagnostics: &mut Diagnostics,
    ) -> Result<Feeder, Error> {
        let cable_type = project.cable_type(&cable.cable_type_id)?;

        if !cable_type.permits(cable.installation_method) {
            tracing::warn!(
                "Cable {} is laid {:?}, which cable type {} does not permit.",
                cable.id,
                cable.installation_method,
                cable_type.id
            );
            diagnostics.warn(
                Category::Validation,
                Some(cable.id.as_str()),
                format!(
                    "Installation method {:?} is not permitted for cable type {}.",
                    cable.installation_method, cable_type.id
                ),
            );
        }

        let length_m = if cable.length_m.is_finite() && cable.length_m >= 0.0 {
            cable.length_m
        } else {
            diagnostics.warn(
                Category::Numeric,
                Some(cable.id.as_str()),
                format!("Cable length {} m is not usable, 0 m is used.", cable.length_m),
            );
            0.0
        };
        let length_km = length_m / 1000.0;

        let mut z1 = cable_type.phase_impedance_per_km();
        if !(z1.is_finite_phasor() && z1.re >= 0.0 && z1.im >= 0.0) {
            diagnostics.warn(
                Category::Numeric,
                Some(cable.id.as_str()),
                format!(
                    "Phase impedance of cable type {} is not usable, the cable is treated as ideal.",
                    cable_type.id
                ),
            );
            z1 = Phasor::new(0.0, 0.0);
        }

        let zn = system.has_neutral().then(|| {
            cable_type
                .neutral_impedance_per_km()
                .unwrap_or_else(|| {
                    tracing::warn!(
                        "Zero-sequence data of cable type {} gives no neutral impedance, \
                         using the phase impedance.",
                        cable_type.id
                    );
                    diagnostics.warn(
                        Category::Numeric,
                        Some(cable.id.as_str()),
                        format!(
                            "Zero-sequence data of cable type {} gives no neutral impedance, \
                             the phase impedance is used.",
                            cable_type.id
                        ),
                    );
                    z1
                })
                .scale_by(length_km)
        });

        Ok(Feeder {
            cable_id: cable.id.clone(),
            name: cable.name.clone(),
            length_m,
            z1: z1.scale_by(length_km),
            zn,
            ampacity_a: cable_type.ampacity_a.filter(|a| a.is_finite() && *a > 0.0),
        })
    }

    pub fn voltage_system(&self) -> VoltageSystem {
        self.voltage_system
    }

    /// Returns `true` if the node exists and is connected to the source.
    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub(crate) fn position(&self, node_id: &str) -> Result<usize, Error> {
        self.index.get(node_id).copied().ok_or_else(|| {
            Error::node_not_found(format!("Node with id {} not found.", node_id))
        })
    }

    /// Summed phase and neutral impedances from the source to the node.
    pub fn path_impedance(&self, node_id: &str) -> Result<(Phasor, Phasor), Error> {
        let node = &self.nodes[self.position(node_id)?];
        Ok((node.path_z1, node.path_zn))
    }

    /// Positions of the nodes strictly downstream of the given position, in
    /// breadth-first order.
    pub(crate) fn downstream_of(&self, position: usize) -> Vec<usize> {
        let mut found = vec![];
        let mut next = 0;
        found.extend(self.nodes[position].children.iter().copied());
        while next < found.len() {
            let children = &self.nodes[found[next]].children;
            found.extend(children.iter().copied());
            next += 1;
        }
        found
    }

    pub fn disconnected_node_ids(&self) -> &[String] {
        &self.disconnected
    }

    /// Issues met while preparing the network.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
