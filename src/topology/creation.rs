// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for creating [`NetworkTopology`] instances from given nodes and
//! cables.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::DiGraph;

use crate::{Error, TopologyConfig, TopologyEdge, TopologyNode};

use super::{Circuit, EdgeMap, NetworkTopology, NodeIndexMap};

/// `NetworkTopology` instantiation.
impl<N, E> NetworkTopology<N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    /// Creates a new [`NetworkTopology`] from the given nodes and cables.
    ///
    /// Returns an error if the network has no single source, if a cable is
    /// invalid, or if the cables reached from the source don't form a tree.
    pub fn try_new<NodeIterator: IntoIterator<Item = N>, EdgeIterator: IntoIterator<Item = E>>(
        nodes: NodeIterator,
        cables: EdgeIterator,
        config: TopologyConfig,
    ) -> Result<Self, Error> {
        let (graph, indices) = Self::create_graph(nodes)?;
        let source_id = Self::find_source(&graph)?.node_id().to_string();

        let mut topology = Self {
            graph,
            node_indices: indices,
            source_id,
            edges: EdgeMap::new(),
            detached_cables: vec![],
            order: vec![],
            circuits: vec![],
            circuit_of: HashMap::new(),
            config,
        };
        let cables = topology.check_cables(cables)?;
        topology.orient_cables(cables)?;
        topology.number_circuits();

        topology.validate()?;

        Ok(topology)
    }

    fn find_source(graph: &DiGraph<N, ()>) -> Result<&N, Error> {
        let sources = graph
            .raw_nodes()
            .iter()
            .map(|n| &n.weight)
            .filter(|n| n.is_source())
            .collect::<Vec<_>>();

        match sources.len() {
            0 => Err(Error::invalid_topology("No source node found.")),
            1 => Ok(sources[0]),
            _ => Err(Error::invalid_topology(format!(
                "Multiple source nodes found: {:?}",
                sources.iter().map(|n| n.node_id()).collect::<Vec<_>>()
            ))),
        }
    }

    fn create_graph(
        nodes: impl IntoIterator<Item = N>,
    ) -> Result<(DiGraph<N, ()>, NodeIndexMap), Error> {
        let mut graph = DiGraph::new();
        let mut indices = NodeIndexMap::new();

        for node in nodes {
            let nid = node.node_id().to_string();

            if nid.is_empty() {
                return Err(Error::invalid_topology("Node with an empty ID found."));
            }
            if indices.contains_key(&nid) {
                return Err(Error::invalid_topology(format!(
                    "Duplicate node ID found: {nid}"
                )));
            }

            let idx = graph.add_node(node);
            indices.insert(nid, idx);
        }

        Ok((graph, indices))
    }

    /// Checks the cables individually and returns them in cable-id order.
    fn check_cables(&self, cables: impl IntoIterator<Item = E>) -> Result<Vec<E>, Error> {
        let mut seen = HashSet::new();
        let mut checked = vec![];

        for cable in cables {
            let cid = cable.cable_id();
            let (aid, bid) = (cable.node_a(), cable.node_b());

            if aid == bid {
                return Err(Error::invalid_topology(format!(
                    "Cable:{cid} ({aid}, {bid}) Can't connect a node to itself."
                )));
            }
            for nid in [aid, bid] {
                if !self.node_indices.contains_key(nid) {
                    return Err(Error::invalid_topology(format!(
                        "Cable:{cid} ({aid}, {bid}) Can't find a node with ID {nid}"
                    )));
                }
            }
            if !seen.insert(cid.to_string()) {
                return Err(Error::invalid_topology(format!(
                    "Duplicate cable ID found: {cid}"
                )));
            }

            checked.push(cable);
        }

        checked.sort_by(|a, b| a.cable_id().cmp(b.cable_id()));
        Ok(checked)
    }

    /// Walks the cables breadth-first from the source and orients every
    /// cable it reaches from parent to child.
    ///
    /// A cable reaching a node that has already been reached closes a loop.
    /// Cables that are never reached are kept as detached.
    fn orient_cables(&mut self, cables: Vec<E>) -> Result<(), Error> {
        let mut adjacency: HashMap<_, Vec<usize>> = HashMap::new();
        for (pos, cable) in cables.iter().enumerate() {
            for nid in [cable.node_a(), cable.node_b()] {
                adjacency
                    .entry(self.node_indices[nid])
                    .or_default()
                    .push(pos);
            }
        }

        let mut slots = cables.into_iter().map(Some).collect::<Vec<_>>();
        let source = self.node_indices[&self.source_id];
        let mut reached = HashSet::from([source]);
        let mut queue = VecDeque::from([source]);

        while let Some(index) = queue.pop_front() {
            self.order.push(index);

            for &pos in adjacency.get(&index).map(Vec::as_slice).unwrap_or_default() {
                let Some(cable) = slots[pos].take() else {
                    continue;
                };
                let a = self.node_indices[cable.node_a()];
                let other = if a == index {
                    self.node_indices[cable.node_b()]
                } else {
                    a
                };

                if !reached.insert(other) {
                    return Err(Error::invalid_topology(format!(
                        "Cycle detected: cable {} closes a loop between {} and {}.",
                        cable.cable_id(),
                        self.graph[index].node_id(),
                        self.graph[other].node_id()
                    )));
                }

                self.graph.add_edge(index, other, ());
                self.edges.insert((index, other), cable);
                queue.push_back(other);
            }
        }

        self.detached_cables = slots.into_iter().flatten().collect();

        Ok(())
    }

    /// Numbers the circuits in the order the source cables were reached,
    /// which is cable-id order, and assigns every connected node to one.
    fn number_circuits(&mut self) {
        let source = self.node_indices[&self.source_id];

        for &index in self.order.iter().skip(1) {
            let Some(parent) = self
                .graph
                .neighbors_directed(index, petgraph::Direction::Incoming)
                .next()
            else {
                continue;
            };

            let number = if parent == source {
                let number = self.circuits.len() + 1;
                let cable_id = self
                    .edges
                    .get(&(parent, index))
                    .map(|c| c.cable_id().to_string())
                    .unwrap_or_default();
                self.circuits.push(Circuit {
                    number,
                    cable_id,
                    head_node_id: self.graph[index].node_id().to_string(),
                });
                number
            } else {
                match self.circuit_of.get(&parent) {
                    Some(number) => *number,
                    None => continue,
                }
            };
            self.circuit_of.insert(index, number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::test_utils::{nodes_and_cables, TestCable, TestNode};

    #[test]
    fn test_node_validation() {
        let config = TopologyConfig::default();
        let (mut nodes, cables) = nodes_and_cables();

        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone()).is_ok()
        );

        nodes.push(TestNode::new("2"));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e == Error::invalid_topology("Duplicate node ID found: 2"))
        );

        nodes.pop();
        nodes.push(TestNode::new(""));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e == Error::invalid_topology("Node with an empty ID found."))
        );

        nodes.pop();
        nodes.push(TestNode::source("T"));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e
                    == Error::invalid_topology("Multiple source nodes found: [\"S\", \"T\"]"))
        );

        nodes.pop();
        nodes.retain(|n| !n.is_source());
        assert!(
            NetworkTopology::try_new(nodes.clone(), Vec::<TestCable>::new(), config.clone())
                .is_err_and(|e| e == Error::invalid_topology("No source node found."))
        );
    }

    #[test]
    fn test_cable_validation() {
        let config = TopologyConfig::default();
        let (nodes, mut cables) = nodes_and_cables();

        cables.push(TestCable::new("c9", "2", "2"));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e
                    == Error::invalid_topology("Cable:c9 (2, 2) Can't connect a node to itself."))
        );

        cables.pop();
        cables.push(TestCable::new("c9", "2", "9"));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e
                    == Error::invalid_topology("Cable:c9 (2, 9) Can't find a node with ID 9"))
        );

        cables.pop();
        cables.push(TestCable::new("c1", "5", "6"));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e == Error::invalid_topology("Duplicate cable ID found: c1"))
        );

        cables.pop();
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone()).is_ok()
        );
    }

    #[test]
    fn test_cycle_detection() {
        let config = TopologyConfig::default();
        let (nodes, mut cables) = nodes_and_cables();

        // A second cable between the same two nodes.
        cables.push(TestCable::new("c7", "S", "3"));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e
                    == Error::invalid_topology(
                        "Cycle detected: cable c7 closes a loop between S and 3."
                    ))
        );

        // A loop across the two circuits.
        cables.pop();
        cables.push(TestCable::new("c7", "5", "6"));
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), config.clone())
                .is_err_and(|e| e
                    == Error::invalid_topology(
                        "Cycle detected: cable c7 closes a loop between 6 and 5."
                    ))
        );
    }
}
