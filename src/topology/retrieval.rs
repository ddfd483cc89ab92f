// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for retrieving nodes, cables and circuits from a
//! [`NetworkTopology`].

use std::collections::BTreeSet;

use petgraph::graph::NodeIndex;

use super::iterators::{Cables, Neighbors, Nodes, NodesFromSource};
use super::Circuit;
use crate::{Error, NetworkTopology, TopologyEdge, TopologyNode};

/// Node, cable and circuit retrieval.
impl<N, E> NetworkTopology<N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    pub(crate) fn index_of(&self, node_id: &str) -> Result<NodeIndex, Error> {
        self.node_indices
            .get(node_id)
            .copied()
            .ok_or_else(|| Error::node_not_found(format!("Node with id {} not found.", node_id)))
    }

    /// Returns the node with the given `node_id`, if it exists.
    pub fn node(&self, node_id: &str) -> Result<&N, Error> {
        self.index_of(node_id).map(|i| &self.graph[i])
    }

    /// Returns the source node.
    pub fn source(&self) -> &N {
        &self.graph[self.node_indices[&self.source_id]]
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Returns an iterator over all the nodes, connected or not.
    pub fn nodes(&self) -> Nodes<N> {
        Nodes {
            iter: self.graph.raw_nodes().iter(),
        }
    }

    /// Returns an iterator over the connected nodes, starting with the
    /// source and never yielding a node before its parent.
    pub fn nodes_from_source(&self) -> NodesFromSource<N> {
        NodesFromSource {
            graph: &self.graph,
            iter: self.order.iter(),
        }
    }

    /// Returns an iterator over the cables of the tree.
    pub fn cables(&self) -> Cables<N, E> {
        Cables {
            topology: self,
            iter: self.graph.raw_edges().iter(),
        }
    }

    /// Returns an iterator over the *predecessors* of the node with the
    /// given `node_id`.  A connected node has exactly one, except for the
    /// source.
    ///
    /// Returns an error if the given `node_id` does not exist.
    pub fn predecessors(&self, node_id: &str) -> Result<Neighbors<N>, Error> {
        self.index_of(node_id).map(|index| Neighbors {
            graph: &self.graph,
            iter: self
                .graph
                .neighbors_directed(index, petgraph::Direction::Incoming),
        })
    }

    /// Returns an iterator over the *successors* of the node with the given
    /// `node_id`, i.e. the nodes it feeds.
    ///
    /// Returns an error if the given `node_id` does not exist.
    pub fn successors(&self, node_id: &str) -> Result<Neighbors<N>, Error> {
        self.index_of(node_id).map(|index| Neighbors {
            graph: &self.graph,
            iter: self
                .graph
                .neighbors_directed(index, petgraph::Direction::Outgoing),
        })
    }

    /// Returns the node feeding the given node, or `None` for the source and
    /// for disconnected nodes.
    pub fn parent(&self, node_id: &str) -> Result<Option<&N>, Error> {
        self.predecessors(node_id).map(|mut p| p.next())
    }

    /// Returns the cable feeding the given node from its parent.
    pub fn feeder_cable(&self, node_id: &str) -> Result<Option<&E>, Error> {
        let index = self.index_of(node_id)?;
        Ok(self
            .graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .next()
            .and_then(|parent| self.edges.get(&(parent, index))))
    }

    /// Returns the cable between a parent and one of its children.
    pub fn cable_between(&self, parent_id: &str, child_id: &str) -> Result<Option<&E>, Error> {
        let (parent, child) = (self.index_of(parent_id)?, self.index_of(child_id)?);
        Ok(self.edges.get(&(parent, child)))
    }

    pub fn is_connected(&self, node_id: &str) -> bool {
        self.index_of(node_id)
            .is_ok_and(|index| self.is_reached(index))
    }

    fn is_reached(&self, index: NodeIndex) -> bool {
        self.graph[index].node_id() == self.source_id
            || self
                .graph
                .neighbors_directed(index, petgraph::Direction::Incoming)
                .next()
                .is_some()
    }

    /// Returns the ids of the nodes reachable from the source, the source
    /// included.
    pub fn connected_node_ids(&self) -> BTreeSet<&str> {
        self.nodes_from_source().map(|n| n.node_id()).collect()
    }

    /// Returns the ids of the cables of the tree.
    pub fn connected_cable_ids(&self) -> BTreeSet<&str> {
        self.cables().map(|c| c.cable_id()).collect()
    }

    /// Returns an iterator over the nodes the source can't reach.
    pub fn disconnected_nodes(&self) -> impl Iterator<Item = &N> + '_ {
        self.graph
            .node_indices()
            .filter(|&i| !self.is_reached(i))
            .map(|i| &self.graph[i])
    }

    /// Returns the cables that are not part of the tree, because neither of
    /// their ends is reachable from the source.
    pub fn detached_cables(&self) -> &[E] {
        &self.detached_cables
    }

    /// Returns the cables of the tree in presentation order: by circuit,
    /// then by distance from the source.
    pub fn ordered_cables(&self) -> Vec<&E> {
        let mut cables = self
            .order
            .iter()
            .filter_map(|&index| {
                let parent = self
                    .graph
                    .neighbors_directed(index, petgraph::Direction::Incoming)
                    .next()?;
                let number = self.circuit_of.get(&index).copied().unwrap_or(0);
                self.edges.get(&(parent, index)).map(|cable| (number, cable))
            })
            .collect::<Vec<_>>();
        cables.sort_by_key(|(number, _)| *number);
        cables.into_iter().map(|(_, cable)| cable).collect()
    }

    /// Returns the circuits, ordered by number.
    pub fn circuits(&self) -> &[Circuit] {
        &self.circuits
    }

    /// Returns the circuit the given node belongs to.  The source and
    /// disconnected nodes belong to none.
    pub fn circuit_of(&self, node_id: &str) -> Option<&Circuit> {
        let index = self.index_of(node_id).ok()?;
        let number = *self.circuit_of.get(&index)?;
        self.circuits.get(number - 1)
    }
}

#[cfg(test)]
mod tests {
    use crate::topology::test_utils::{nodes_and_cables, TestCable, TestNode};
    use crate::{Error, NetworkTopology, TopologyConfig, TopologyEdge, TopologyNode};

    fn sorted_ids<'a>(nodes: impl Iterator<Item = &'a TestNode>) -> Vec<&'a str> {
        let mut ids = nodes.map(|n| n.node_id()).collect::<Vec<_>>();
        ids.sort();
        ids
    }

    #[test]
    fn test_node() -> Result<(), Error> {
        let (nodes, cables) = nodes_and_cables();
        let topology = NetworkTopology::try_new(nodes, cables, TopologyConfig::default())?;

        assert_eq!(topology.node("5"), Ok(&TestNode::new("5")));
        assert_eq!(topology.source(), &TestNode::source("S"));
        assert_eq!(topology.source_id(), "S");
        assert_eq!(
            topology.node("9"),
            Err(Error::node_not_found("Node with id 9 not found."))
        );

        Ok(())
    }

    #[test]
    fn test_nodes_and_cables() -> Result<(), Error> {
        let (nodes, cables) = nodes_and_cables();
        let topology =
            NetworkTopology::try_new(nodes.clone(), cables.clone(), TopologyConfig::default())?;

        assert!(topology.nodes().eq(&nodes));
        assert!(topology
            .nodes_from_source()
            .map(|n| n.node_id())
            .eq(["S", "1", "3", "2", "6", "4", "5"]));
        assert!(topology
            .cables()
            .map(|c| c.cable_id())
            .eq(["c1", "c2", "c3", "c4", "c5", "c6"]));
        assert_eq!(
            topology.connected_cable_ids().into_iter().collect::<Vec<_>>(),
            vec!["c1", "c2", "c3", "c4", "c5", "c6"]
        );
        assert!(topology.detached_cables().is_empty());
        assert_eq!(topology.disconnected_nodes().count(), 0);

        Ok(())
    }

    #[test]
    fn test_neighbors() -> Result<(), Error> {
        let (nodes, cables) = nodes_and_cables();
        let topology = NetworkTopology::try_new(nodes, cables, TopologyConfig::default())?;

        assert_eq!(sorted_ids(topology.successors("S")?), vec!["1", "3"]);
        assert_eq!(sorted_ids(topology.successors("2")?), vec!["4", "5"]);
        assert_eq!(topology.successors("4")?.count(), 0);
        assert_eq!(topology.predecessors("S")?.count(), 0);
        assert_eq!(topology.parent("2")?, Some(&TestNode::new("1")));
        assert_eq!(topology.parent("S")?, None);
        assert!(topology
            .successors("9")
            .is_err_and(|e| e == Error::node_not_found("Node with id 9 not found.")));

        // "1" was given as the first end of the cable, it is still its child.
        assert_eq!(
            topology.feeder_cable("1")?,
            Some(&TestCable::new("c1", "1", "S"))
        );
        assert_eq!(topology.feeder_cable("S")?, None);
        assert_eq!(
            topology.cable_between("2", "5")?,
            Some(&TestCable::new("c6", "2", "5"))
        );
        assert_eq!(topology.cable_between("5", "2")?, None);

        Ok(())
    }

    #[test]
    fn test_circuits() -> Result<(), Error> {
        let (nodes, cables) = nodes_and_cables();
        let topology = NetworkTopology::try_new(nodes, cables, TopologyConfig::default())?;

        let circuits = topology.circuits();
        assert_eq!(circuits.len(), 2);
        assert_eq!(
            (circuits[0].number, circuits[0].cable_id.as_str(), circuits[0].head_node_id.as_str()),
            (1, "c1", "1")
        );
        assert_eq!(
            (circuits[1].number, circuits[1].cable_id.as_str(), circuits[1].head_node_id.as_str()),
            (2, "c2", "3")
        );

        for (id, number) in [("1", 1), ("2", 1), ("4", 1), ("5", 1), ("3", 2), ("6", 2)] {
            assert_eq!(topology.circuit_of(id).map(|c| c.number), Some(number));
        }
        assert_eq!(topology.circuit_of("S"), None);
        assert!(topology
            .ordered_cables()
            .into_iter()
            .map(|c| c.cable_id())
            .eq(["c1", "c3", "c5", "c6", "c2", "c4"]));

        Ok(())
    }
}
