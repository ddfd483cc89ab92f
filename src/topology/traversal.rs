// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module contains methods that help with walking the tree.

use crate::{Error, NetworkTopology, TopologyEdge, TopologyNode};

/// Traversal methods.
impl<N, E> NetworkTopology<N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    fn find(
        &self,
        from: &str,
        mut pred: impl FnMut(&N) -> bool,
        direction: petgraph::Direction,
    ) -> Result<Option<&N>, Error> {
        let mut stack = vec![self.index_of(from)?];

        while let Some(index) = stack.pop() {
            let node = &self.graph[index];
            if pred(node) {
                return Ok(Some(node));
            }

            let neighbors = self.graph.neighbors_directed(index, direction);
            stack.extend(neighbors);
        }

        Ok(None)
    }

    /// Find the node that satisfies the given predicate starting from the
    /// given node and walking away from the source.
    pub fn find_downstream(
        &self,
        from: &str,
        pred: impl FnMut(&N) -> bool,
    ) -> Result<Option<&N>, Error> {
        self.find(from, pred, petgraph::Direction::Outgoing)
    }

    /// Find the node that satisfies the given predicate starting from the
    /// given node and walking towards the source.
    pub fn find_upstream(
        &self,
        from: &str,
        pred: impl FnMut(&N) -> bool,
    ) -> Result<Option<&N>, Error> {
        self.find(from, pred, petgraph::Direction::Incoming)
    }

    /// Returns all the nodes fed through the given node, the node itself
    /// excluded.
    pub fn downstream_nodes(&self, from: &str) -> Result<Vec<&N>, Error> {
        let index = self.index_of(from)?;
        let mut stack = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Outgoing)
            .collect::<Vec<_>>();
        let mut found = vec![];

        while let Some(index) = stack.pop() {
            found.push(&self.graph[index]);
            stack.extend(
                self.graph
                    .neighbors_directed(index, petgraph::Direction::Outgoing),
            );
        }

        Ok(found)
    }

    /// Returns the cables between the source and the given node, in order
    /// from the source.
    ///
    /// Returns an error if the node is not connected to the source.
    pub fn path_to_source(&self, node_id: &str) -> Result<Vec<&E>, Error> {
        let mut index = self.index_of(node_id)?;
        if !self.is_connected(node_id) {
            return Err(Error::invalid_input(format!(
                "Node {} is not connected to the source.",
                node_id
            )));
        }

        let mut path = vec![];
        while let Some(parent) = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .next()
        {
            let Some(cable) = self.edges.get(&(parent, index)) else {
                return Err(Error::internal(format!(
                    "No cable recorded between {} and {}.",
                    self.graph[parent].node_id(),
                    self.graph[index].node_id()
                )));
            };
            path.push(cable);
            index = parent;
        }
        path.reverse();

        Ok(path)
    }

    /// Returns the number of cables between the source and the given node.
    pub fn depth(&self, node_id: &str) -> Result<usize, Error> {
        self.path_to_source(node_id).map(|p| p.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::topology::test_utils::{nodes_and_cables, TestCable, TestNode};
    use crate::{Error, NetworkTopology, TopologyConfig, TopologyEdge, TopologyNode};

    #[test]
    fn test_find() -> Result<(), Error> {
        let (nodes, cables) = nodes_and_cables();
        let topology = NetworkTopology::try_new(nodes, cables, TopologyConfig::default())?;

        assert_eq!(
            topology.find_upstream("5", |n| n.is_source())?,
            Some(&TestNode::source("S"))
        );
        assert_eq!(
            topology.find_downstream("1", |n| n.node_id() == "4")?,
            Some(&TestNode::new("4"))
        );
        assert_eq!(topology.find_downstream("3", |n| n.node_id() == "4")?, None);
        assert!(topology
            .find_upstream("9", |_| true)
            .is_err_and(|e| e == Error::node_not_found("Node with id 9 not found.")));

        Ok(())
    }

    #[test]
    fn test_downstream_nodes() -> Result<(), Error> {
        let (nodes, cables) = nodes_and_cables();
        let topology = NetworkTopology::try_new(nodes, cables, TopologyConfig::default())?;

        let mut ids = topology
            .downstream_nodes("1")?
            .into_iter()
            .map(|n| n.node_id())
            .collect::<Vec<_>>();
        ids.sort();
        assert_eq!(ids, vec!["2", "4", "5"]);
        assert!(topology.downstream_nodes("6")?.is_empty());
        assert_eq!(topology.downstream_nodes("S")?.len(), 6);

        Ok(())
    }

    #[test]
    fn test_path_to_source() -> Result<(), Error> {
        let (mut nodes, cables) = nodes_and_cables();
        nodes.push(TestNode::new("7"));
        let topology = NetworkTopology::try_new(nodes, cables, TopologyConfig::default())?;

        assert!(topology
            .path_to_source("5")?
            .into_iter()
            .map(|c| c.cable_id())
            .eq(["c1", "c3", "c6"]));
        assert_eq!(
            topology.path_to_source("3")?,
            vec![&TestCable::new("c2", "S", "3")]
        );
        assert!(topology.path_to_source("S")?.is_empty());
        assert_eq!(topology.depth("4")?, 3);
        assert!(topology.path_to_source("7").is_err_and(
            |e| e == Error::invalid_input("Node 7 is not connected to the source.")
        ));

        Ok(())
    }
}
