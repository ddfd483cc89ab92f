// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for validating the radial structure and connectedness of a
//! [`NetworkTopology`].

use crate::{Error, TopologyEdge, TopologyNode};

use super::TopologyValidator;

impl<N, E> TopologyValidator<'_, N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    /// Validates that every link of the tree reached from the source has its
    /// cable.  Loops are rejected while the tree is oriented.
    pub(super) fn validate_radial_tree(&self) -> Result<(), Error> {
        for node in self.topology.nodes_from_source() {
            self.ensure_cables_recorded(node)?;
        }
        Ok(())
    }

    /// Validates that all nodes are reachable from the source.
    ///
    /// Unreachable nodes are an error only when the configuration asks for
    /// it.  Otherwise they are isolated: left out of the tree and reported
    /// as disconnected.
    pub(super) fn validate_connected_network(&self) -> Result<(), Error> {
        let mut unreached = self
            .topology
            .disconnected_nodes()
            .map(|n| n.node_id().to_string())
            .collect::<Vec<_>>();
        if unreached.is_empty() {
            return Ok(());
        }
        unreached.sort();

        if self.topology.config.reject_disconnected_nodes {
            return Err(Error::invalid_topology(format!(
                "Nodes {:?} are not connected to the source.",
                unreached
            )));
        }

        tracing::warn!(
            "Nodes {:?} are not connected to the source and are left out of the calculation.",
            unreached
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::topology::test_utils::{nodes_and_cables, TestCable, TestNode};
    use crate::{Error, NetworkTopology, TopologyConfig};

    #[test]
    fn test_connected_network_validation() -> Result<(), Error> {
        let (mut nodes, mut cables) = nodes_and_cables();
        nodes.push(TestNode::new("7"));
        nodes.push(TestNode::new("8"));
        // The cable between the two stray nodes is not reachable either.
        cables.push(TestCable::new("c8", "7", "8"));

        let strict = TopologyConfig {
            reject_disconnected_nodes: true,
        };
        assert!(
            NetworkTopology::try_new(nodes.clone(), cables.clone(), strict).is_err_and(
                |e| e == Error::invalid_topology("Nodes [\"7\", \"8\"] are not connected to the source.")
            )
        );

        let topology =
            NetworkTopology::try_new(nodes.clone(), cables.clone(), TopologyConfig::default())?;
        assert!(topology
            .disconnected_nodes()
            .eq(&[TestNode::new("7"), TestNode::new("8")]));
        assert!(topology
            .detached_cables()
            .iter()
            .eq(&[TestCable::new("c8", "7", "8")]));
        assert!(!topology.is_connected("7"));
        assert!(topology.is_connected("5"));
        assert_eq!(topology.connected_node_ids().len(), 7);
        assert!(!topology.connected_cable_ids().contains("c8"));

        Ok(())
    }
}
