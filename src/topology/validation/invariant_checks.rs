// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Helper methods for checking invariants of a [`NetworkTopology`].

use crate::{Error, TopologyEdge, TopologyNode};

use super::TopologyValidator;

impl<N, E> TopologyValidator<'_, N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    /// Checks that every node fed by the given node has a cable recorded
    /// for that link.
    pub(super) fn ensure_cables_recorded(&self, node: &N) -> Result<(), Error> {
        for child in self.topology.successors(node.node_id())? {
            if self.topology.feeder_cable(child.node_id())?.is_none() {
                return Err(Error::internal(format!(
                    "No cable recorded between {} and {}.",
                    node.node_id(),
                    child.node_id()
                )));
            }
        }
        Ok(())
    }
}
