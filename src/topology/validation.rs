// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for validating a [`NetworkTopology`].

mod invariant_checks;
mod validate_tree;

use crate::{Error, NetworkTopology, TopologyEdge, TopologyNode};

pub(crate) struct TopologyValidator<'a, N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    topology: &'a NetworkTopology<N, E>,
}

impl<N, E> NetworkTopology<N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    pub(super) fn validate(&self) -> Result<(), Error> {
        if self.node(&self.source_id).is_err() {
            return Err(Error::internal(format!(
                "Source node not found with detected node ID: {}.",
                self.source_id
            )));
        }

        let validator = TopologyValidator { topology: self };

        validator.validate_radial_tree()?;
        validator.validate_connected_network()?;

        Ok(())
    }
}
