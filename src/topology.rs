// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Resolution of the radial network: the source, the tree of cables
//! oriented away from it, the circuits and the disconnected remainder.

mod creation;
mod retrieval;
mod validation;

pub mod iterators;
mod traversal;

#[cfg(test)]
pub(crate) mod test_utils;

use crate::{TopologyConfig, TopologyEdge, TopologyNode};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// `Node`s stored in a `DiGraph` instance can be addressed with `NodeIndex`es.
///
/// `NodeIndexMap` stores the corresponding `NodeIndex` for any node id, so
/// that nodes in the `DiGraph` can be retrieved from their ids.
pub(crate) type NodeIndexMap = HashMap<String, NodeIndex>;

/// Cables are not stored in the `DiGraph` instance, so we need to store them
/// separately.
///
/// `EdgeMap` can be used to lookup the cable for any pair of parent and
/// child `NodeIndex` values.
pub(crate) type EdgeMap<E> = HashMap<(NodeIndex, NodeIndex), E>;

/// A feeder of the network: the subtree hanging off one cable that is
/// directly connected to the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Circuit {
    /// 1-based number, in cable-id order of the source cables.
    pub number: usize,
    pub cable_id: String,
    pub head_node_id: String,
}

/// The radial network resolved from an unordered set of nodes and cables.
///
/// Cables reached from the source are oriented from parent to child.  Nodes
/// the source can't reach are kept, but reported as disconnected and never
/// part of the tree.
pub struct NetworkTopology<N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    graph: DiGraph<N, ()>,
    node_indices: NodeIndexMap,
    source_id: String,
    edges: EdgeMap<E>,
    detached_cables: Vec<E>,
    /// Connected nodes in breadth-first order from the source.
    order: Vec<NodeIndex>,
    circuits: Vec<Circuit>,
    circuit_of: HashMap<NodeIndex, usize>,
    config: TopologyConfig,
}
