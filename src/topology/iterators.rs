// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Iterators over nodes and cables in a `NetworkTopology`.

use petgraph::graph::{DiGraph, NodeIndex};

use crate::{NetworkTopology, TopologyEdge, TopologyNode};

/// An iterator over the nodes in a `NetworkTopology`, connected or not, in
/// the order they were given.
pub struct Nodes<'a, N>
where
    N: TopologyNode,
{
    pub(crate) iter: std::slice::Iter<'a, petgraph::graph::Node<N>>,
}

impl<'a, N> Iterator for Nodes<'a, N>
where
    N: TopologyNode,
{
    type Item = &'a N;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|n| &n.weight)
    }
}

/// An iterator over the connected nodes in breadth-first order from the
/// source.  Every node comes after its parent.
pub struct NodesFromSource<'a, N>
where
    N: TopologyNode,
{
    pub(crate) graph: &'a DiGraph<N, ()>,
    pub(crate) iter: std::slice::Iter<'a, NodeIndex>,
}

impl<'a, N> Iterator for NodesFromSource<'a, N>
where
    N: TopologyNode,
{
    type Item = &'a N;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|&i| &self.graph[i])
    }
}

/// An iterator over the cables of the tree, in the order the resolver
/// reached them from the source.
pub struct Cables<'a, N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    pub(crate) topology: &'a NetworkTopology<N, E>,
    pub(crate) iter: std::slice::Iter<'a, petgraph::graph::Edge<()>>,
}

impl<'a, N, E> Iterator for Cables<'a, N, E>
where
    N: TopologyNode,
    E: TopologyEdge,
{
    type Item = &'a E;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter
            .next()
            .and_then(|e| self.topology.edges.get(&(e.source(), e.target())))
    }
}

/// An iterator over the neighbors of a node in a `NetworkTopology`.
pub struct Neighbors<'a, N>
where
    N: TopologyNode,
{
    pub(crate) graph: &'a DiGraph<N, ()>,
    pub(crate) iter: petgraph::graph::Neighbors<'a, ()>,
}

impl<'a, N> Iterator for Neighbors<'a, N>
where
    N: TopologyNode,
{
    type Item = &'a N;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|i| &self.graph[i])
    }
}
