// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module is only compiled when running unit tests and contains the
//! `TestNode` and `TestCable` types, which implement the `TopologyNode` and
//! `TopologyEdge` traits respectively.

use crate::{TopologyEdge, TopologyNode};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TestNode(String, bool);

impl TestNode {
    pub(crate) fn new(id: &str) -> Self {
        TestNode(id.to_string(), false)
    }

    pub(crate) fn source(id: &str) -> Self {
        TestNode(id.to_string(), true)
    }
}

impl TopologyNode for TestNode {
    fn node_id(&self) -> &str {
        &self.0
    }

    fn is_source(&self) -> bool {
        self.1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TestCable(String, String, String);

impl TestCable {
    pub(crate) fn new(id: &str, node_a: &str, node_b: &str) -> Self {
        TestCable(id.to_string(), node_a.to_string(), node_b.to_string())
    }
}

impl TopologyEdge for TestCable {
    fn cable_id(&self) -> &str {
        &self.0
    }

    fn node_a(&self) -> &str {
        &self.1
    }

    fn node_b(&self) -> &str {
        &self.2
    }
}

/// A source `S` with two circuits:
///
/// ```text
///   S --c1-- 1 --c3-- 2 --c5-- 4
///   |                  \
///   |                   c6-- 5
///   +--c2-- 3 --c4-- 6
/// ```
///
/// Cables are listed out of order, and some of them point towards the
/// source, to exercise the orientation.
pub(crate) fn nodes_and_cables() -> (Vec<TestNode>, Vec<TestCable>) {
    let nodes = vec![
        TestNode::new("4"),
        TestNode::new("1"),
        TestNode::source("S"),
        TestNode::new("6"),
        TestNode::new("2"),
        TestNode::new("5"),
        TestNode::new("3"),
    ];
    let cables = vec![
        TestCable::new("c5", "2", "4"),
        TestCable::new("c3", "2", "1"),
        TestCable::new("c2", "S", "3"),
        TestCable::new("c6", "2", "5"),
        TestCable::new("c1", "1", "S"),
        TestCable::new("c4", "3", "6"),
    ];

    (nodes, cables)
}
