// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Per-call table of the voltage ratios applied by regulators.

use std::collections::HashMap;

/// Voltage ratios applied at regulated nodes, by node id.
///
/// A table is owned by one top-level calculation and discarded afterwards,
/// so a ratio set for one calculation never shows up in another.  Nodes
/// missing from the table are not regulated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegulationTable {
    ratios: HashMap<String, [f64; 3]>,
}

impl RegulationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-phase ratio `V_downstream / V_upstream` of a node.
    pub fn set(&mut self, node_id: impl Into<String>, ratios: [f64; 3]) {
        self.ratios.insert(node_id.into(), ratios);
    }

    pub fn get(&self, node_id: &str) -> Option<[f64; 3]> {
        self.ratios.get(node_id).copied()
    }

    /// Returns the ratios of a node, `1.0` on all phases when it is not
    /// regulated.
    pub fn ratios(&self, node_id: &str) -> [f64; 3] {
        self.get(node_id).unwrap_or([1.0; 3])
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregulated_nodes_have_unit_ratio() {
        let mut table = RegulationTable::new();
        assert_eq!(table.ratios("n1"), [1.0; 3]);

        table.set("n1", [0.9625, 1.0, 1.0375]);
        assert_eq!(table.ratios("n1"), [0.9625, 1.0, 1.0375]);
        assert_eq!(table.get("n2"), None);
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
