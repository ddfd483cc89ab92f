// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module contains the traits that need to be implemented by the types
//! that represent a network node and a cable.

use crate::model::{Cable, Node};

/**
This trait needs to be implemented by the type that represents a node.

The topology resolver only needs the identity of a node and whether it is
the source, so it can work on borrowed records of any node type.

<details>
<summary>Example implementation for a node record of the project layer:</summary>

```ignore
impl lv_network_calc::TopologyNode for ui::NodeRecord {
    fn node_id(&self) -> &str {
        &self.uuid
    }

    fn is_source(&self) -> bool {
        self.kind == ui::NodeKind::Transformer
    }
}
```

</details>
*/
pub trait TopologyNode {
    /// Returns the identifier of the node.
    fn node_id(&self) -> &str;
    /// Returns true if the node is the transformer source of the network.
    fn is_source(&self) -> bool;
}

/// This trait needs to be implemented by the type that represents a cable.
///
/// Cables are undirected, the resolver orients them away from the source.
pub trait TopologyEdge {
    /// Returns the identifier of the cable.
    fn cable_id(&self) -> &str;
    /// Returns the identifier of one end of the cable.
    fn node_a(&self) -> &str;
    /// Returns the identifier of the other end of the cable.
    fn node_b(&self) -> &str;
}

impl TopologyNode for Node {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn is_source(&self) -> bool {
        self.is_source
    }
}

impl TopologyEdge for Cable {
    fn cable_id(&self) -> &str {
        &self.id
    }

    fn node_a(&self) -> &str {
        &self.node_a
    }

    fn node_b(&self) -> &str {
        &self.node_b
    }
}

impl<T: TopologyNode + ?Sized> TopologyNode for &T {
    fn node_id(&self) -> &str {
        (**self).node_id()
    }

    fn is_source(&self) -> bool {
        (**self).is_source()
    }
}

impl<T: TopologyEdge + ?Sized> TopologyEdge for &T {
    fn cable_id(&self) -> &str {
        (**self).cable_id()
    }

    fn node_a(&self) -> &str {
        (**self).node_a()
    }

    fn node_b(&self) -> &str {
        (**self).node_b()
    }
}
