// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The plain network description handed over by the project layer: nodes,
//! cables, cable types, the transformer and the project settings.

mod cable;
mod geo;
mod node;
mod project;
mod transformer;

pub use cable::{Cable, CableType, InstallationMethod, Material};
pub use geo::GeoPoint;
pub use node::{Node, PhaseDistribution, PowerEntry};
pub use project::{ForcedModeConfig, LoadModel, Project, Scenario, VoltageSystem};
pub use transformer::{TransformerConfig, TransformerImpedance, DEFAULT_XR_RATIO};
