// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

/*!
# LV Network Calc

This is a library for computing the electrical state of radial low-voltage
distribution networks: a transformer feeding a tree of cables, with loads and
productions attached to the nodes.

It computes the per-phase voltages, currents and losses of the network for a
given scenario, classifies the voltage drops against the regulatory limits,
and simulates regulation equipment installed on the network.

## The `TopologyNode` and `TopologyEdge` traits

The network topology is resolved by [`NetworkTopology`], instances of which
can be created by passing an iterator of nodes and the cables between them to
the [`try_new`][NetworkTopology::try_new] method.

The topology resolver doesn't depend on the project types and instead uses
traits to interact with them.  The [`model`] types implement the
[`TopologyNode`] and [`TopologyEdge`] traits, and so can other node and cable
records.  [`Project::topology`][model::Project::topology] resolves the
topology of a project without running a calculation.

## Validation

The [`try_new`][NetworkTopology::try_new] method runs several checks on the
network, including checking that:

- There is exactly one source node.
- All cables connect two distinct, existing nodes.
- The cables reached from the source form a tree, without loops.
- Optionally, that all nodes are reachable from the source.

If any of the validation steps fail, the method will return an [`Error`].
Nodes that can't be reached from the source are otherwise reported and left
out of the calculations.

## Calculations

- [`ElectricalCalculator`] runs a backward/forward sweep over the tree for one
  scenario, and returns a [`CalculationResult`][result::CalculationResult]
  with per-node, per-cable, per-circuit and transformer figures.
- [`SimulationCalculator`] adds the [`VoltageRegulator`]s and
  [`NeutralCompensator`]s installed on the network, and calibrates the
  forced scenario on field measurements.

Issues that don't prevent a calculation from completing are logged with
`tracing` and collected in the [`Diagnostics`] of the result.
*/

mod calculator;
pub use calculator::{
    ElectricalCalculator, FlowInputs, PreparedNetwork, RegulationTable,
    DIVERSITY_RANGE_PERCENT,
};

mod config;
pub use config::{
    CalculatorConfig, CalibrationSettings, ComplianceLimits, ConvergencePolicy, SweepSettings,
    TopologyConfig,
};

pub mod diagnostics;
pub use diagnostics::{Category, DiagnosticIssue, Diagnostics, Severity};

mod error;
pub use error::{Error, ErrorKind};

pub mod model;
pub mod phasor;
pub mod result;

mod simulation;
pub use simulation::{
    run_fixed_point, CompensatorOutcome, ConvergenceController, ConvergenceReport,
    ConvergenceStatus, DeviceStatus, InactiveReason, NeutralCompensator, RegulatorOutcome,
    RegulatorState, RegulatorThresholds, SimulationCalculator, SimulationResult, StopReason,
    Verdict, VoltageRegulator,
};

mod topology;
pub use topology::{iterators, Circuit, NetworkTopology};

mod topology_traits;
pub use topology_traits::{TopologyEdge, TopologyNode};

#[cfg(test)]
mod test_utils;
