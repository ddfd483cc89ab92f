// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The phase flow solver.

mod injection;
mod network;
mod regulation;
mod report;
mod sweep;

pub use injection::{FlowInputs, DIVERSITY_RANGE_PERCENT};
pub use network::PreparedNetwork;
pub use regulation::RegulationTable;

pub(crate) use report::{update_compliance, update_node_voltages};

use crate::config::CalculatorConfig;
use crate::model::{LoadModel, Project, Scenario};
use crate::result::CalculationResult;
use crate::Error;

/// Computes the per-phase voltages, currents, losses and compliance of a
/// radial network for one scenario.
///
/// ```
/// use lv_network_calc::{CalculatorConfig, ElectricalCalculator};
/// use lv_network_calc::model::{Cable, CableType, Node, Project, Scenario, VoltageSystem};
///
/// let mut project = Project::new("Street", VoltageSystem::FourWire400);
/// project.cable_types.push(CableType::new("AL-150", 0.206, 0.08, 0.824, 0.32));
/// project.nodes.push(Node::source("S"));
/// project.nodes.push(Node::new("n1").with_load(36.0));
/// project
///     .cables
///     .push(Cable::new("c1", "S", "n1", "AL-150", vec![]).with_length(250.0));
///
/// let calculator = ElectricalCalculator::new(CalculatorConfig::default());
/// let result = calculator.calculate(&project, Scenario::Withdrawal)?;
///
/// assert!(result.sweep_converged);
/// assert!(result.node("n1").is_some_and(|n| n.voltage_v < 230.0));
/// # Ok::<(), lv_network_calc::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct ElectricalCalculator {
    config: CalculatorConfig,
}

impl ElectricalCalculator {
    pub fn new(config: CalculatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    /// Resolves the topology and cable impedances of `project`.
    pub fn prepare(&self, project: &Project) -> Result<PreparedNetwork, Error> {
        PreparedNetwork::new(project, &self.config)
    }

    /// Prepares `project` and runs one solver pass for `scenario`, without
    /// any regulation.
    pub fn calculate(
        &self,
        project: &Project,
        scenario: Scenario,
    ) -> Result<CalculationResult, Error> {
        let network = self.prepare(project)?;
        Ok(self.solve(
            &network,
            &FlowInputs::from_project(project, scenario),
            &RegulationTable::new(),
        ))
    }

    /// Runs the withdrawal, mixed and production scenarios on one prepared
    /// network.
    pub fn calculate_all(&self, project: &Project) -> Result<Vec<CalculationResult>, Error> {
        let network = self.prepare(project)?;
        Ok([Scenario::Withdrawal, Scenario::Mixed, Scenario::Production]
            .into_iter()
            .map(|scenario| {
                self.solve(
                    &network,
                    &FlowInputs::from_project(project, scenario),
                    &RegulationTable::new(),
                )
            })
            .collect())
    }

    /// Runs one solver pass on a prepared network, applying the regulator
    /// ratios of `table`.
    pub fn solve(
        &self,
        network: &PreparedNetwork,
        inputs: &FlowInputs,
        table: &RegulationTable,
    ) -> CalculationResult {
        let mut diagnostics = network.diagnostics.clone();
        let balanced = inputs.load_model == LoadModel::Balanced;

        let injections = injection::node_injections(network, inputs, &mut diagnostics);
        let ratios = network
            .nodes
            .iter()
            .map(|node| {
                let ratios = table.ratios(&node.id);
                if ratios.iter().all(|r| r.is_finite() && *r > 0.0) {
                    ratios
                } else {
                    [1.0; 3]
                }
            })
            .collect::<Vec<_>>();

        let state = sweep::sweep(
            network,
            &injections,
            &ratios,
            balanced,
            &self.config.sweep,
            &mut diagnostics,
        );
        tracing::debug!(
            "Solved {} ({:?}) in {} sweep iterations, converged: {}.",
            inputs.scenario,
            inputs.load_model,
            state.iterations,
            state.converged
        );

        report::build_result(
            network,
            inputs,
            &injections,
            &state,
            &self.config.limits,
            diagnostics,
        )
    }
}
