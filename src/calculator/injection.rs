// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Complex power injected at every node for one scenario.

use crate::diagnostics::{Category, Diagnostics};
use crate::model::{LoadModel, PhaseDistribution, Project, Scenario};
use crate::phasor::Phasor;

use super::PreparedNetwork;

/// Diversity percentages are clamped to this range.  Values above 100 are
/// only reached by the forced-mode calibration.
pub const DIVERSITY_RANGE_PERCENT: (f64, f64) = (0.0, 150.0);

/// The scenario-dependent inputs of one solver pass.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowInputs {
    pub scenario: Scenario,
    pub load_diversity_percent: f64,
    pub production_diversity_percent: f64,
    pub load_model: LoadModel,
    pub unbalance_percent: f64,
    /// Project-wide distribution, used for nodes without their own.
    pub manual_distribution: Option<PhaseDistribution>,
}

impl FlowInputs {
    /// Takes the scenario-independent inputs from the project settings.
    pub fn from_project(project: &Project, scenario: Scenario) -> Self {
        Self {
            scenario,
            load_diversity_percent: project.load_diversity_percent,
            production_diversity_percent: project.production_diversity_percent,
            load_model: project.load_model,
            unbalance_percent: project.unbalance_percent,
            manual_distribution: project.manual_phase_distribution.clone(),
        }
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }
}

/// Power at one node after diversity.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct NodeInjection {
    pub(crate) load_kva: f64,
    pub(crate) production_kva: f64,
    /// Net complex power drawn on each phase, in VA.  Negative when the
    /// node produces more than it consumes.
    pub(crate) power_va: [Phasor; 3],
}

fn diversity_factor(percent: f64, what: &str, diagnostics: &mut Diagnostics) -> f64 {
    let (min, max) = DIVERSITY_RANGE_PERCENT;
    if !percent.is_finite() {
        diagnostics.warn(
            Category::Validation,
            None,
            format!("{what} diversity {percent} % is not a number, 100 % is used."),
        );
        return 1.0;
    }
    let clamped = percent.clamp(min, max);
    if clamped != percent {
        diagnostics.warn(
            Category::Validation,
            None,
            format!("{what} diversity {percent} % is clamped to {clamped} %."),
        );
    }
    clamped / 100.0
}

fn checked_distribution(
    distribution: &PhaseDistribution,
    entity: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> PhaseDistribution {
    if distribution.is_normalized(1e-6) {
        return distribution.clone();
    }
    diagnostics.warn(
        Category::Validation,
        entity,
        "Phase distribution does not sum to 100 %, it is normalized.",
    );
    distribution.normalized()
}

/// Computes the power injected at every node of `network`, in node order.
pub(crate) fn node_injections(
    network: &PreparedNetwork,
    inputs: &FlowInputs,
    diagnostics: &mut Diagnostics,
) -> Vec<NodeInjection> {
    let load_factor = if inputs.scenario.includes_loads() {
        diversity_factor(inputs.load_diversity_percent, "Load", diagnostics)
    } else {
        0.0
    };
    let production_factor = if inputs.scenario.includes_productions() {
        diversity_factor(inputs.production_diversity_percent, "Production", diagnostics)
    } else {
        0.0
    };

    let pf = network.power_factor;
    let unit = Phasor::new(pf, (1.0 - pf * pf).max(0.0).sqrt());

    let fallback = match (&inputs.load_model, &inputs.manual_distribution) {
        (LoadModel::Balanced, _) => PhaseDistribution::equal(),
        (LoadModel::Unbalanced, Some(manual)) => checked_distribution(manual, None, diagnostics),
        (LoadModel::Unbalanced, None) => PhaseDistribution::from_unbalance(inputs.unbalance_percent),
    };

    network
        .nodes
        .iter()
        .map(|node| {
            let load_kva = node.load_kva * load_factor;
            let production_kva = node.production_kva * production_factor;

            let power_va = match inputs.load_model {
                LoadModel::Balanced => [unit * ((load_kva - production_kva) * 1000.0 / 3.0); 3],
                LoadModel::Unbalanced => {
                    let distribution = match &node.distribution {
                        Some(own) => checked_distribution(own, Some(node.id.as_str()), diagnostics),
                        None => fallback.clone(),
                    };
                    let loads = distribution.load_fractions();
                    let productions = distribution.production_fractions();
                    [0, 1, 2].map(|p| {
                        unit * ((load_kva * loads[p] - production_kva * productions[p]) * 1000.0)
                    })
                }
            };

            NodeInjection {
                load_kva,
                production_kva,
                power_va,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalculatorConfig;
    use crate::test_utils::NetworkBuilder;
    use crate::Error;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scenario_masks() -> Result<(), Error> {
        let project = NetworkBuilder::four_wire()
            .node("n1", 30.0, 12.0)
            .cable("c1", "S", "n1", 100.0)
            .build();
        let network = PreparedNetwork::new(&project, &CalculatorConfig::default())?;
        let mut diagnostics = Diagnostics::new();

        let mut inputs = FlowInputs::from_project(&project, Scenario::Withdrawal);
        let injections = node_injections(&network, &inputs, &mut diagnostics);
        assert_eq!(injections[1].load_kva, 30.0);
        assert_eq!(injections[1].production_kva, 0.0);
        assert_abs_diff_eq!(injections[1].power_va[0].re, 10_000.0 * 0.95, epsilon = 1e-9);

        inputs = inputs.with_scenario(Scenario::Production);
        let injections = node_injections(&network, &inputs, &mut diagnostics);
        assert_eq!(injections[1].load_kva, 0.0);
        assert_abs_diff_eq!(injections[1].power_va[2].re, -4_000.0 * 0.95, epsilon = 1e-9);

        inputs = inputs.with_scenario(Scenario::Mixed);
        let injections = node_injections(&network, &inputs, &mut diagnostics);
        assert_abs_diff_eq!(injections[1].power_va[1].re, 6_000.0 * 0.95, epsilon = 1e-9);
        assert!(diagnostics.is_empty());

        Ok(())
    }

    #[test]
    fn test_diversity_is_clamped() -> Result<(), Error> {
        let project = NetworkBuilder::four_wire()
            .node("n1", 10.0, 0.0)
            .cable("c1", "S", "n1", 100.0)
            .build();
        let network = PreparedNetwork::new(&project, &CalculatorConfig::default())?;
        let mut diagnostics = Diagnostics::new();

        let mut inputs = FlowInputs::from_project(&project, Scenario::Withdrawal);
        inputs.load_diversity_percent = 180.0;
        let injections = node_injections(&network, &inputs, &mut diagnostics);
        assert_abs_diff_eq!(injections[1].load_kva, 15.0, epsilon = 1e-12);
        assert_eq!(diagnostics.in_category(Category::Validation).count(), 1);

        Ok(())
    }

    #[test]
    fn test_distribution_priority() -> Result<(), Error> {
        let own = PhaseDistribution {
            loads: [100.0, 0.0, 0.0],
            productions: [100.0 / 3.0; 3],
        };
        let project = NetworkBuilder::four_wire()
            .unbalanced(20.0)
            .node("n1", 30.0, 0.0)
            .node("n2", 30.0, 0.0)
            .node_distribution("n2", own)
            .cable("c1", "S", "n1", 100.0)
            .cable("c2", "n1", "n2", 100.0)
            .build();
        let network = PreparedNetwork::new(&project, &CalculatorConfig::default())?;
        let mut diagnostics = Diagnostics::new();

        let mut inputs = FlowInputs::from_project(&project, Scenario::Withdrawal);
        let injections = node_injections(&network, &inputs, &mut diagnostics);
        // Unbalance default: A = 40 %, B = C = 30 %.
        assert_abs_diff_eq!(injections[1].power_va[0].re, 12_000.0 * 0.95, epsilon = 1e-6);
        assert_abs_diff_eq!(injections[1].power_va[1].re, 9_000.0 * 0.95, epsilon = 1e-6);
        // The node's own distribution wins.
        assert_abs_diff_eq!(injections[2].power_va[0].re, 30_000.0 * 0.95, epsilon = 1e-6);
        assert_abs_diff_eq!(injections[2].power_va[2].re, 0.0, epsilon = 1e-9);

        // A manual distribution replaces the unbalance default, and is
        // normalized when it doesn't sum to 100.
        inputs.manual_distribution = Some(PhaseDistribution {
            loads: [1.0, 1.0, 2.0],
            productions: [1.0, 1.0, 1.0],
        });
        let injections = node_injections(&network, &inputs, &mut diagnostics);
        assert_abs_diff_eq!(injections[1].power_va[2].re, 15_000.0 * 0.95, epsilon = 1e-6);
        assert_eq!(diagnostics.in_category(Category::Validation).count(), 1);

        Ok(())
    }
}
