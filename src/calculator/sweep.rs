// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Backward/forward sweep over the radial tree with constant-power loads.

use crate::config::SweepSettings;
use crate::diagnostics::{Category, Diagnostics};
use crate::phasor::{rotate_to_phase, Phasor, PhasorOps, PHASES};

use super::injection::NodeInjection;
use super::PreparedNetwork;

/// Converged electrical state of one solver pass, indexed by node position.
#[derive(Clone, Debug)]
pub(crate) struct FlowState {
    /// Phase voltages at the node, downstream of its regulator if any.
    pub(crate) voltages: Vec<[Phasor; 3]>,
    /// Phase voltages at the node, upstream of its regulator if any.
    pub(crate) upstream: Vec<[Phasor; 3]>,
    /// Phase currents entering the node through its feeder.  For the source
    /// these are the transformer currents.
    pub(crate) branch_currents: Vec<[Phasor; 3]>,
    pub(crate) neutral_currents: Vec<Phasor>,
    pub(crate) emf: [Phasor; 3],
    pub(crate) iterations: usize,
    pub(crate) converged: bool,
}

/// Runs the sweep until the largest voltage change between two iterations
/// falls below the tolerance.
///
/// With `balanced` set only phase A is solved, and phases B and C are its
/// rotations.  `ratios` holds the regulator ratio of every node.
pub(crate) fn sweep(
    network: &PreparedNetwork,
    injections: &[NodeInjection],
    ratios: &[[f64; 3]],
    balanced: bool,
    settings: &SweepSettings,
    diagnostics: &mut Diagnostics,
) -> FlowState {
    let count = network.nodes.len();
    let phases: &[usize] = if balanced { &[0] } else { &[0, 1, 2] };
    let with_neutral = network.voltage_system.has_neutral() && !balanced;
    let z_tr = network
        .transformer
        .map(|t| t.series)
        .unwrap_or_default();
    let emf = PHASES.map(|p| Phasor::from_polar_deg(network.emf_v, p.angle_deg()));

    let mut state = FlowState {
        voltages: vec![emf; count],
        upstream: vec![emf; count],
        branch_currents: vec![[Phasor::default(); 3]; count],
        neutral_currents: vec![Phasor::default(); count],
        emf,
        iterations: 0,
        converged: false,
    };
    let mut failed_division = vec![false; count];

    while state.iterations < settings.max_iterations {
        state.iterations += 1;

        // Backward: load currents at the present voltages, summed towards
        // the source.
        let mut outgoing = vec![[Phasor::default(); 3]; count];
        for (n, injection) in injections.iter().enumerate().take(count) {
            for &p in phases {
                let s = injection.power_va[p];
                if s == Phasor::default() {
                    continue;
                }
                match s.checked_div(state.voltages[n][p]) {
                    Ok(current) => outgoing[n][p] = current.conj(),
                    Err(err) => {
                        if !failed_division[n] {
                            failed_division[n] = true;
                            tracing::warn!(
                                "Dropping the injection of node {}: {}",
                                network.nodes[n].id,
                                err
                            );
                            diagnostics.warn(
                                Category::Numeric,
                                Some(network.nodes[n].id.as_str()),
                                "Voltage too close to zero, the injection is dropped.",
                            );
                        }
                    }
                }
            }
        }

        let mut branch = vec![[Phasor::default(); 3]; count];
        for n in (0..count).rev() {
            for &p in phases {
                branch[n][p] = outgoing[n][p] * ratios[n][p];
            }
            if let Some(parent) = network.nodes[n].parent {
                for &p in phases {
                    outgoing[parent][p] += branch[n][p];
                }
            }
        }

        let neutral = branch
            .iter()
            .map(|b| {
                if with_neutral {
                    b[0] + b[1] + b[2]
                } else {
                    Phasor::default()
                }
            })
            .collect::<Vec<_>>();

        // Forward: voltage drops from the transformer EMF down the tree.
        let mut voltages = state.voltages.clone();
        let mut upstream = state.upstream.clone();
        let mut delta: f64 = 0.0;
        for n in 0..count {
            let node = &network.nodes[n];
            for &p in phases {
                let before = match (node.parent, &node.feeder) {
                    (Some(parent), Some(feeder)) => {
                        let zn = feeder.zn.unwrap_or_default();
                        voltages[parent][p] - feeder.z1 * branch[n][p] - zn * neutral[n]
                    }
                    _ => emf[p] - z_tr * branch[n][p],
                };
                let after = before * ratios[n][p];
                delta = delta.max((after - state.voltages[n][p]).norm());
                upstream[n][p] = before;
                voltages[n][p] = after;
            }
        }

        let finite = voltages
            .iter()
            .chain(upstream.iter())
            .all(|v| phases.iter().all(|&p| v[p].is_finite_phasor()));
        if !finite {
            tracing::warn!(
                "Sweep diverged after {} iterations, keeping the last finite state.",
                state.iterations
            );
            diagnostics.error(
                Category::Convergence,
                None,
                format!(
                    "Sweep diverged after {} iterations, the last finite state is reported.",
                    state.iterations
                ),
            );
            break;
        }

        state.voltages = voltages;
        state.upstream = upstream;
        state.branch_currents = branch;
        state.neutral_currents = neutral;

        if delta < settings.tolerance_v {
            state.converged = true;
            break;
        }
    }

    if balanced {
        for n in 0..count {
            for p in [1, 2] {
                state.voltages[n][p] = rotate_to_phase(state.voltages[n][0], PHASES[p]);
                state.upstream[n][p] = rotate_to_phase(state.upstream[n][0], PHASES[p]);
                state.branch_currents[n][p] =
                    rotate_to_phase(state.branch_currents[n][0], PHASES[p]);
            }
        }
    }

    if !state.converged {
        tracing::warn!(
            "Sweep did not converge within {} iterations.",
            settings.max_iterations
        );
        diagnostics.warn(
            Category::Convergence,
            None,
            format!(
                "Sweep did not converge within {} iterations.",
                settings.max_iterations
            ),
        );
    }

    state
}
