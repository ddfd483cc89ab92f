// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module contains the configuration options for the calculators.

use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_XR_RATIO;

/// Configuration options for the `NetworkTopology`.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Whether nodes that are not reachable from the source make the
    /// network invalid.  When this is `false`, such nodes are reported as
    /// disconnected and left out of the calculation.
    pub reject_disconnected_nodes: bool,
}

/// Bounds of the backward/forward sweep of one solver pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Largest phase voltage change between two sweeps, in volts, below
    /// which a pass is considered settled.
    pub tolerance_v: f64,
    pub max_iterations: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            tolerance_v: 1e-6,
            max_iterations: 100,
        }
    }
}

/// Voltage drop limits used for the compliance classification, in percent
/// of the reference voltage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceLimits {
    pub warning_percent: f64,
    pub critical_percent: f64,
}

impl Default for ComplianceLimits {
    fn default() -> Self {
        Self {
            warning_percent: 8.0,
            critical_percent: 10.0,
        }
    }
}

/// Termination policy of an iterative procedure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergencePolicy {
    /// Error below which the procedure has converged.
    pub tolerance: f64,
    /// Hard ceiling on the number of iterations.
    pub max_iterations: usize,
    /// Number of consecutive iterations without improvement of the best
    /// error after which the procedure is considered stalled.
    pub patience: usize,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_iterations: 10,
            patience: 3,
        }
    }
}

/// Settings of the forced-mode calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Search range of the load diversity, in percent.
    pub diversity_range_percent: (f64, f64),
    /// Maximum number of solver evaluations of the diversity search.
    pub max_evaluations: usize,
    /// Tolerance of the diversity search on the mean voltage, in volts.
    pub diversity_tolerance_v: f64,
    /// Policy of the phase distribution search.  The tolerance applies to
    /// the largest per-phase voltage error, in volts.
    pub distribution: ConvergencePolicy,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            diversity_range_percent: (0.0, 150.0),
            max_evaluations: 40,
            diversity_tolerance_v: 0.01,
            distribution: ConvergencePolicy {
                tolerance: 0.5,
                max_iterations: 30,
                patience: 4,
            },
        }
    }
}

/// Configuration options for the `ElectricalCalculator` and the
/// `SimulationCalculator`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    pub topology: TopologyConfig,
    pub sweep: SweepSettings,
    pub limits: ComplianceLimits,
    /// Policy of the voltage regulator fixed point.  The tolerance applies
    /// to the largest per-phase voltage change between passes, in volts.
    pub regulation: ConvergencePolicy,
    pub calibration: CalibrationSettings,
    /// X/R ratio of the transformer when its configuration has none.
    pub default_xr_ratio: f64,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            topology: TopologyConfig::default(),
            sweep: SweepSettings::default(),
            limits: ComplianceLimits::default(),
            regulation: ConvergencePolicy::default(),
            calibration: CalibrationSettings::default(),
            default_xr_ratio: DEFAULT_XR_RATIO,
        }
    }
}
