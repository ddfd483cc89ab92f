// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// A contracted load or production, in kVA.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerEntry {
    #[serde(default)]
    pub label: String,
    pub kva: f64,
}

impl PowerEntry {
    pub fn new(label: impl Into<String>, kva: f64) -> Self {
        Self {
            label: label.into(),
            kva,
        }
    }
}

/// Share of loads and productions per phase A/B/C, in percent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseDistribution {
    pub loads: [f64; 3],
    pub productions: [f64; 3],
}

impl Default for PhaseDistribution {
    fn default() -> Self {
        Self::equal()
    }
}

impl PhaseDistribution {
    const EQUAL: [f64; 3] = [100.0 / 3.0; 3];

    /// Equal thirds on all phases.
    pub fn equal() -> Self {
        Self {
            loads: Self::EQUAL,
            productions: Self::EQUAL,
        }
    }

    /// Default split for an unbalance percentage: phase A takes the extra
    /// share, phases B and C share the rest.
    pub fn from_unbalance(unbalance_percent: f64) -> Self {
        let u = if unbalance_percent.is_finite() {
            unbalance_percent.clamp(0.0, 100.0) / 100.0
        } else {
            0.0
        };
        let split = [
            100.0 / 3.0 * (1.0 + u),
            100.0 / 3.0 * (1.0 - u / 2.0),
            100.0 / 3.0 * (1.0 - u / 2.0),
        ];
        Self {
            loads: split,
            productions: split,
        }
    }

    /// Returns `true` if both triples are finite, non-negative and sum to
    /// 100 within `tolerance` percent.
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        [self.loads, self.productions].iter().all(|triple| {
            triple.iter().all(|v| v.is_finite() && *v >= 0.0)
                && (triple.iter().sum::<f64>() - 100.0).abs() <= tolerance
        })
    }

    /// Returns a copy with both triples scaled to sum to 100.
    ///
    /// Triples that can't be scaled (all zero, negative or non-finite
    /// shares) are replaced by equal thirds.
    pub fn normalized(&self) -> Self {
        Self {
            loads: normalize_triple(self.loads),
            productions: normalize_triple(self.productions),
        }
    }

    /// Load share of each phase as a fraction of one.
    pub fn load_fractions(&self) -> [f64; 3] {
        self.loads.map(|v| v / 100.0)
    }

    /// Production share of each phase as a fraction of one.
    pub fn production_fractions(&self) -> [f64; 3] {
        self.productions.map(|v| v / 100.0)
    }
}

fn normalize_triple(triple: [f64; 3]) -> [f64; 3] {
    let valid = triple.iter().all(|v| v.is_finite() && *v >= 0.0);
    let sum: f64 = triple.iter().sum();
    if !valid || sum <= f64::EPSILON {
        return PhaseDistribution::EQUAL;
    }
    triple.map(|v| v * 100.0 / sum)
}

/// A node of the network: a connection point carrying loads and
/// productions, or the transformer source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: GeoPoint,
    #[serde(default)]
    pub is_source: bool,
    /// Imposed voltage, in reference volts.  Only used on the source node,
    /// where it replaces the transformer secondary voltage.
    #[serde(default)]
    pub target_voltage_v: Option<f64>,
    #[serde(default)]
    pub loads: Vec<PowerEntry>,
    #[serde(default)]
    pub productions: Vec<PowerEntry>,
    /// Per-node override of the phase distribution.
    #[serde(default)]
    pub phase_distribution: Option<PhaseDistribution>,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            position: GeoPoint::default(),
            is_source: false,
            target_voltage_v: None,
            loads: vec![],
            productions: vec![],
            phase_distribution: None,
        }
    }

    /// Creates the source node.
    pub fn source(id: impl Into<String>) -> Self {
        Self {
            is_source: true,
            ..Self::new(id)
        }
    }

    pub fn at(mut self, position: GeoPoint) -> Self {
        self.position = position;
        self
    }

    pub fn with_load(mut self, kva: f64) -> Self {
        self.loads.push(PowerEntry::new("", kva));
        self
    }

    pub fn with_production(mut self, kva: f64) -> Self {
        self.productions.push(PowerEntry::new("", kva));
        self
    }

    /// Sum of the contracted loads, in kVA.
    pub fn total_load_kva(&self) -> f64 {
        self.loads.iter().map(|l| l.kva).filter(|v| v.is_finite()).sum()
    }

    /// Sum of the contracted productions, in kVA.
    pub fn total_production_kva(&self) -> f64 {
        self.productions
            .iter()
            .map(|p| p.kva)
            .filter(|v| v.is_finite())
            .sum()
    }
}
