// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

use serde::{Deserialize, Serialize};

use super::GeoPoint;
use crate::phasor::Phasor;

/// Conductor material of a cable type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Material {
    Copper,
    Aluminium,
}

/// How a cable is laid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallationMethod {
    Underground,
    Overhead,
    Facade,
}

/// Reference data of a cable model.
///
/// Impedances are given per kilometre, for the positive sequence (`r12`,
/// `x12`) and the zero sequence (`r0`, `x0`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CableType {
    pub id: String,
    pub label: String,
    pub material: Material,
    pub r12_ohm_per_km: f64,
    pub x12_ohm_per_km: f64,
    pub r0_ohm_per_km: f64,
    pub x0_ohm_per_km: f64,
    #[serde(default)]
    pub installation_methods: Vec<InstallationMethod>,
    #[serde(default)]
    pub ampacity_a: Option<f64>,
}

impl CableType {
    /// Creates a copper cable type accepting every installation method.
    pub fn new(id: impl Into<String>, r12: f64, x12: f64, r0: f64, x0: f64) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            material: Material::Copper,
            r12_ohm_per_km: r12,
            x12_ohm_per_km: x12,
            r0_ohm_per_km: r0,
            x0_ohm_per_km: x0,
            installation_methods: vec![],
            ampacity_a: None,
        }
    }

    pub fn with_ampacity(mut self, ampacity_a: f64) -> Self {
        self.ampacity_a = Some(ampacity_a);
        self
    }

    pub fn with_installation_methods(mut self, methods: Vec<InstallationMethod>) -> Self {
        self.installation_methods = methods;
        self
    }

    /// Positive-sequence series impedance per kilometre.
    pub fn phase_impedance_per_km(&self) -> Phasor {
        Phasor::new(self.r12_ohm_per_km, self.x12_ohm_per_km)
    }

    /// Zero-sequence series impedance per kilometre.
    pub fn zero_sequence_impedance_per_km(&self) -> Phasor {
        Phasor::new(self.r0_ohm_per_km, self.x0_ohm_per_km)
    }

    /// Neutral conductor impedance per kilometre, `Zn = (Z0 - Z1) / 3`.
    ///
    /// Returns `None` when the zero-sequence data can't produce a physical
    /// neutral impedance (non-finite values, or `Z0` not above `Z1`).
    pub fn neutral_impedance_per_km(&self) -> Option<Phasor> {
        let z1 = self.phase_impedance_per_km();
        let z0 = self.zero_sequence_impedance_per_km();
        if ![z0.re, z0.im, z1.re, z1.im].iter().all(|v| v.is_finite()) {
            return None;
        }
        let zn = (z0 - z1) / 3.0;
        if zn.re <= 0.0 || zn.im < 0.0 {
            return None;
        }
        Some(zn)
    }

    /// Returns `true` if the cable type may be laid with the given method.
    ///
    /// Types without any listed methods accept all of them.
    pub fn permits(&self, method: InstallationMethod) -> bool {
        self.installation_methods.is_empty() || self.installation_methods.contains(&method)
    }
}

/// A cable between two nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cable {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub node_a: String,
    pub node_b: String,
    pub cable_type_id: String,
    pub installation_method: InstallationMethod,
    #[serde(default)]
    pub route: Vec<GeoPoint>,
    pub length_m: f64,
}

impl Cable {
    /// Creates a cable whose length is derived from its route.
    pub fn new(
        id: impl Into<String>,
        node_a: impl Into<String>,
        node_b: impl Into<String>,
        cable_type_id: impl Into<String>,
        route: Vec<GeoPoint>,
    ) -> Self {
        let length_m = GeoPoint::route_length_m(&route);
        Self {
            id: id.into(),
            name: String::new(),
            node_a: node_a.into(),
            node_b: node_b.into(),
            cable_type_id: cable_type_id.into(),
            installation_method: InstallationMethod::Underground,
            route,
            length_m,
        }
    }

    /// Sets an explicit length, for cables drawn without a route.
    pub fn with_length(mut self, length_m: f64) -> Self {
        self.length_m = length_m;
        self
    }

    pub fn with_installation(mut self, method: InstallationMethod) -> Self {
        self.installation_method = method;
        self
    }

    /// Replaces the route of the cable and recomputes its length.
    pub fn set_route(&mut self, route: Vec<GeoPoint>) {
        self.length_m = GeoPoint::route_length_m(&route);
        self.route = route;
    }

    pub fn length_km(&self) -> f64 {
        self.length_m / 1000.0
    }
}
