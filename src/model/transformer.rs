// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

use serde::{Deserialize, Serialize};

use crate::phasor::Phasor;

/// X/R ratio used when the transformer configuration doesn't provide a
/// usable one.
pub const DEFAULT_XR_RATIO: f64 = 3.0;

/// The MV/LV transformer feeding the network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    pub nominal_power_kva: f64,
    /// Nominal line-to-line secondary voltage.
    pub nominal_voltage_v: f64,
    pub short_circuit_voltage_percent: f64,
    #[serde(default)]
    pub xr_ratio: Option<f64>,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            nominal_power_kva: 250.0,
            nominal_voltage_v: 400.0,
            short_circuit_voltage_percent: 4.0,
            xr_ratio: None,
        }
    }
}

/// Per-phase series impedance of the transformer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformerImpedance {
    pub series: Phasor,
    /// Nominal secondary current, in amperes.
    pub nominal_current_a: f64,
}

impl TransformerConfig {
    /// Derives the per-phase series impedance.
    ///
    /// Returns `None` when the rating or the voltage is not a positive
    /// finite number; the transformer is then treated as ideal.
    pub fn impedance(&self, default_xr_ratio: f64) -> Option<TransformerImpedance> {
        let s_va = self.nominal_power_kva * 1000.0;
        let u = self.nominal_voltage_v;
        if !(s_va.is_finite() && s_va > 0.0 && u.is_finite() && u > 0.0) {
            return None;
        }
        let base_ohm = u * u / s_va;
        let ucc = if self.short_circuit_voltage_percent.is_finite() {
            self.short_circuit_voltage_percent.max(0.0) / 100.0
        } else {
            0.0
        };
        let z = ucc * base_ohm;
        let xr = self
            .xr_ratio
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(default_xr_ratio);
        let r = z / (1.0 + xr * xr).sqrt();
        Some(TransformerImpedance {
            series: Phasor::new(r, r * xr),
            nominal_current_a: s_va / (3.0_f64.sqrt() * u),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_impedance() {
        let config = TransformerConfig {
            nominal_power_kva: 400.0,
            nominal_voltage_v: 400.0,
            short_circuit_voltage_percent: 4.0,
            xr_ratio: Some(3.0),
        };
        let z = config.impedance(DEFAULT_XR_RATIO).unwrap();
        assert_abs_diff_eq!(z.series.norm(), 0.016, epsilon = 1e-12);
        assert_abs_diff_eq!(z.series.im / z.series.re, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(z.nominal_current_a, 577.35, epsilon = 0.01);

        let broken = TransformerConfig {
            nominal_power_kva: 0.0,
            ..config
        };
        assert!(broken.impedance(DEFAULT_XR_RATIO).is_none());
    }
}
