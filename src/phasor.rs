// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Phasor arithmetic on top of [`num_complex::Complex64`].
//!
//! Addition, subtraction and multiplication are the `num-complex` operators.
//! Division goes through [`PhasorOps::checked_div`], which refuses divisors
//! with a near-zero magnitude instead of producing `NaN` or infinities.

use num_complex::Complex64;

use crate::Error;

/// A complex number representing a sinusoidal quantity (voltage, current or
/// apparent power) at the network frequency.
pub type Phasor = Complex64;

/// Divisors with a magnitude below this value are rejected.
pub const MIN_DIVISOR: f64 = 1e-9;

/// The three phases of the network.
pub const PHASES: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

/// One of the three phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    /// Returns the position of the phase in per-phase arrays.
    pub fn index(self) -> usize {
        match self {
            Phase::A => 0,
            Phase::B => 1,
            Phase::C => 2,
        }
    }

    /// Returns the nominal angle of the phase, in degrees.
    pub fn angle_deg(self) -> f64 {
        match self {
            Phase::A => 0.0,
            Phase::B => -120.0,
            Phase::C => 120.0,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::A => write!(f, "A"),
            Phase::B => write!(f, "B"),
            Phase::C => write!(f, "C"),
        }
    }
}

/// Phasor operations missing from `Complex64`.
pub trait PhasorOps: Sized {
    /// Builds a phasor from a magnitude and an angle in degrees.
    fn from_polar_deg(magnitude: f64, angle_deg: f64) -> Self;

    fn angle_deg(&self) -> f64;

    /// Multiplies both components by a real factor.
    fn scale_by(&self, factor: f64) -> Self;

    /// Divides `self` by `divisor`, failing when the divisor is (nearly)
    /// zero or the quotient is not finite.
    fn checked_div(&self, divisor: Self) -> Result<Self, Error>;

    fn is_finite_phasor(&self) -> bool;
}

impl PhasorOps for Complex64 {
    fn from_polar_deg(magnitude: f64, angle_deg: f64) -> Self {
        Complex64::from_polar(magnitude, angle_deg.to_radians())
    }

    fn angle_deg(&self) -> f64 {
        self.arg().to_degrees()
    }

    fn scale_by(&self, factor: f64) -> Self {
        Complex64::new(self.re * factor, self.im * factor)
    }

    fn checked_div(&self, divisor: Self) -> Result<Self, Error> {
        let magnitude = divisor.norm();
        if !magnitude.is_finite() || magnitude < MIN_DIVISOR {
            return Err(Error::division_by_zero(format!(
                "Divisor magnitude {magnitude} is too small."
            )));
        }
        let quotient = *self / divisor;
        if !quotient.is_finite_phasor() {
            return Err(Error::division_by_zero(format!(
                "Quotient of {self} / {divisor} is not finite."
            )));
        }
        Ok(quotient)
    }

    fn is_finite_phasor(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Returns the unit phasor of the given phase.
pub fn phase_unit(phase: Phase) -> Phasor {
    Phasor::from_polar_deg(1.0, phase.angle_deg())
}

/// Rotates a phase-A phasor onto the given phase.
pub fn rotate_to_phase(value: Phasor, phase: Phase) -> Phasor {
    value * phase_unit(phase)
}

/// Kirchhoff sum of three phase phasors, e.g. the neutral current of three
/// phase currents.
pub fn neutral_sum(values: &[Phasor; 3]) -> Phasor {
    values[0] + values[1] + values[2]
}
