// SPDX-License-Identifier: Apache-2.0

//! Conversion of raw samples into physical units.
//!
//! Calibrations are stateless: the acquisition core only ever stores raw samples, and the
//! formatter applies the channel's [`Calibration`] on the way out.

use core::fmt;

use crate::config::{MAX_CHANNELS, MAX_THRESHOLD};

/// 0 °C in kelvin
const KELVIN_OFFSET: f32 = 273.15;

/// Transform from a raw 10-bit sample to a physical value
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Calibration {
    /// Output the raw value unchanged
    #[default]
    None,
    /// `a0 + a1*x + a2*x^2 + a3*x^3`
    Polynomial([f32; 4]),
    /// NTC thermistor to ground with a series resistor to the ADC reference, result in °C
    Thermistor {
        /// Series resistor, in ohms
        series_ohms: f32,
        /// Beta coefficient, in kelvin
        beta: f32,
        /// Thermistor resistance at `nominal_celsius`, in ohms
        nominal_ohms: f32,
        /// Reference temperature of `nominal_ohms`, in °C
        nominal_celsius: f32,
    },
}

impl Calibration {
    /// Apply the transform to a raw sample
    pub fn apply(&self, raw: u16) -> f32 {
        let x = f32::from(raw);
        match *self {
            Calibration::None => x,
            Calibration::Polynomial([a0, a1, a2, a3]) => a0 + x * (a1 + x * (a2 + x * a3)),
            Calibration::Thermistor {
                series_ohms,
                beta,
                nominal_ohms,
                nominal_celsius,
            } => {
                // Rails would put the resistance at 0 or infinity
                let x = f32::from(raw.clamp(1, MAX_THRESHOLD - 1));
                let resistance = series_ohms * x / (f32::from(MAX_THRESHOLD) - x);
                let inv_kelvin = 1.0 / (nominal_celsius + KELVIN_OFFSET)
                    + libm::logf(resistance / nominal_ohms) / beta;
                1.0 / inv_kelvin - KELVIN_OFFSET
            }
        }
    }
}

/// Prints the transform in the argument syntax of the `k` command
impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Calibration::None => write!(f, "n"),
            Calibration::Polynomial([a0, a1, a2, a3]) => write!(f, "p {} {} {} {}", a0, a1, a2, a3),
            Calibration::Thermistor {
                series_ohms,
                beta,
                nominal_ohms,
                nominal_celsius,
            } => write!(
                f,
                "t {} {} {} {}",
                series_ohms, beta, nominal_ohms, nominal_celsius
            ),
        }
    }
}

/// One [`Calibration`] per input channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationTable([Calibration; MAX_CHANNELS]);

impl CalibrationTable {
    /// All channels uncalibrated
    pub const fn new() -> Self {
        Self([Calibration::None; MAX_CHANNELS])
    }

    /// Calibration of `channel` ([`Calibration::None`] for unknown channels)
    pub fn get(&self, channel: usize) -> Calibration {
        self.0.get(channel).copied().unwrap_or_default()
    }

    /// Replace the calibration of `channel`. Returns `false` for unknown channels.
    pub fn set(&mut self, channel: usize, calibration: Calibration) -> bool {
        match self.0.get_mut(channel) {
            Some(slot) => {
                *slot = calibration;
                true
            }
            None => false,
        }
    }

    /// Apply the calibration of `channel` to `raw`
    pub fn apply(&self, channel: usize, raw: u16) -> f32 {
        self.get(channel).apply(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn polynomial_uses_all_terms() {
        let cal = Calibration::Polynomial([1.0, 0.5, 0.25, 0.125]);
        assert!(close(cal.apply(0), 1.0));
        assert!(close(cal.apply(2), 1.0 + 1.0 + 1.0 + 1.0));
        let volts = Calibration::Polynomial([0.0, 3.3 / 1023.0, 0.0, 0.0]);
        assert!(close(volts.apply(1023), 3.3));
    }

    #[test]
    fn thermistor_reads_nominal_at_midscale() {
        let cal = Calibration::Thermistor {
            series_ohms: 10_000.0,
            beta: 3950.0,
            nominal_ohms: 10_000.0,
            nominal_celsius: 25.0,
        };
        // 511.5 would be exact; 512 is a hair above the nominal resistance, so a hair colder
        let t = cal.apply(512);
        assert!(t < 25.0 && t > 24.8, "got {}", t);
        // Higher resistance (higher reading) means colder for an NTC
        assert!(cal.apply(800) < cal.apply(200));
        assert!(cal.apply(0).is_finite());
        assert!(cal.apply(1023).is_finite());
    }

    #[test]
    fn table_ignores_unknown_channels() {
        let mut table = CalibrationTable::new();
        assert!(table.set(5, Calibration::Polynomial([1.0, 0.0, 0.0, 0.0])));
        assert!(!table.set(6, Calibration::None));
        assert!(close(table.apply(5, 700), 1.0));
        assert!(close(table.apply(9, 700), 700.0));
        assert_eq!(Calibration::default(), Calibration::None);
    }
}
