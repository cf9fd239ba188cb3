//! Static per-parameter bounds for the tracked turbine telemetry.
//!
//! Every parameter the generator produces has exactly one [`ParameterRange`]
//! with `min < typical < max`. The table is immutable and shared by every
//! generator instance.

use serde::{Deserialize, Serialize};

// ---

/// One tracked physical parameter of a turbine.
///
/// The declaration order is the generation order used by the bounded walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    OutputPower,
    RotorRpm,
    MaxPowerLimit,
    Voltage,
    Current,
    PowerFactor,
}

impl Parameter {
    /// All tracked parameters in generation order.
    pub const ALL: [Parameter; 6] = [
        Parameter::OutputPower,
        Parameter::RotorRpm,
        Parameter::MaxPowerLimit,
        Parameter::Voltage,
        Parameter::Current,
        Parameter::PowerFactor,
    ];

    /// Wire/column name of the parameter.
    pub fn name(self) -> &'static str {
        // ---
        match self {
            Parameter::OutputPower => "output_power",
            Parameter::RotorRpm => "rotor_rpm",
            Parameter::MaxPowerLimit => "max_power_limit",
            Parameter::Voltage => "voltage",
            Parameter::Current => "current",
            Parameter::PowerFactor => "power_factor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Number of decimals kept when a generated value is emitted.
    pub fn decimals(self) -> i32 {
        // ---
        match self {
            Parameter::PowerFactor => 3,
            Parameter::OutputPower | Parameter::MaxPowerLimit | Parameter::Current => 1,
            Parameter::Voltage => 0,
            Parameter::RotorRpm => 2,
        }
    }

    /// Static bounds for this parameter.
    pub fn range(self) -> &'static ParameterRange {
        // ---
        RANGES
            .iter()
            .find(|r| r.parameter == self)
            .unwrap_or(&RANGES[0])
    }
}

/// Bounds, unit and typical operating value of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub parameter: Parameter,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
    pub typical: f64,
}

static RANGES: [ParameterRange; 6] = [
    ParameterRange {
        parameter: Parameter::OutputPower,
        min: 0.0,
        max: 15_000.0,
        unit: "kW",
        typical: 8_000.0,
    },
    ParameterRange {
        parameter: Parameter::RotorRpm,
        min: 0.0,
        max: 30.0,
        unit: "RPM",
        typical: 15.0,
    },
    ParameterRange {
        parameter: Parameter::MaxPowerLimit,
        min: 7_000.0,
        max: 14_000.0,
        unit: "kW",
        typical: 12_000.0,
    },
    ParameterRange {
        parameter: Parameter::Voltage,
        min: 400.0,
        max: 690.0,
        unit: "V",
        typical: 630.0,
    },
    ParameterRange {
        parameter: Parameter::Current,
        min: 0.0,
        max: 5_000.0,
        unit: "A",
        typical: 2_000.0,
    },
    ParameterRange {
        parameter: Parameter::PowerFactor,
        min: 0.80,
        max: 0.95,
        unit: "",
        typical: 0.90,
    },
];

/// The full range table, one entry per [`Parameter`].
pub fn all_ranges() -> &'static [ParameterRange] {
    &RANGES
}

/// Round `value` to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    // ---
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_typical_is_strictly_inside_range() {
        // ---
        for r in all_ranges() {
            assert!(r.min < r.typical, "{:?} typical below min", r.parameter);
            assert!(r.typical < r.max, "{:?} typical above max", r.parameter);
        }
    }

    #[test]
    fn test_every_parameter_has_its_own_range() {
        // ---
        for p in Parameter::ALL {
            assert_eq!(p.range().parameter, p);
        }
    }

    #[test]
    fn test_name_lookup() {
        // ---
        assert_eq!(Parameter::from_name("power_factor"), Some(Parameter::PowerFactor));
        assert_eq!(Parameter::from_name("wind_speed"), None);
        assert_eq!(Parameter::MaxPowerLimit.name(), "max_power_limit");
    }

    #[test]
    fn test_rounding() {
        // ---
        assert_eq!(round_to(15.789_473, 2), 15.79);
        assert_eq!(round_to(631.6, 0), 632.0);
        assert_eq!(round_to(0.912_49, 3), 0.912);
    }
}
