//! Bounded random-walk telemetry generator.
//!
//! Each generator owns the walk memory of exactly one device. Successive
//! readings move at most ±10% from the previous value and never leave the
//! parameter's static range. After the independent draws two physical
//! corrections are applied: current is pulled toward the three-phase value
//! implied by power, voltage and power factor, and the power limit is kept
//! at or above the output power.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::RawReading;
use crate::ranges::{round_to, Parameter, ParameterRange};

// ---

/// Largest relative move between two consecutive readings.
pub const MAX_VARIATION: f64 = 0.1;

/// Spread of the initial state around each typical value.
const INITIAL_SPREAD: f64 = 0.2;

pub const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Walk memory for one device. Mutated only by its owning generator.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub device_id: String,
    pub previous_values: BTreeMap<Parameter, f64>,
}

impl DeviceState {
    /// State with no memory; the first step draws from the full ranges.
    pub fn empty(device_id: impl Into<String>) -> Self {
        DeviceState {
            device_id: device_id.into(),
            previous_values: BTreeMap::new(),
        }
    }

    /// State seeded near each parameter's typical value (±20%, clamped).
    pub fn seeded<R: Rng>(device_id: impl Into<String>, rng: &mut R) -> Self {
        // ---
        let previous_values = Parameter::ALL
            .into_iter()
            .map(|p| {
                let range = p.range();
                let spread = range.typical * INITIAL_SPREAD;
                let v = rng.gen_range(range.typical - spread..=range.typical + spread);
                (p, v.clamp(range.min, range.max))
            })
            .collect();

        DeviceState {
            device_id: device_id.into(),
            previous_values,
        }
    }
}

/// Next walk value for one parameter.
///
/// With a previous value `p` the draw is uniform over
/// `[max(min, 0.9p), min(max, 1.1p)]`. A previous value already outside the
/// range collapses that interval, so it is clamped back into the range.
pub fn walk_next<R: Rng>(range: &ParameterRange, previous: Option<f64>, rng: &mut R) -> f64 {
    // ---
    let Some(prev) = previous else {
        return rng.gen_range(range.min..=range.max);
    };

    let lo = range.min.max(prev * (1.0 - MAX_VARIATION));
    let hi = range.max.min(prev * (1.0 + MAX_VARIATION));
    if lo > hi {
        return prev.clamp(range.min, range.max);
    }
    rng.gen_range(lo..=hi)
}

/// Current implied by a balanced three-phase load: `P·1000 / (U·pf·√3)`.
pub fn three_phase_current(power_kw: f64, voltage: f64, power_factor: f64) -> Option<f64> {
    // ---
    let denominator = voltage * power_factor * SQRT_3;
    (denominator > 0.0).then(|| power_kw * 1000.0 / denominator)
}

/// Average the drawn current with the three-phase current, rounded to 0.1 A.
pub fn correlate_current(drawn: f64, power_kw: f64, voltage: f64, power_factor: f64) -> f64 {
    // ---
    match three_phase_current(power_kw, voltage, power_factor) {
        Some(calculated) => round_to((drawn + calculated) / 2.0, 1),
        None => drawn,
    }
}

/// Produces readings for one device as a bounded random walk.
#[derive(Debug)]
pub struct BoundedWalkGenerator {
    state: DeviceState,
    rng: StdRng,
}

impl BoundedWalkGenerator {
    // ---
    pub fn new(device_id: impl Into<String>) -> Self {
        Self::from_rng(device_id, StdRng::from_entropy())
    }

    /// Deterministic generator for tests and reproducible simulations.
    pub fn with_seed(device_id: impl Into<String>, seed: u64) -> Self {
        Self::from_rng(device_id, StdRng::seed_from_u64(seed))
    }

    fn from_rng(device_id: impl Into<String>, mut rng: StdRng) -> Self {
        // ---
        let state = DeviceState::seeded(device_id, &mut rng);
        BoundedWalkGenerator { state, rng }
    }

    /// Resume from an existing walk state.
    pub fn from_state(state: DeviceState, seed: Option<u64>) -> Self {
        // ---
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        BoundedWalkGenerator { state, rng }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Generate the next reading stamped with the current time.
    pub fn step(&mut self) -> RawReading {
        self.step_at(Utc::now())
    }

    /// Generate the next reading stamped with `timestamp`.
    pub fn step_at(&mut self, timestamp: DateTime<Utc>) -> RawReading {
        // ---
        let mut values = BTreeMap::new();
        for p in Parameter::ALL {
            let prev = self.state.previous_values.get(&p).copied();
            let v = walk_next(p.range(), prev, &mut self.rng);
            values.insert(p, round_to(v, p.decimals()));
        }

        self.apply_physical_constraints(&mut values);

        // Walk memory holds the emitted values, corrections included.
        self.state.previous_values.extend(values.iter().map(|(p, v)| (*p, *v)));

        RawReading::new(self.state.device_id.clone(), timestamp, values)
    }

    fn apply_physical_constraints(&mut self, values: &mut BTreeMap<Parameter, f64>) {
        // ---
        let power = values[&Parameter::OutputPower];
        let voltage = values[&Parameter::Voltage];
        let power_factor = values[&Parameter::PowerFactor];

        if let Some(current) = values.get_mut(&Parameter::Current) {
            *current = correlate_current(*current, power, voltage, power_factor);
        }

        if let Some(limit) = values.get_mut(&Parameter::MaxPowerLimit) {
            if *limit < power {
                *limit = round_to(power * self.rng.gen_range(1.1..=1.3), 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    fn emitted(reading: &RawReading, p: Parameter) -> f64 {
        reading.numeric(p).unwrap()
    }

    #[test]
    fn test_walk_stays_within_ten_percent_and_range() {
        // ---
        let mut rng = StdRng::seed_from_u64(7);
        for p in Parameter::ALL {
            let range = p.range();
            let mut prev = range.typical;
            for _ in 0..500 {
                let v = walk_next(range, Some(prev), &mut rng);
                assert!(v >= range.min && v <= range.max, "{p:?} left range: {v}");
                assert!(v >= prev * 0.9 - 1e-9, "{p:?} dropped more than 10%");
                assert!(v <= prev * 1.1 + 1e-9, "{p:?} rose more than 10%");
                prev = v;
            }
        }
    }

    #[test]
    fn test_walk_clamps_at_range_edges() {
        // ---
        let mut rng = StdRng::seed_from_u64(11);
        let range = Parameter::PowerFactor.range();
        for _ in 0..200 {
            let v = walk_next(range, Some(0.95), &mut rng);
            assert!(v <= 0.95 && v >= 0.855);
        }
    }

    #[test]
    fn test_walk_recovers_from_out_of_range_previous() {
        // ---
        let mut rng = StdRng::seed_from_u64(3);
        let range = Parameter::MaxPowerLimit.range();
        assert_eq!(walk_next(range, Some(19_500.0), &mut rng), 14_000.0);
        let current = Parameter::Current.range();
        assert_eq!(walk_next(current, Some(16_000.0), &mut rng), 5_000.0);
    }

    #[test]
    fn test_walk_without_history_uses_full_range() {
        // ---
        let mut rng = StdRng::seed_from_u64(5);
        let range = Parameter::Voltage.range();
        for _ in 0..200 {
            let v = walk_next(range, None, &mut rng);
            assert!((range.min..=range.max).contains(&v));
        }
    }

    #[test]
    fn test_current_correlation() {
        // ---
        let (drawn, p, u, pf) = (2100.0, 8000.0, 630.0, 0.9);
        let expected = round_to((drawn + (p * 1000.0) / (u * pf * SQRT_3)) / 2.0, 1);
        assert_eq!(correlate_current(drawn, p, u, pf), expected);
        // 8000 kW at 630 V, pf 0.9 → ~8146 A; averaged with 2100 A
        assert!((expected - 5123.1).abs() < 0.2);
    }

    #[test]
    fn test_current_correlation_guards_zero_denominator() {
        // ---
        assert_eq!(three_phase_current(100.0, 0.0, 0.9), None);
        assert_eq!(correlate_current(42.0, 100.0, 0.0, 0.9), 42.0);
    }

    #[test]
    fn test_current_correlation_applies_at_zero_power() {
        // ---
        // Idle turbine: the formula still averages with a 0 A load current
        assert_eq!(three_phase_current(0.0, 690.0, 0.95), Some(0.0));
        assert_eq!(correlate_current(1500.0, 0.0, 690.0, 0.95), 750.0);
    }

    #[test]
    fn test_power_limit_never_below_output_power() {
        // ---
        let mut generator = BoundedWalkGenerator::with_seed("TURBINE_001", 42);
        for _ in 0..1000 {
            let r = generator.step_at(ts());
            assert!(
                emitted(&r, Parameter::MaxPowerLimit) >= emitted(&r, Parameter::OutputPower),
                "power limit below output power: {r:?}"
            );
        }
    }

    #[test]
    fn test_power_limit_correction_when_state_forces_violation() {
        // ---
        let mut state = DeviceState::empty("TURBINE_002");
        state.previous_values.insert(Parameter::OutputPower, 14_900.0);
        state.previous_values.insert(Parameter::MaxPowerLimit, 7_000.0);
        let mut generator = BoundedWalkGenerator::from_state(state, Some(9));

        let r = generator.step_at(ts());
        let power = emitted(&r, Parameter::OutputPower);
        let limit = emitted(&r, Parameter::MaxPowerLimit);
        assert!(limit >= power * 1.1 - 0.05 && limit <= power * 1.3 + 0.05);
    }

    #[test]
    fn test_step_persists_emitted_values() {
        // ---
        let mut generator = BoundedWalkGenerator::with_seed("TURBINE_003", 1);
        let r = generator.step_at(ts());
        for p in Parameter::ALL {
            assert_eq!(generator.state().previous_values[&p], emitted(&r, p));
        }
    }

    #[test]
    fn test_rounding_is_applied_per_parameter() {
        // ---
        let mut generator = BoundedWalkGenerator::with_seed("TURBINE_004", 2);
        for _ in 0..50 {
            let r = generator.step_at(ts());
            for p in Parameter::ALL {
                let v = emitted(&r, p);
                assert_eq!(round_to(v, p.decimals()), v, "{p:?} not rounded: {v}");
            }
        }
    }

    #[test]
    fn test_seeded_generators_are_reproducible() {
        // ---
        let mut a = BoundedWalkGenerator::with_seed("TURBINE_005", 99);
        let mut b = BoundedWalkGenerator::with_seed("TURBINE_005", 99);
        for _ in 0..10 {
            assert_eq!(a.step_at(ts()), b.step_at(ts()));
        }
    }

    #[test]
    fn test_initial_state_near_typical() {
        // ---
        let mut rng = StdRng::seed_from_u64(8);
        let state = DeviceState::seeded("TURBINE_006", &mut rng);
        for (p, v) in &state.previous_values {
            let range = p.range();
            assert!(*v >= range.min && *v <= range.max);
            assert!((v - range.typical).abs() <= range.typical * 0.2 + 1e-9);
        }
        assert_eq!(state.previous_values.len(), Parameter::ALL.len());
    }
}
