use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Scale of every stored or reported monetary quantity.
pub const MONEY_SCALE: u32 = 2;

/// Longest horizon a run accepts, in days.
pub const MAX_HORIZON: u32 = 100_000;

/// Half-up rounding to the monetary scale.
pub fn round_money(value: Decimal) -> Decimal {
    round_half_up(value, MONEY_SCALE)
}

/// Half-up rounding that also pads to exactly `scale` digits.
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LimitMode {
    Bounded,
    Flex,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueModel {
    Mean,
    Rand {
        noise_amplitude: Decimal,
        seed: u64,
    },
}

#[derive(Debug, Clone)]
pub struct Inputs {
    pub quantity: Decimal,
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    pub horizon: u32,
    pub value_model: ValueModel,
    pub limit_mode: LimitMode,
    pub risk_exponent: Option<f64>,
    pub observed_values: Option<Vec<Decimal>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayResult {
    pub day: u32,
    pub value: Decimal,
    pub trend_value: Decimal,
    pub days_remaining: u32,
    pub prediction: Option<Decimal>,
    pub sold: Decimal,
    pub remaining_after: Decimal,
    pub proceeds: Decimal,
    pub running_total: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    pub original: Decimal,
    pub horizon: u32,
    pub remaining: Decimal,
    pub total_proceeds: Decimal,
    pub naive_proceeds: Decimal,
    pub advantage: Decimal,
    pub days: Vec<DayResult>,
}
