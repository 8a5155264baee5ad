//! Proceeds bookkeeping for a finished schedule.

use rust_decimal::Decimal;
use serde::Serialize;

use super::error::{Result, ScheduleError};
use super::types::round_half_up;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YieldReport {
    pub yields: Vec<Decimal>,
    pub running_totals: Vec<Decimal>,
    pub total: Decimal,
}

/// Per-day proceeds `value * sold`, rounded half-up to the value's scale.
pub fn count_yield(sell_history: &[Decimal], value_history: &[Decimal]) -> Result<YieldReport> {
    if sell_history.len() != value_history.len() {
        return Err(ScheduleError::LengthMismatch {
            sells: sell_history.len(),
            values: value_history.len(),
        });
    }

    let mut yields = Vec::with_capacity(sell_history.len());
    let mut running_totals = Vec::with_capacity(sell_history.len());
    let mut total = Decimal::new(0, 2);
    for (sold, value) in sell_history.iter().zip(value_history) {
        let proceeds = value
            .checked_mul(*sold)
            .map(|p| round_half_up(p, value.scale()))
            .ok_or(ScheduleError::Overflow("daily proceeds"))?;
        total = total
            .checked_add(proceeds)
            .ok_or(ScheduleError::Overflow("running total"))?;
        yields.push(proceeds);
        running_totals.push(total);
    }

    Ok(YieldReport {
        yields,
        running_totals,
        total,
    })
}

/// Baseline of selling the whole original holding at the final value.
pub fn naive_yield(original: Decimal, value_history: &[Decimal]) -> Result<Decimal> {
    let last = value_history.last().ok_or(ScheduleError::EmptySeries)?;
    original
        .checked_mul(*last)
        .map(|p| round_half_up(p, last.scale()))
        .ok_or(ScheduleError::Overflow("naive proceeds"))
}
