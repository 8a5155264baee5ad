use rust_decimal::Decimal;
use tracing::info;

use super::error::{Result, ScheduleError};
use super::forecast::Forecaster;
use super::ledger::{count_yield, naive_yield};
use super::scheduler::Scheduler;
use super::types::{DayResult, Inputs, ScheduleResult};

#[derive(Debug, Clone, Copy)]
struct DayTrace {
    value: Decimal,
    trend_value: Decimal,
    days_remaining: u32,
    prediction: Option<Decimal>,
    sold: Decimal,
    remaining_after: Decimal,
}

/// Runs one full horizon: one `today`/`sell` pair per observed value, then
/// books the proceeds against the naive baseline.
pub fn run_schedule(inputs: &Inputs) -> Result<ScheduleResult> {
    let mut forecaster = Forecaster::new(
        inputs.lower_bound,
        inputs.upper_bound,
        inputs.horizon,
        inputs.value_model,
    )?;
    let values = observed_values(inputs, &mut forecaster)?;

    let mut scheduler = Scheduler::new(forecaster, inputs.quantity, inputs.limit_mode)?;
    if let Some(p) = inputs.risk_exponent {
        scheduler = scheduler.with_risk_exponent(p)?;
    }

    let mut trace = Vec::with_capacity(values.len());
    for value in values {
        let trend_value = scheduler.forecaster().trend().current()?;
        let days_remaining = scheduler.days_remaining();
        // Bounded sales are sized against the original holding.
        let sold = scheduler.today(value)?.min(scheduler.remaining());
        let prediction = scheduler.last_prediction();
        scheduler.sell(sold, value)?;
        trace.push(DayTrace {
            value,
            trend_value,
            days_remaining,
            prediction,
            sold,
            remaining_after: scheduler.remaining(),
        });
    }

    let report = count_yield(scheduler.sell_history(), scheduler.value_history())?;
    let naive_proceeds = naive_yield(scheduler.original(), scheduler.value_history())?;

    let days = trace
        .iter()
        .zip(report.yields.iter().zip(&report.running_totals))
        .enumerate()
        .map(|(day, (point, (proceeds, running_total)))| DayResult {
            day: day as u32,
            value: point.value,
            trend_value: point.trend_value,
            days_remaining: point.days_remaining,
            prediction: point.prediction,
            sold: point.sold,
            remaining_after: point.remaining_after,
            proceeds: *proceeds,
            running_total: *running_total,
        })
        .collect();

    let advantage = report
        .total
        .checked_sub(naive_proceeds)
        .ok_or(ScheduleError::Overflow("advantage"))?;
    let result = ScheduleResult {
        original: scheduler.original(),
        horizon: inputs.horizon,
        remaining: scheduler.remaining(),
        total_proceeds: report.total,
        naive_proceeds,
        advantage,
        days,
    };
    info!(
        horizon = result.horizon,
        total = %result.total_proceeds,
        naive = %result.naive_proceeds,
        remaining = %result.remaining,
        "schedule complete"
    );
    Ok(result)
}

fn observed_values(inputs: &Inputs, forecaster: &mut Forecaster) -> Result<Vec<Decimal>> {
    match &inputs.observed_values {
        Some(values) => {
            if values.len() != inputs.horizon as usize {
                return Err(ScheduleError::ObservedLength {
                    expected: inputs.horizon as usize,
                    actual: values.len(),
                });
            }
            Ok(values.clone())
        }
        None => forecaster.synthesize_path(),
    }
}
