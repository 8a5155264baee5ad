//! Daily sell-amount scheduling.
//!
//! A [`Scheduler`] owns one [`Forecaster`] for the whole run. Each day the
//! caller asks [`Scheduler::today`] how much to sell at the observed value,
//! then commits the sale with [`Scheduler::sell`]. Only `sell` moves state
//! forward: it records the day, reduces the holding and, in flex mode,
//! counts down the remaining days and advances the forecaster's trend.

use rust_decimal::Decimal;
use tracing::debug;

use super::error::{Result, ScheduleError};
use super::forecast::{Forecaster, float_to_money, money_to_float};
use super::types::{LimitMode, round_money};

impl LimitMode {
    /// Sell amount and the forecast mean it was sized against.
    fn rate(self, scheduler: &Scheduler, value: Decimal) -> Result<(Decimal, Decimal)> {
        match self {
            LimitMode::Bounded => scheduler.bounded_rate(value),
            LimitMode::Flex => scheduler.flex_rate(value),
        }
    }

    fn counts_down(self) -> bool {
        matches!(self, LimitMode::Flex)
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    forecaster: Forecaster,
    original: Decimal,
    remaining: Decimal,
    days_remaining: u32,
    days_completed: u32,
    limit_mode: LimitMode,
    bounded_mean: Decimal,
    risk_exponent: Option<f64>,
    sell_history: Vec<Decimal>,
    value_history: Vec<Decimal>,
    last_prediction: Option<Decimal>,
}

impl Scheduler {
    pub fn new(forecaster: Forecaster, quantity: Decimal, limit_mode: LimitMode) -> Result<Self> {
        if quantity < Decimal::ZERO {
            return Err(ScheduleError::InvalidQuantity(quantity));
        }
        let horizon = forecaster.horizon();
        let bounded_mean = forecaster.bounded_mean();
        Ok(Self {
            forecaster,
            original: quantity,
            remaining: quantity,
            days_remaining: horizon - 1,
            days_completed: 0,
            limit_mode,
            bounded_mean,
            risk_exponent: None,
            sell_history: Vec::with_capacity(horizon as usize),
            value_history: Vec::with_capacity(horizon as usize),
            last_prediction: None,
        })
    }

    /// Weight flex sales by `(value / trend)^p`. `p = 0` disables weighting.
    ///
    /// Only the flex formula reads the exponent. A bounded scheduler stores it
    /// but sizes its sales without it.
    pub fn with_risk_exponent(mut self, p: f64) -> Result<Self> {
        if !p.is_finite() {
            return Err(ScheduleError::NonFinite("risk exponent"));
        }
        self.risk_exponent = Some(p);
        Ok(self)
    }

    pub fn forecaster(&self) -> &Forecaster {
        &self.forecaster
    }

    pub fn original(&self) -> Decimal {
        self.original
    }

    pub fn remaining(&self) -> Decimal {
        self.remaining
    }

    pub fn days_remaining(&self) -> u32 {
        self.days_remaining
    }

    pub fn days_completed(&self) -> u32 {
        self.days_completed
    }

    pub fn limit_mode(&self) -> LimitMode {
        self.limit_mode
    }

    pub fn risk_exponent(&self) -> Option<f64> {
        self.risk_exponent
    }

    pub fn sell_history(&self) -> &[Decimal] {
        &self.sell_history
    }

    pub fn value_history(&self) -> &[Decimal] {
        &self.value_history
    }

    pub fn last_prediction(&self) -> Option<Decimal> {
        self.last_prediction
    }

    pub fn is_exhausted(&self) -> bool {
        self.days_completed >= self.forecaster.horizon()
    }

    /// Amount to sell today at `value`. Leaves the holding, the histories
    /// and the day count untouched.
    pub fn today(&mut self, value: Decimal) -> Result<Decimal> {
        self.ensure_open()?;
        if value < Decimal::ZERO {
            return Err(ScheduleError::InvalidValue(value));
        }

        let mode = self.limit_mode;
        let (amount, prediction) = mode.rate(self, value)?;
        self.last_prediction = Some(prediction);

        debug!(
            day = self.days_completed,
            days_remaining = self.days_remaining,
            %value,
            %prediction,
            %amount,
            "sized daily sale"
        );
        Ok(amount)
    }

    /// Commits a sale. Rejected sales leave every piece of state unchanged.
    pub fn sell(&mut self, amount: Decimal, value: Decimal) -> Result<()> {
        self.ensure_open()?;
        if amount < Decimal::ZERO {
            return Err(ScheduleError::InvalidAmount(amount));
        }
        if amount > self.remaining {
            return Err(ScheduleError::Overdraw {
                requested: amount,
                remaining: self.remaining,
            });
        }

        if self.limit_mode.counts_down() && self.days_remaining > 0 {
            self.forecaster.advance_trend()?;
            self.days_remaining -= 1;
        }

        self.sell_history.push(amount);
        self.value_history.push(value);
        self.remaining -= amount;
        self.days_completed += 1;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_exhausted() {
            return Err(ScheduleError::ExhaustedHorizon {
                horizon: self.forecaster.horizon(),
            });
        }
        Ok(())
    }

    // Sized against the original holding with `days_remaining` fixed at
    // `horizon - 1`, so a run sells `horizon * v / (v + range * (horizon - 1))`
    // of the holding at a constant value `v`. That is all of it exactly when
    // `v` equals the range width; below it a residue stays unsold, above it
    // the engine's clamp ends the run early.
    fn bounded_rate(&self, value: Decimal) -> Result<(Decimal, Decimal)> {
        let denominator = self
            .bounded_mean
            .checked_mul(Decimal::from(self.days_remaining))
            .and_then(|future| value.checked_add(future))
            .ok_or(ScheduleError::Overflow("bounded denominator"))?;
        if denominator <= Decimal::ZERO {
            return Err(ScheduleError::DegenerateForecast(format!(
                "bounded denominator {denominator} is not positive"
            )));
        }
        let amount = share_of(value, denominator, self.original, "bounded sale")?;
        Ok((amount, self.bounded_mean))
    }

    fn flex_rate(&self, value: Decimal) -> Result<(Decimal, Decimal)> {
        let prediction = self.forecaster.line_mean(self.days_remaining)?;
        if self.days_remaining == 0 {
            return Ok((self.remaining, prediction));
        }

        let weighted = self.weighted_value(value)?;
        let denominator = prediction
            .checked_mul(Decimal::from(self.days_remaining))
            .and_then(|future| weighted.checked_add(future))
            .ok_or(ScheduleError::Overflow("flex denominator"))?;
        if denominator <= Decimal::ZERO {
            return Err(ScheduleError::DegenerateForecast(format!(
                "flex denominator {denominator} is not positive"
            )));
        }
        let amount = share_of(weighted, denominator, self.remaining, "flex sale")?;
        Ok((amount, prediction))
    }

    fn weighted_value(&self, value: Decimal) -> Result<Decimal> {
        let Some(p) = self.risk_exponent else {
            return Ok(value);
        };
        let expected = self.forecaster.trend().current()?;
        if expected <= Decimal::ZERO {
            return Err(ScheduleError::DegenerateForecast(format!(
                "trend value {expected} is not positive"
            )));
        }

        let observed = money_to_float(value, "risk weighting")?;
        let ratio = observed / money_to_float(expected, "risk weighting")?;
        float_to_money(observed * ratio.powf(p), "risk weighting")
    }
}

/// `round2(part / whole * holding)`.
fn share_of(
    part: Decimal,
    whole: Decimal,
    holding: Decimal,
    what: &'static str,
) -> Result<Decimal> {
    part.checked_div(whole)
        .and_then(|fraction| fraction.checked_mul(holding))
        .map(round_money)
        .ok_or(ScheduleError::Overflow(what))
}
