//! Value forecasting and synthetic market paths.
//!
//! The forecaster models the asset value as a straight line from the lower
//! to the upper bound across the horizon. In `Rand` mode the synthesized
//! path adds uniform noise around that line; the forecast means themselves
//! are always taken from the noiseless line.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::error::{Result, ScheduleError};
use super::types::{MAX_HORIZON, MONEY_SCALE, ValueModel, round_half_up, round_money};

/// A pure linear trend, `origin + increment * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendLine {
    origin: Decimal,
    increment: Decimal,
}

impl TrendLine {
    pub fn new(origin: Decimal, increment: Decimal) -> Self {
        Self { origin, increment }
    }

    /// Line that starts at `lower` on step 0 and reaches `upper` on step
    /// `steps - 1`. A single-step line is flat.
    pub fn between(lower: Decimal, upper: Decimal, steps: u32) -> Result<Self> {
        let increment = if steps <= 1 {
            Decimal::ZERO
        } else {
            upper
                .checked_sub(lower)
                .ok_or(ScheduleError::Overflow("trend increment"))?
                / Decimal::from(steps - 1)
        };
        Ok(Self::new(lower, increment))
    }

    pub fn origin(&self) -> Decimal {
        self.origin
    }

    pub fn increment(&self) -> Decimal {
        self.increment
    }

    pub fn value_at(&self, step: u32) -> Result<Decimal> {
        self.increment
            .checked_mul(Decimal::from(step))
            .and_then(|offset| self.origin.checked_add(offset))
            .map(round_money)
            .ok_or(ScheduleError::Overflow("trend value"))
    }

    pub fn cursor(self) -> TrendCursor {
        TrendCursor {
            line: self,
            step: 0,
        }
    }
}

/// Forward-only position on a [`TrendLine`].
///
/// As an iterator it yields `(step, value)` starting at step 0 and stops
/// once a value no longer fits in a `Decimal`. `advance` moves one step
/// forward and returns the point it lands on.
#[derive(Debug, Clone)]
pub struct TrendCursor {
    line: TrendLine,
    step: u32,
}

impl TrendCursor {
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn current(&self) -> Result<Decimal> {
        self.line.value_at(self.step)
    }

    pub fn increment(&self) -> Decimal {
        self.line.increment()
    }

    /// The cursor only moves when the next value is representable.
    pub fn advance(&mut self) -> Result<(u32, Decimal)> {
        let step = self.step.saturating_add(1);
        let value = self.line.value_at(step)?;
        self.step = step;
        Ok((step, value))
    }
}

impl Iterator for TrendCursor {
    type Item = (u32, Decimal);

    fn next(&mut self) -> Option<Self::Item> {
        let point = (self.step, self.current().ok()?);
        self.step = self.step.checked_add(1)?;
        Some(point)
    }
}

/// Sum divided by count, rounded half-up to the widest input scale (never
/// below the monetary scale).
pub fn arithmetic_mean(values: &[Decimal]) -> Result<Decimal> {
    if values.is_empty() {
        return Err(ScheduleError::EmptySeries);
    }
    let scale = values
        .iter()
        .map(Decimal::scale)
        .max()
        .unwrap_or(0)
        .max(MONEY_SCALE);
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or(ScheduleError::Overflow("arithmetic mean"))?;
    Ok(round_half_up(sum / Decimal::from(values.len()), scale))
}

/// Rounding boundary between the float tier and the decimal tier.
pub(crate) fn float_to_money(value: f64, what: &'static str) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(ScheduleError::NonFinite(what));
    }
    Decimal::from_f64(value)
        .map(round_money)
        .ok_or(ScheduleError::NonFinite(what))
}

pub(crate) fn money_to_float(value: Decimal, what: &'static str) -> Result<f64> {
    value
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or(ScheduleError::NonFinite(what))
}

#[derive(Debug, Clone)]
pub struct Forecaster {
    lower_bound: Decimal,
    upper_bound: Decimal,
    range: Decimal,
    horizon: u32,
    model: ValueModel,
    line: TrendLine,
    trend: TrendCursor,
    path: TrendCursor,
    rng: Rng,
}

impl Forecaster {
    pub fn new(
        lower_bound: Decimal,
        upper_bound: Decimal,
        horizon: u32,
        model: ValueModel,
    ) -> Result<Self> {
        if horizon == 0 {
            return Err(ScheduleError::EmptyHorizon);
        }
        if horizon > MAX_HORIZON {
            return Err(ScheduleError::HorizonTooLong {
                horizon,
                max: MAX_HORIZON,
            });
        }
        if lower_bound > upper_bound {
            return Err(ScheduleError::InvalidRange {
                lower: lower_bound,
                upper: upper_bound,
            });
        }
        let seed = match model {
            ValueModel::Mean => 0,
            ValueModel::Rand {
                noise_amplitude,
                seed,
            } => {
                if noise_amplitude < Decimal::ZERO {
                    return Err(ScheduleError::InvalidNoise(noise_amplitude));
                }
                seed
            }
        };

        let range = upper_bound
            .checked_sub(lower_bound)
            .ok_or(ScheduleError::Overflow("value range"))?;
        let line = TrendLine::between(lower_bound, upper_bound, horizon)?;
        Ok(Self {
            lower_bound,
            upper_bound,
            range,
            horizon,
            model,
            line,
            trend: line.cursor(),
            path: line.cursor(),
            rng: Rng::new(splitmix64(seed)),
        })
    }

    pub fn lower_bound(&self) -> Decimal {
        self.lower_bound
    }

    pub fn upper_bound(&self) -> Decimal {
        self.upper_bound
    }

    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    pub fn model(&self) -> ValueModel {
        self.model
    }

    pub fn line(&self) -> TrendLine {
        self.line
    }

    /// Cursor consulted by the flex forecast.
    pub fn trend(&self) -> &TrendCursor {
        &self.trend
    }

    pub fn advance_trend(&mut self) -> Result<(u32, Decimal)> {
        self.trend.advance()
    }

    /// Width of the value range. Static for the lifetime of the forecaster.
    pub fn bounded_mean(&self) -> Decimal {
        self.range
    }

    /// Mean of a uniform distribution over the value range.
    pub fn uniform_mean(&self) -> Decimal {
        // lower + range / 2 never exceeds upper.
        round_money(self.lower_bound + self.range / Decimal::TWO)
    }

    /// Mean of the trend over the next `days_remaining` steps from the
    /// current cursor position.
    pub fn line_mean(&self, days_remaining: u32) -> Result<Decimal> {
        let current = self.trend.current()?;
        self.trend
            .increment()
            .checked_mul(Decimal::from(days_remaining))
            .and_then(|span| current.checked_add(span / Decimal::TWO))
            .map(round_money)
            .ok_or(ScheduleError::Overflow("line mean"))
    }

    /// Next `horizon` synthetic values. Each call continues where the last
    /// one stopped and consumes fresh random draws.
    pub fn synthesize_path(&mut self) -> Result<Vec<Decimal>> {
        let mut values = Vec::with_capacity(self.horizon as usize);
        for _ in 0..self.horizon {
            let (_, trend_value) = self
                .path
                .next()
                .ok_or(ScheduleError::Overflow("synthesized path"))?;
            let value = match self.model {
                ValueModel::Mean => trend_value,
                ValueModel::Rand {
                    noise_amplitude, ..
                } => self.with_noise(trend_value, noise_amplitude)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    fn with_noise(&mut self, trend_value: Decimal, amplitude: Decimal) -> Result<Decimal> {
        let base = money_to_float(trend_value, "path synthesis")?;
        let half_width = money_to_float(amplitude, "path synthesis")?;
        let draw = self.rng.next_f64() * 2.0 - 1.0;
        float_to_money(base + half_width * draw, "path synthesis")
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// xorshift64* generator.
#[derive(Debug, Clone)]
struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform draw in the open interval (0, 1).
    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use rust_decimal_macros::dec;

    fn rand_model(seed: u64) -> ValueModel {
        ValueModel::Rand {
            noise_amplitude: dec!(0.50),
            seed,
        }
    }

    #[test]
    fn uniform_mean_is_midpoint_of_bounds() {
        let sim = Forecaster::new(dec!(9.00), dec!(11.00), 5, ValueModel::Mean).unwrap();
        assert_eq!(sim.uniform_mean(), dec!(10.00));
    }

    #[test]
    fn uniform_mean_rounds_half_up() {
        let sim = Forecaster::new(dec!(9.00), dec!(9.01), 5, ValueModel::Mean).unwrap();
        assert_eq!(sim.uniform_mean(), dec!(9.01));
    }

    #[test]
    fn arithmetic_mean_of_eleven_to_nineteen_is_fifteen() {
        let values: Vec<Decimal> = (11..=19).map(Decimal::from).collect();
        let mean = arithmetic_mean(&values).unwrap();
        assert_eq!(mean, dec!(15.00));
        assert_eq!(mean.scale(), 2);
    }

    #[test]
    fn arithmetic_mean_keeps_wider_input_scale() {
        let mean = arithmetic_mean(&[dec!(1.000), dec!(2.001)]).unwrap();
        assert_eq!(mean, dec!(1.501));
        assert_eq!(mean.scale(), 3);
    }

    #[test]
    fn arithmetic_mean_rejects_empty_series() {
        assert_eq!(arithmetic_mean(&[]), Err(ScheduleError::EmptySeries));
    }

    #[test]
    fn line_mean_after_one_step_adds_one_increment_to_uniform_mean() {
        let mut sim = Forecaster::new(dec!(9.00), dec!(12.00), 6, ValueModel::Mean).unwrap();
        assert_eq!(sim.line().increment(), dec!(0.60));

        let (step, value) = sim.advance_trend().unwrap();
        assert_eq!((step, value), (1, dec!(9.60)));

        let mean = sim.line_mean(5).unwrap();
        assert_eq!(mean, dec!(11.10));
        assert_eq!(mean, sim.uniform_mean() + sim.line().increment());
    }

    #[test]
    fn line_mean_on_last_day_is_current_trend_value() {
        let mut sim = Forecaster::new(dec!(9.00), dec!(12.00), 6, ValueModel::Mean).unwrap();
        for _ in 0..5 {
            sim.advance_trend().unwrap();
        }
        assert_eq!(sim.trend().current().unwrap(), dec!(12.00));
        assert_eq!(sim.line_mean(0).unwrap(), dec!(12.00));
    }

    #[test]
    fn bounded_mean_is_range_width() {
        let sim = Forecaster::new(dec!(0.00), dec!(20.00), 10, ValueModel::Mean).unwrap();
        assert_eq!(sim.bounded_mean(), dec!(20.00));
    }

    #[test]
    fn single_step_horizon_has_flat_trend() {
        let sim = Forecaster::new(dec!(9.00), dec!(12.00), 1, ValueModel::Mean).unwrap();
        assert_eq!(sim.line().increment(), Decimal::ZERO);
        assert_eq!(sim.line_mean(0).unwrap(), dec!(9.00));
    }

    #[test]
    fn construction_rejects_inverted_range() {
        let err = Forecaster::new(dec!(12.00), dec!(9.00), 6, ValueModel::Mean).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InvalidRange {
                lower: dec!(12.00),
                upper: dec!(9.00)
            }
        );
    }

    #[test]
    fn construction_rejects_empty_horizon() {
        let err = Forecaster::new(dec!(9.00), dec!(12.00), 0, ValueModel::Mean).unwrap_err();
        assert_eq!(err, ScheduleError::EmptyHorizon);
    }

    #[test]
    fn construction_rejects_horizon_beyond_maximum() {
        let err = Forecaster::new(dec!(9.00), dec!(12.00), MAX_HORIZON + 1, ValueModel::Mean)
            .unwrap_err();
        assert_eq!(
            err,
            ScheduleError::HorizonTooLong {
                horizon: MAX_HORIZON + 1,
                max: MAX_HORIZON
            }
        );
    }

    #[test]
    fn construction_rejects_range_wider_than_decimal() {
        let err = Forecaster::new(
            dec!(-70000000000000000000000000000),
            dec!(70000000000000000000000000000),
            10,
            ValueModel::Mean,
        )
        .unwrap_err();
        assert_eq!(err, ScheduleError::Overflow("value range"));
    }

    #[test]
    fn trend_past_decimal_range_is_an_error() {
        let line = TrendLine::between(Decimal::ZERO, Decimal::MAX, 2).unwrap();
        assert_eq!(line.value_at(1).unwrap(), Decimal::MAX);
        assert_eq!(line.value_at(2), Err(ScheduleError::Overflow("trend value")));

        let mut cursor = line.cursor();
        assert_eq!(cursor.advance().unwrap().0, 1);
        assert!(cursor.advance().is_err());
        assert_eq!(cursor.step(), 1);
        assert_eq!(line.cursor().count(), 2);
    }

    #[test]
    fn accessors_report_construction_inputs() {
        let model = rand_model(11);
        let sim = Forecaster::new(dec!(9.00), dec!(12.00), 6, model).unwrap();
        assert_eq!(sim.lower_bound(), dec!(9.00));
        assert_eq!(sim.upper_bound(), dec!(12.00));
        assert_eq!(sim.horizon(), 6);
        assert_eq!(sim.model(), model);
        assert_eq!(sim.line().origin(), sim.lower_bound());
        assert_eq!(sim.trend().current().unwrap(), sim.line().origin());
    }

    #[test]
    fn construction_rejects_negative_noise() {
        let model = ValueModel::Rand {
            noise_amplitude: dec!(-0.10),
            seed: 1,
        };
        let err = Forecaster::new(dec!(9.00), dec!(12.00), 6, model).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidNoise(dec!(-0.10)));
    }

    #[test]
    fn mean_path_follows_the_line() {
        let mut sim = Forecaster::new(dec!(9.00), dec!(12.00), 6, ValueModel::Mean).unwrap();
        let path = sim.synthesize_path().unwrap();
        assert_eq!(
            path,
            vec![
                dec!(9.00),
                dec!(9.60),
                dec!(10.20),
                dec!(10.80),
                dec!(11.40),
                dec!(12.00)
            ]
        );
    }

    #[test]
    fn path_is_not_restartable() {
        let mut sim = Forecaster::new(dec!(9.00), dec!(12.00), 3, ValueModel::Mean).unwrap();
        let first = sim.synthesize_path().unwrap();
        let second = sim.synthesize_path().unwrap();
        assert_eq!(first, vec![dec!(9.00), dec!(10.50), dec!(12.00)]);
        assert_eq!(second, vec![dec!(13.50), dec!(15.00), dec!(16.50)]);
    }

    #[test]
    fn path_synthesis_leaves_forecast_cursor_alone() {
        let mut sim = Forecaster::new(dec!(9.00), dec!(12.00), 6, rand_model(7)).unwrap();
        sim.synthesize_path().unwrap();
        assert_eq!(sim.trend().step(), 0);
        assert_eq!(sim.line_mean(5).unwrap(), dec!(10.50));
    }

    #[test]
    fn same_seed_paths_are_identical() {
        let mut a = Forecaster::new(dec!(9.00), dec!(13.00), 20, rand_model(42)).unwrap();
        let mut b = Forecaster::new(dec!(9.00), dec!(13.00), 20, rand_model(42)).unwrap();
        assert_eq!(a.synthesize_path().unwrap(), b.synthesize_path().unwrap());
        assert_eq!(a.synthesize_path().unwrap(), b.synthesize_path().unwrap());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Forecaster::new(dec!(9.00), dec!(13.00), 20, rand_model(1)).unwrap();
        let mut b = Forecaster::new(dec!(9.00), dec!(13.00), 20, rand_model(2)).unwrap();
        assert_ne!(a.synthesize_path().unwrap(), b.synthesize_path().unwrap());
    }

    #[test]
    fn zero_amplitude_noise_matches_mean_path() {
        let model = ValueModel::Rand {
            noise_amplitude: Decimal::ZERO,
            seed: 99,
        };
        let mut noisy = Forecaster::new(dec!(9.00), dec!(13.00), 9, model).unwrap();
        let mut flat = Forecaster::new(dec!(9.00), dec!(13.00), 9, ValueModel::Mean).unwrap();
        assert_eq!(noisy.synthesize_path().unwrap(), flat.synthesize_path().unwrap());
    }

    #[test]
    fn trend_cursor_iterates_from_step_zero() {
        let points: Vec<_> = TrendLine::new(dec!(1.00), dec!(0.25))
            .cursor()
            .take(3)
            .collect();
        assert_eq!(points, vec![(0, dec!(1.00)), (1, dec!(1.25)), (2, dec!(1.50))]);
    }

    #[test]
    fn float_boundary_rejects_non_finite() {
        assert_eq!(
            float_to_money(f64::NAN, "test"),
            Err(ScheduleError::NonFinite("test"))
        );
        assert_eq!(float_to_money(10.005, "test").unwrap().scale(), 2);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_noise_stays_within_amplitude(
            seed in 0u64..u64::MAX,
            lower_cents in 100i64..5_000,
            width_cents in 0i64..5_000,
            amplitude_cents in 0i64..500,
            horizon in 1u32..40,
        ) {
            let lower = Decimal::new(lower_cents, 2);
            let upper = Decimal::new(lower_cents + width_cents, 2);
            let amplitude = Decimal::new(amplitude_cents, 2);
            let model = ValueModel::Rand { noise_amplitude: amplitude, seed };
            let mut sim = Forecaster::new(lower, upper, horizon, model).unwrap();
            let line = sim.line();

            let path = sim.synthesize_path().unwrap();
            prop_assert_eq!(path.len(), horizon as usize);
            for (step, value) in path.iter().enumerate() {
                prop_assert_eq!(value.scale(), 2);
                let deviation = (*value - line.value_at(step as u32).unwrap()).abs();
                prop_assert!(deviation <= amplitude + dec!(0.01));
            }
        }

        #[test]
        fn prop_rng_draws_are_in_open_unit_interval(seed in 0u64..u64::MAX) {
            let mut rng = Rng::new(splitmix64(seed));
            for _ in 0..32 {
                let u = rng.next_f64();
                prop_assert!(u > 0.0 && u < 1.0);
            }
        }
    }
}
