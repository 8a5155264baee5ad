//! Error types for the scheduling core.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the forecaster, scheduler and ledger.
///
/// Every variant is fatal to the run that produced it; nothing in the core
/// retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Value range with its bounds inverted.
    #[error("invalid value range: lower bound {lower} exceeds upper bound {upper}")]
    InvalidRange { lower: Decimal, upper: Decimal },

    /// Horizon with no observations.
    #[error("horizon must contain at least one observation")]
    EmptyHorizon,

    /// Horizon longer than the scheduler is willing to size histories for.
    #[error("horizon of {horizon} days exceeds the maximum of {max}")]
    HorizonTooLong { horizon: u32, max: u32 },

    /// Negative noise half-width.
    #[error("noise amplitude must be non-negative, got {0}")]
    InvalidNoise(Decimal),

    /// Mean or baseline requested over zero elements.
    #[error("cannot average an empty series")]
    EmptySeries,

    /// Negative starting holding.
    #[error("quantity must be non-negative, got {0}")]
    InvalidQuantity(Decimal),

    /// Negative sell amount.
    #[error("sell amount must be non-negative, got {0}")]
    InvalidAmount(Decimal),

    /// Negative observed value.
    #[error("observed value must be non-negative, got {0}")]
    InvalidValue(Decimal),

    /// Sale larger than the unsold holding.
    #[error("overdraw: requested {requested}, remaining {remaining}")]
    Overdraw {
        requested: Decimal,
        remaining: Decimal,
    },

    /// Every day of the horizon has already been committed.
    #[error("horizon of {horizon} days already exhausted")]
    ExhaustedHorizon { horizon: u32 },

    /// Forecast that would divide by zero or flip sign.
    #[error("degenerate forecast: {0}")]
    DegenerateForecast(String),

    /// Floating point intermediate that is NaN or infinite.
    #[error("non-finite intermediate in {0}")]
    NonFinite(&'static str),

    /// Decimal result outside the representable range.
    #[error("decimal overflow in {0}")]
    Overflow(&'static str),

    /// Ledger histories of different lengths.
    #[error("history length mismatch: {sells} sells, {values} values")]
    LengthMismatch { sells: usize, values: usize },

    /// Supplied observations that do not cover the horizon.
    #[error("expected {expected} observed values, got {actual}")]
    ObservedLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
