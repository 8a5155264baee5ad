mod engine;
mod error;
mod forecast;
mod ledger;
mod scheduler;
mod types;

pub use engine::run_schedule;
pub use error::{Result, ScheduleError};
pub use forecast::{Forecaster, TrendCursor, TrendLine, arithmetic_mean};
pub use ledger::{YieldReport, count_yield, naive_yield};
pub use scheduler::Scheduler;
pub use types::{
    DayResult, Inputs, LimitMode, MAX_HORIZON, MONEY_SCALE, ScheduleResult, ValueModel,
    round_half_up, round_money,
};
