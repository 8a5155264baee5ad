use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{Inputs, LimitMode, MAX_HORIZON, ScheduleResult, ValueModel, run_schedule};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLimitMode {
    Bounded,
    Flex,
}

impl From<CliLimitMode> for LimitMode {
    fn from(value: CliLimitMode) -> Self {
        match value {
            CliLimitMode::Bounded => LimitMode::Bounded,
            CliLimitMode::Flex => LimitMode::Flex,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliValueModel {
    Mean,
    Rand,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiLimitMode {
    Bounded,
    #[serde(alias = "line")]
    Flex,
}

impl From<ApiLimitMode> for CliLimitMode {
    fn from(value: ApiLimitMode) -> Self {
        match value {
            ApiLimitMode::Bounded => CliLimitMode::Bounded,
            ApiLimitMode::Flex => CliLimitMode::Flex,
        }
    }
}

impl From<LimitMode> for ApiLimitMode {
    fn from(value: LimitMode) -> Self {
        match value {
            LimitMode::Bounded => ApiLimitMode::Bounded,
            LimitMode::Flex => ApiLimitMode::Flex,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiValueModel {
    Mean,
    #[serde(alias = "random")]
    Rand,
}

impl From<ApiValueModel> for CliValueModel {
    fn from(value: ApiValueModel) -> Self {
        match value {
            ApiValueModel::Mean => CliValueModel::Mean,
            ApiValueModel::Rand => CliValueModel::Rand,
        }
    }
}

impl From<ValueModel> for ApiValueModel {
    fn from(value: ValueModel) -> Self {
        match value {
            ValueModel::Mean => ApiValueModel::Mean,
            ValueModel::Rand { .. } => ApiValueModel::Rand,
        }
    }
}

/// Observed values as a JSON array or a comma-separated string (query form).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ObservedPayload {
    List(Vec<Decimal>),
    Csv(String),
}

impl ObservedPayload {
    fn into_values(self) -> Result<Vec<Decimal>, String> {
        match self {
            ObservedPayload::List(values) => Ok(values),
            ObservedPayload::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<Decimal>()
                        .map_err(|e| format!("invalid observed value {s:?}: {e}"))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SchedulePayload {
    quantity: Option<Decimal>,
    lower_bound: Option<Decimal>,
    upper_bound: Option<Decimal>,
    horizon: Option<u32>,
    value_model: Option<ApiValueModel>,
    noise_amplitude: Option<Decimal>,
    seed: Option<u64>,
    limit_mode: Option<ApiLimitMode>,
    risk_exponent: Option<f64>,
    observed_values: Option<ObservedPayload>,
}

#[derive(Parser, Debug)]
#[command(
    name = "destock",
    about = "Day-by-day decumulation schedule for a holding, tracking a value forecast"
)]
pub struct Cli {
    #[arg(long, default_value = "100000.00", help = "Quantity held on day one")]
    quantity: Decimal,
    #[arg(long, default_value = "9.00", help = "Lower bound of the value range")]
    lower_bound: Decimal,
    #[arg(long, default_value = "13.00", help = "Upper bound of the value range")]
    upper_bound: Decimal,
    #[arg(long, default_value_t = 20, help = "Number of daily observations")]
    horizon: u32,
    #[arg(long, value_enum, default_value_t = CliValueModel::Mean)]
    value_model: CliValueModel,
    #[arg(
        long,
        default_value = "0.50",
        help = "Half-width of uniform noise around the trend (rand model)"
    )]
    noise_amplitude: Decimal,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = CliLimitMode::Flex)]
    limit_mode: CliLimitMode,
    #[arg(
        long,
        help = "Sensitivity of flex sales to value relative to trend; omit to disable"
    )]
    risk_exponent: Option<f64>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Observed values, comma-separated; defaults to a synthesized path"
    )]
    observed_values: Vec<Decimal>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleResponse {
    limit_mode: ApiLimitMode,
    value_model: ApiValueModel,
    risk_exponent: Option<f64>,
    #[serde(flatten)]
    result: ScheduleResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn build_inputs(cli: Cli) -> Result<Inputs, String> {
    if cli.horizon == 0 {
        return Err("--horizon must be > 0".to_string());
    }
    if cli.horizon > MAX_HORIZON {
        return Err(format!("--horizon must be <= {MAX_HORIZON}"));
    }

    if cli.quantity < Decimal::ZERO {
        return Err("--quantity must be >= 0".to_string());
    }

    if cli.upper_bound < cli.lower_bound {
        return Err("--upper-bound must be >= --lower-bound".to_string());
    }

    if cli.noise_amplitude < Decimal::ZERO {
        return Err("--noise-amplitude must be >= 0".to_string());
    }

    if let Some(p) = cli.risk_exponent {
        if !p.is_finite() {
            return Err("--risk-exponent must be a finite number".to_string());
        }
        if cli.limit_mode == CliLimitMode::Bounded {
            return Err("--risk-exponent applies only to --limit-mode flex".to_string());
        }
    }

    let observed_values = if cli.observed_values.is_empty() {
        None
    } else {
        if cli.observed_values.len() != cli.horizon as usize {
            return Err(format!(
                "--observed-values must contain exactly --horizon ({}) values, got {}",
                cli.horizon,
                cli.observed_values.len()
            ));
        }
        if cli.observed_values.iter().any(|v| *v < Decimal::ZERO) {
            return Err("--observed-values must all be >= 0".to_string());
        }
        Some(cli.observed_values)
    };

    let value_model = match cli.value_model {
        CliValueModel::Mean => ValueModel::Mean,
        CliValueModel::Rand => ValueModel::Rand {
            noise_amplitude: cli.noise_amplitude,
            seed: cli.seed,
        },
    };

    Ok(Inputs {
        quantity: cli.quantity,
        lower_bound: cli.lower_bound,
        upper_bound: cli.upper_bound,
        horizon: cli.horizon,
        value_model,
        limit_mode: cli.limit_mode.into(),
        risk_exponent: cli.risk_exponent,
        observed_values,
    })
}

/// Runs one schedule from command-line flags and renders it as JSON.
pub fn run_cli(cli: Cli) -> Result<String, String> {
    let inputs = build_inputs(cli)?;
    let result = run_schedule(&inputs).map_err(|e| e.to_string())?;
    let response = build_schedule_response(&inputs, result);
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to render result: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/schedule",
            get(schedule_get_handler).post(schedule_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "schedule HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn schedule_get_handler(Query(payload): Query<SchedulePayload>) -> Response {
    schedule_handler_impl(payload).await
}

async fn schedule_post_handler(Json(payload): Json<SchedulePayload>) -> Response {
    schedule_handler_impl(payload).await
}

async fn schedule_handler_impl(payload: SchedulePayload) -> Response {
    let inputs = match inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => {
            warn!(error = %msg, "rejected schedule request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match run_schedule(&inputs) {
        Ok(result) => json_response(StatusCode::OK, build_schedule_response(&inputs, result)),
        Err(e) => {
            warn!(error = %e, "schedule run failed");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn inputs_from_json(json: &str) -> Result<Inputs, String> {
    let payload = serde_json::from_str::<SchedulePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    inputs_from_payload(payload)
}

fn inputs_from_payload(payload: SchedulePayload) -> Result<Inputs, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.quantity {
        cli.quantity = v;
    }
    if let Some(v) = payload.lower_bound {
        cli.lower_bound = v;
    }
    if let Some(v) = payload.upper_bound {
        cli.upper_bound = v;
    }
    if let Some(v) = payload.horizon {
        cli.horizon = v;
    }
    if let Some(v) = payload.value_model {
        cli.value_model = v.into();
    }
    if let Some(v) = payload.noise_amplitude {
        cli.noise_amplitude = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.limit_mode {
        cli.limit_mode = v.into();
    }
    if let Some(v) = payload.risk_exponent {
        cli.risk_exponent = Some(v);
    }
    if let Some(v) = payload.observed_values {
        cli.observed_values = v.into_values()?;
    }

    build_inputs(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        quantity: dec!(100000.00),
        lower_bound: dec!(9.00),
        upper_bound: dec!(13.00),
        horizon: 20,
        value_model: CliValueModel::Mean,
        noise_amplitude: dec!(0.50),
        seed: 42,
        limit_mode: CliLimitMode::Flex,
        risk_exponent: None,
        observed_values: Vec::new(),
        log_level: "info".to_string(),
    }
}

fn build_schedule_response(inputs: &Inputs, result: ScheduleResult) -> ScheduleResponse {
    ScheduleResponse {
        limit_mode: inputs.limit_mode.into(),
        value_model: inputs.value_model.into(),
        risk_exponent: inputs.risk_exponent,
        result,
    }
}
