use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use cut_optimizer::cancel::CancelToken;
use cut_optimizer::config::{OptimizerConfig, kerf_or_default};
use cut_optimizer::error::OptimizeError;
use cut_optimizer::parse::parse_length;
use cut_optimizer::report::{CutSummary, PlanReport, cuts_summary, pretty_len, to_fraction};
use cut_optimizer::solver::Solver;
use cut_optimizer::types::{Cut, Demand};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

const DEFAULT_MAX_SOLVE_MS: u64 = 30_000;

/// A length given either as inches or as a tape-measure string like `20' 6"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum LengthInput {
    Inches(f64),
    Text(String),
}

impl LengthInput {
    fn inches(&self) -> Option<f64> {
        match self {
            LengthInput::Inches(v) => v.is_finite().then_some(*v),
            LengthInput::Text(s) => parse_length(s),
        }
    }
}

#[derive(Deserialize, Serialize)]
struct OptimizeRequest {
    #[serde(default = "default_job_name")]
    job_name: String,
    #[serde(default)]
    material: Option<String>,
    stock_length: LengthInput,
    #[serde(default)]
    kerf: Option<LengthInput>,
    cuts: Vec<CutRequest>,
    #[serde(default)]
    config: OptimizerConfig,
}

#[derive(Deserialize, Serialize)]
struct CutRequest {
    length: LengthInput,
    #[serde(deserialize_with = "deserialize_quantity")]
    quantity: u32,
}

fn default_job_name() -> String {
    "Untitled".to_string()
}

/// Accepts `3`, `3.0` or `"3"`.
fn deserialize_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let qty = match &value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    qty.and_then(|q| u32::try_from(q).ok())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid quantity {value}")))
}

#[derive(Serialize)]
struct OptimizeResponse {
    job_name: String,
    material: Option<String>,
    stock_length: f64,
    stock_length_pretty: String,
    kerf: f64,
    kerf_pretty: String,
    solution: PlanReport,
    optimization_time_ms: u64,
    cuts_summary: Vec<CutSummary>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message,
            kind: "invalid_input",
        }),
    )
}

fn error_response(e: &OptimizeError) -> ApiError {
    let (status, kind) = match e {
        OptimizeError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        OptimizeError::InfeasiblePatternSet => (StatusCode::UNPROCESSABLE_ENTITY, "infeasible"),
        OptimizeError::PatternLimit { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "pattern_limit"),
        OptimizeError::SolverFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "solver_failure"),
        OptimizeError::SolverUnavailable => {
            (StatusCode::INTERNAL_SERVER_ERROR, "solver_unavailable")
        }
    };
    if status.is_server_error() {
        sentry::capture_message(&e.to_string(), sentry::Level::Error);
    }
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
            kind,
        }),
    )
}

/// Validates the request, solves it and builds the response. Blocking.
fn plan(req: OptimizeRequest, max_solve: Duration) -> Result<OptimizeResponse, ApiError> {
    let stock_length = req
        .stock_length
        .inches()
        .ok_or_else(|| bad_request("invalid stock length".to_string()))?;

    let kerf = match &req.kerf {
        None => kerf_or_default(None),
        Some(k) => kerf_or_default(Some(k.inches().unwrap_or(f64::NAN))),
    };

    let demands: Vec<Demand> = req
        .cuts
        .iter()
        .map(|c| {
            let length = c
                .length
                .inches()
                .ok_or_else(|| format!("invalid cut length {:?}", c.length))?;
            if c.quantity == 0 {
                return Err("cut quantity must be non-zero".to_string());
            }
            Ok(Demand::new(length, c.quantity))
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(bad_request)?;

    let started = Instant::now();
    let token = CancelToken::with_timeout(max_solve);
    let solver = Solver::new(stock_length, kerf, demands).with_config(req.config);
    let solution = solver
        .solve_with_token(&token)
        .map_err(|e| error_response(&e))?;
    let elapsed = started.elapsed();

    let cuts: Vec<Cut> = solution
        .sticks
        .iter()
        .flat_map(|s| s.cuts.iter().copied())
        .collect();

    Ok(OptimizeResponse {
        job_name: req.job_name,
        material: req.material,
        stock_length,
        stock_length_pretty: pretty_len(stock_length),
        kerf,
        kerf_pretty: to_fraction(kerf),
        solution: PlanReport::new(&solution),
        optimization_time_ms: elapsed.as_millis() as u64,
        cuts_summary: cuts_summary(&cuts),
    })
}

fn max_solve_time() -> Duration {
    let ms = std::env::var("MAX_SOLVE_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_SOLVE_MS);
    Duration::from_millis(ms)
}

async fn optimize(
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /api/optimize"
    );

    let max_solve = max_solve_time();
    let response = tokio::task::spawn_blocking(move || plan(req, max_solve))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "solver task failed");
            error_response(&OptimizeError::SolverFailure(e.to_string()))
        })??;

    tracing::info!(
        job = %response.job_name,
        sticks = response.solution.stick_count,
        elapsed_ms = response.optimization_time_ms,
        "plan ready"
    );
    Ok(Json(response))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "cut_optimizer" }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn app() -> Router {
    Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/api/health", get(health))
        .route("/api/optimize", post(optimize))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[tokio::main]
async fn main() {
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    eprintln!("Listening on {addr}");
    axum::serve(listener, app())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}
