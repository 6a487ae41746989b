use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    Cycle, HistoricalRecord, PortfolioForm, SimulationForm, SimulationSummary, SpendingForm,
    run_simulation, summarize,
};

#[derive(Parser, Debug)]
#[command(
    name = "cfiresim",
    about = "Historical-cycle retirement simulator (fixed, variable and percent-of-portfolio spending)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate every historical cycle in a JSON dataset and print a JSON report.
    Run(RunArgs),
    /// Serve the simulation over HTTP.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSpendingPolicy {
    InflationAdjusted,
    VariableSpending,
    PercentOfPortfolio,
}

impl CliSpendingPolicy {
    fn method(self) -> &'static str {
        match self {
            CliSpendingPolicy::InflationAdjusted => "inflationAdjusted",
            CliSpendingPolicy::VariableSpending => "variableSpending",
            CliSpendingPolicy::PercentOfPortfolio => "percentOfPortfolio",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliPercentageType {
    Constant,
    WithFloorAndCeiling,
}

impl CliPercentageType {
    fn tag(self) -> &'static str {
        match self {
            CliPercentageType::Constant => "constant",
            CliPercentageType::WithFloorAndCeiling => "withFloorAndCeiling",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliBoundType {
    None,
    PercentageOfPortfolio,
    PercentageOfPreviousYear,
}

impl CliBoundType {
    fn tag(self) -> &'static str {
        match self {
            CliBoundType::None => "none",
            CliBoundType::PercentageOfPortfolio => "percentageOfPortfolio",
            CliBoundType::PercentageOfPreviousYear => "percentageOfPreviousYear",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, help = "JSON array of historical records, oldest first")]
    data: PathBuf,
    #[arg(long)]
    retirement_start_year: u32,
    #[arg(long)]
    retirement_end_year: u32,
    #[arg(long)]
    initial_portfolio: f64,
    #[arg(long, help = "First-year spending; not needed for percent-of-portfolio")]
    initial_spending: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliSpendingPolicy::InflationAdjusted)]
    spending_policy: CliSpendingPolicy,
    #[arg(long, help = "Variable spending: share of real portfolio change passed to spending")]
    z_value: Option<f64>,
    #[arg(long, help = "Variable spending floor in today's money")]
    floor_value: Option<f64>,
    #[arg(long, help = "Variable spending ceiling in today's money")]
    ceiling_value: Option<f64>,
    #[arg(long, help = "Percent of portfolio spent each year, e.g. 4")]
    percentage: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliPercentageType::Constant)]
    percentage_type: CliPercentageType,
    #[arg(long, value_enum, default_value_t = CliBoundType::None)]
    floor_type: CliBoundType,
    #[arg(long, help = "Percent used by --floor-type")]
    floor_percentage: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliBoundType::None)]
    ceiling_type: CliBoundType,
    #[arg(long, help = "Percent used by --ceiling-type")]
    ceiling_percentage: Option<f64>,
    #[arg(long, default_value_t = 75.0, help = "Equities allocation in percent")]
    percent_equities: f64,
    #[arg(long, default_value_t = 25.0, help = "Bonds allocation in percent")]
    percent_bonds: f64,
    #[arg(long, default_value_t = 0.0, help = "Cash allocation in percent")]
    percent_cash: f64,
    #[arg(long, default_value_t = 0.18, help = "Annual fees in percent")]
    percent_fees: f64,
    #[arg(long, help = "Omit per-cycle detail from the report")]
    summary_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateRequest {
    #[serde(default)]
    config: SimulationForm,
    #[serde(default)]
    data: Vec<HistoricalRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    summary: SimulationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycles: Option<Vec<Cycle>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn form_from_args(args: &RunArgs) -> SimulationForm {
    let bounded = args.percentage_type == CliPercentageType::WithFloorAndCeiling;
    let variable = args.spending_policy == CliSpendingPolicy::VariableSpending;
    SimulationForm {
        retirement_start_year: Some(args.retirement_start_year),
        retirement_end_year: Some(args.retirement_end_year),
        portfolio: PortfolioForm {
            initial: Some(args.initial_portfolio),
            percent_equities: Some(args.percent_equities),
            percent_bonds: Some(args.percent_bonds),
            percent_cash: Some(args.percent_cash),
            percent_fees: Some(args.percent_fees),
        },
        spending: SpendingForm {
            method: Some(args.spending_policy.method().to_string()),
            initial: args.initial_spending,
            variable_spending_z_value: args.z_value,
            floor: (variable && args.floor_value.is_some()).then(|| "definedValue".to_string()),
            floor_value: args.floor_value,
            ceiling: (variable && args.ceiling_value.is_some())
                .then(|| "definedValue".to_string()),
            ceiling_value: args.ceiling_value,
            percentage_of_portfolio_percentage: args.percentage,
            percentage_of_portfolio_type: Some(args.percentage_type.tag().to_string()),
            percentage_of_portfolio_floor_type: bounded.then(|| args.floor_type.tag().to_string()),
            percentage_of_portfolio_floor_percentage: args.floor_percentage,
            percentage_of_portfolio_ceiling_type: bounded
                .then(|| args.ceiling_type.tag().to_string()),
            percentage_of_portfolio_ceiling_percentage: args.ceiling_percentage,
        },
    }
}

fn build_report(
    form: SimulationForm,
    data: &[HistoricalRecord],
    include_cycles: bool,
) -> Result<SimulationReport, String> {
    let config = form.into_config().map_err(|e| e.to_string())?;
    let cycles = run_simulation(&config, data).map_err(|e| e.to_string())?;
    Ok(SimulationReport {
        summary: summarize(&cycles),
        cycles: include_cycles.then_some(cycles),
    })
}

/// Reads the dataset named by `args`, runs every cycle and renders the JSON report.
pub fn run_report(args: &RunArgs) -> Result<String, String> {
    let raw = std::fs::read_to_string(&args.data)
        .map_err(|e| format!("failed to read {}: {e}", args.data.display()))?;
    let data = serde_json::from_str::<Vec<HistoricalRecord>>(&raw)
        .map_err(|e| format!("invalid dataset JSON in {}: {e}", args.data.display()))?;
    info!(records = data.len(), path = %args.data.display(), "loaded dataset");

    let report = build_report(form_from_args(args), &data, !args.summary_only)?;
    serde_json::to_string_pretty(&report).map_err(|e| format!("failed to render report: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/simulate", post(simulate_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "cfiresim HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_post_handler(Json(request): Json<SimulateRequest>) -> Response {
    simulate_handler_impl(request).await
}

async fn simulate_handler_impl(request: SimulateRequest) -> Response {
    match build_report(request.config, &request.data, true) {
        Ok(report) => json_response(StatusCode::OK, report),
        Err(msg) => {
            warn!(error = %msg, "rejected simulation request");
            error_response(StatusCode::BAD_REQUEST, &msg)
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
fn simulate_request_from_json(json: &str) -> Result<SimulateRequest, String> {
    serde_json::from_str::<SimulateRequest>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PercentBound, PercentOfPortfolioMode, SpendingPolicy};
    use std::fs;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_args() -> RunArgs {
        Cli::parse_from([
            "cfiresim",
            "run",
            "--data",
            "data.json",
            "--retirement-start-year",
            "2030",
            "--retirement-end-year",
            "2032",
            "--initial-portfolio",
            "1000000",
            "--initial-spending",
            "40000",
        ])
        .run_args()
    }

    impl Cli {
        fn run_args(self) -> RunArgs {
            match self.command {
                Command::Run(args) => args,
                Command::Serve { .. } => panic!("expected run command"),
            }
        }
    }

    const SAMPLE_REQUEST: &str = r#"{
      "config": {
        "retirementStartYear": 2030,
        "retirementEndYear": 2031,
        "portfolio": { "initial": 1000000, "percentEquities": 100, "percentBonds": 0, "percentFees": 0 },
        "spending": { "method": "variableSpending", "initial": 40000, "variableSpendingZValue": 0.5 }
      },
      "data": [
        { "date": "1966", "equities": -0.1, "bonds": 0.02, "inflation": 0.05 },
        { "date": "1967", "equities": 0.2, "bonds": 0.02, "inflation": 0.03 },
        { "date": "1968", "equities": 0.1, "bonds": 0.02, "inflation": 0.04 }
      ]
    }"#;

    #[test]
    fn cli_defaults_map_to_fixed_policy_form() {
        let form = form_from_args(&sample_args());
        let config = form.into_config().expect("valid form");

        assert_eq!(config.window_length(), 3);
        assert_eq!(config.spending.policy, SpendingPolicy::Fixed);
        assert_approx(config.spending.initial, 40_000.0);
        assert_approx(config.allocation.equities, 0.75);
        assert_approx(config.fees, 0.0018);
    }

    #[test]
    fn cli_variable_policy_sets_defined_value_bounds() {
        let mut args = sample_args();
        args.spending_policy = CliSpendingPolicy::VariableSpending;
        args.z_value = Some(0.5);
        args.floor_value = Some(30_000.0);

        let config = form_from_args(&args).into_config().expect("valid form");
        assert_eq!(
            config.spending.policy,
            SpendingPolicy::Variable {
                z_value: 0.5,
                floor: Some(30_000.0),
                ceiling: None,
            }
        );
    }

    #[test]
    fn cli_percent_policy_with_bounds() {
        let mut args = sample_args();
        args.spending_policy = CliSpendingPolicy::PercentOfPortfolio;
        args.initial_spending = None;
        args.percentage = Some(4.0);
        args.percentage_type = CliPercentageType::WithFloorAndCeiling;
        args.floor_type = CliBoundType::PercentageOfPreviousYear;
        args.floor_percentage = Some(95.0);

        let config = form_from_args(&args).into_config().expect("valid form");
        assert_eq!(
            config.spending.policy,
            SpendingPolicy::PercentOfPortfolio {
                percentage: 4.0,
                mode: PercentOfPortfolioMode::WithFloorAndCeiling {
                    floor: PercentBound::PercentageOfPreviousYear(95.0),
                    ceiling: PercentBound::None,
                },
            }
        );
    }

    #[test]
    fn run_report_reads_dataset_and_renders_summary() {
        let path = std::env::temp_dir().join(format!("cfiresim-data-{}.json", std::process::id()));
        let data = (0..5)
            .map(|i| HistoricalRecord {
                date: format!("{}", 1900 + i),
                equities: 0.0,
                bonds: 0.0,
                cash: 0.0,
                inflation: 0.0,
            })
            .collect::<Vec<_>>();
        fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();

        let mut args = sample_args();
        args.data = path.clone();
        args.summary_only = true;
        let rendered = run_report(&args);
        fs::remove_file(&path).ok();

        let json: serde_json::Value = serde_json::from_str(&rendered.expect("report")).unwrap();
        assert_eq!(json["summary"]["cycleCount"], 3);
        assert_eq!(json["summary"]["successRate"], 1.0);
        assert!(json.get("cycles").is_none());
    }

    #[test]
    fn run_report_reports_missing_dataset() {
        let mut args = sample_args();
        args.data = PathBuf::from("/nonexistent/cfiresim.json");
        let err = run_report(&args).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn simulate_request_from_json_parses_config_and_data() {
        let request = simulate_request_from_json(SAMPLE_REQUEST).expect("json should parse");
        assert_eq!(request.data.len(), 3);
        assert_eq!(request.data[0].cash, 0.0);
        assert_eq!(
            request.config.spending.method.as_deref(),
            Some("variableSpending")
        );
    }

    #[tokio::test]
    async fn simulate_handler_returns_cycles_and_summary() {
        let request = simulate_request_from_json(SAMPLE_REQUEST).unwrap();
        let response = simulate_handler_impl(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["summary"]["cycleCount"], 2);
        let cycles = json["cycles"].as_array().expect("cycles array");
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[1]["years"][0]["date"], "1967");
        assert_eq!(cycles[0]["years"][0]["spending"], 40000.0);
    }

    #[tokio::test]
    async fn simulate_handler_rejects_unknown_policy() {
        let json = SAMPLE_REQUEST.replace("variableSpending", "guardrails");
        let request = simulate_request_from_json(&json).unwrap();
        let response = simulate_handler_impl(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("guardrails"));
    }

    #[tokio::test]
    async fn not_found_returns_json_error() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
