//! NSE Quant - momentum and mean-reversion scanner for NSE equities
//!
//! Usage:
//!   nse-quant serve --port 8000              - Launch the HTTP API
//!   nse-quant scan --index "NIFTY IT"        - One-shot scan from CLI
//!   nse-quant analyze --symbol TCS.NS        - One-shot analysis from CLI

mod render;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use engine::{
    build_provider, IndexCatalog, RuleBasedEngine, ScanOrchestrator, ScannerConfig,
    SymbolAnalysis, SymbolResult, WindowSpec,
};
use render::OutputFormat;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

const ENDPOINTS: &[(&str, &str)] = &[
    ("/scan", "Interactive scan page (historical)"),
    ("/scan-live", "Interactive scan page (intraday)"),
    ("/api/health", "Health check"),
    ("/api/scan", "One-shot scan: index, live, format, min_return"),
    ("/api/analyze", "One-shot analysis: index or symbol, live, format, recommendation"),
    ("/api/indexes", "Index catalog"),
    ("/api/scan-start", "Start a background scan: index, live, max_workers"),
    ("/api/scan-status", "Background scan progress: index"),
    ("/api/scan-results", "Background scan results: index"),
];

#[derive(Parser)]
#[command(name = "nse-quant")]
#[command(about = "Momentum and mean-reversion scanner for NSE equities", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
    /// Scan an index once and print the results
    Scan {
        /// Index name (defaults to the first catalog index)
        #[arg(long)]
        index: Option<String>,
        /// Use today's 5-minute bars instead of 6 months of daily bars
        #[arg(long)]
        live: bool,
        /// Keep symbols where either strategy returned at least this percent
        #[arg(long)]
        min_return: Option<Decimal>,
        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Analyze an index (or a single symbol) once and print the results
    Analyze {
        /// Index name (defaults to the first catalog index)
        #[arg(long, conflicts_with = "symbol")]
        index: Option<String>,
        /// Single symbol, e.g. TCS.NS
        #[arg(long)]
        symbol: Option<String>,
        /// Use today's 5-minute bars instead of 6 months of daily bars
        #[arg(long)]
        live: bool,
        /// Case-insensitive recommendation filter, e.g. "buy"
        #[arg(long)]
        recommendation: Option<String>,
    },
    /// List the index catalog
    Indexes,
}

#[derive(Clone)]
struct AppState {
    orchestrator: ScanOrchestrator,
    catalog: Arc<IndexCatalog>,
    config: Arc<ScannerConfig>,
}

impl AppState {
    fn from_config(config: ScannerConfig) -> Self {
        let provider = build_provider(&config);
        let orchestrator = ScanOrchestrator::new(provider, Arc::new(RuleBasedEngine::default()));
        Self {
            orchestrator,
            catalog: Arc::new(IndexCatalog::nse()),
            config: Arc::new(config),
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,nse_quant=debug")
    } else {
        EnvFilter::new("info,engine=info,nse_quant=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port).await?;
        }
        Commands::Scan {
            index,
            live,
            min_return,
            format,
        } => {
            cmd_scan(index, live, min_return, &format).await?;
        }
        Commands::Analyze {
            index,
            symbol,
            live,
            recommendation,
        } => {
            cmd_analyze(index, symbol, live, recommendation).await?;
        }
        Commands::Indexes => {
            let catalog = IndexCatalog::nse();
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }
    }

    Ok(())
}

// ============================================================================
// Serve command - Axum web server
// ============================================================================

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/scan", get(api_scan))
        .route("/analyze", get(api_analyze))
        .route("/indexes", get(api_indexes))
        .route("/scan-start", get(api_scan_start))
        .route("/scan-status", get(api_scan_status))
        .route("/scan-results", get(api_scan_results));

    Router::new()
        .route("/", get(home))
        .route("/scan", get(scan_page))
        .route("/scan-live", get(scan_live_page))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("NSE Quant v{} starting...", APP_VERSION);

    let config = ScannerConfig::from_env();
    info!(
        provider = ?config.provider,
        max_workers = config.max_workers,
        "Scanner configured"
    );
    let state = AppState::from_config(config);
    let indexes = state.catalog.len();
    let provider = state.orchestrator.provider_name().to_string();
    let app = build_router(state);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== NSE Quant v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("Market data: {} | {} indexes", provider, indexes);
    println!("\nEndpoints:");
    for (path, description) in ENDPOINTS {
        println!("  GET  {:<22} - {}", path, description);
    }
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Scan / Analyze commands - CLI mode (no web server)
// ============================================================================

async fn cmd_scan(
    index: Option<String>,
    live: bool,
    min_return: Option<Decimal>,
    format: &str,
) -> anyhow::Result<()> {
    let state = AppState::from_config(ScannerConfig::from_env());
    let Some(definition) = state.catalog.resolve(index.as_deref()) else {
        anyhow::bail!("Index '{}' not found", index.unwrap_or_default());
    };

    info!(index = %definition.name, live, "Running one-shot scan");
    let results = state
        .orchestrator
        .scan_now(
            &definition.symbols,
            &WindowSpec::for_mode(live),
            state.config.max_workers,
        )
        .await;
    let results = filter_min_return(results, min_return);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&results)?),
        "csv" => print!("{}", render::scan_csv(&results)?),
        _ => print_scan(&definition.name, &results),
    }
    Ok(())
}

async fn cmd_analyze(
    index: Option<String>,
    symbol: Option<String>,
    live: bool,
    recommendation: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState::from_config(ScannerConfig::from_env());
    let (title, symbols) = match symbol {
        Some(symbol) => (symbol.clone(), vec![symbol]),
        None => match state.catalog.resolve(index.as_deref()) {
            Some(definition) => (definition.name.clone(), definition.symbols.clone()),
            None => anyhow::bail!("Index '{}' not found", index.unwrap_or_default()),
        },
    };

    info!(target_name = %title, live, "Running one-shot analysis");
    let results = state
        .orchestrator
        .analyze_now(&symbols, &WindowSpec::for_mode(live), state.config.max_workers)
        .await;
    let results = filter_recommendation(results, recommendation.as_deref());

    print_analysis(&title, &results);
    Ok(())
}

fn print_scan(index: &str, results: &[SymbolResult]) {
    println!("\nScan Results for {} ({} symbols):", index, results.len());
    println!(
        "  {:<16} {:>12} {:>12} {:>12}",
        "Symbol", "Last Price", "Momentum %", "MeanRev %"
    );
    println!("  {}", "-".repeat(56));
    for r in results {
        println!(
            "  {:<16} {:>12} {:>12} {:>12}",
            r.symbol,
            cell(r.last_price),
            cell(r.momentum_return),
            cell(r.mean_rev_return),
        );
    }
}

fn print_analysis(title: &str, results: &[SymbolAnalysis]) {
    println!("\nAnalysis - {} ({} symbols):", title, results.len());
    println!(
        "  {:<16} {:>10} {:<16} {:>9} {:>8} {:>9} {:>8}",
        "Symbol", "Price", "Recommendation", "Mom %", "Sharpe", "Rev %", "Win %"
    );
    println!("  {}", "-".repeat(84));
    for r in results {
        println!(
            "  {:<16} {:>10} {:<16} {:>9} {:>8} {:>9} {:>8}",
            r.symbol,
            cell(r.last_price),
            r.recommendation.label(),
            cell(r.momentum.metrics.return_pct),
            cell(r.momentum.metrics.sharpe),
            cell(r.mean_reversion.metrics.return_pct),
            cell(r.mean_reversion.metrics.win_rate_pct),
        );
    }
}

fn cell(value: Option<Decimal>) -> String {
    value
        .map(|v| format!("{:.2}", v.round_dp(2)))
        .unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// Filters and query helpers
// ============================================================================

fn filter_min_return(results: Vec<SymbolResult>, min_return: Option<Decimal>) -> Vec<SymbolResult> {
    match min_return {
        Some(threshold) => results
            .into_iter()
            .filter(|r| r.meets_min_return(threshold))
            .collect(),
        None => results,
    }
}

fn filter_recommendation(
    results: Vec<SymbolAnalysis>,
    recommendation: Option<&str>,
) -> Vec<SymbolAnalysis> {
    match recommendation.filter(|r| !r.is_empty()) {
        Some(needle) => {
            let needle = needle.to_lowercase();
            results
                .into_iter()
                .filter(|r| r.recommendation.label().to_lowercase().contains(&needle))
                .collect()
        }
        None => results,
    }
}

/// `live=1` / `live=true` selects the intraday window
fn live_flag(params: &HashMap<String, String>) -> bool {
    params
        .get("live")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn accept_header(headers: &HeaderMap) -> &str {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Scan identity for status/results reads; the first catalog index when absent
fn identity_param(state: &AppState, params: &HashMap<String, String>) -> String {
    params
        .get("index")
        .cloned()
        .or_else(|| state.catalog.default_index().map(|i| i.name.clone()))
        .unwrap_or_default()
}

fn empty_or_message(format: OutputFormat, message: &str) -> Response {
    match format {
        OutputFormat::Html => Html(render::message_page(message)).into_response(),
        _ => Json(serde_json::json!([])).into_response(),
    }
}

// ============================================================================
// Pages
// ============================================================================

/// GET /
async fn home() -> Html<String> {
    Html(render::home_page(APP_VERSION, ENDPOINTS))
}

/// GET /scan
async fn scan_page() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, NO_CACHE)], Html(render::scan_page(false)))
}

/// GET /scan-live
async fn scan_live_page() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, NO_CACHE)], Html(render::scan_page(true)))
}

// ============================================================================
// API Handlers - one-shot
// ============================================================================

/// GET /api/health
async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "nse-quant",
        "version": APP_VERSION,
        "provider": state.orchestrator.provider_name(),
    }))
}

/// GET /api/scan - synchronous scan of one index
async fn api_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let format = OutputFormat::resolve(
        params.get("format").map(|s| s.as_str()),
        accept_header(&headers),
    );

    if state.catalog.is_empty() {
        return empty_or_message(format, "No indexes configured.");
    }
    let requested = params.get("index").map(|s| s.as_str());
    let Some(definition) = state.catalog.resolve(requested) else {
        return empty_or_message(
            format,
            &format!("Index '{}' not found.", requested.unwrap_or_default()),
        );
    };

    let min_return = match params.get("min_return").filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<Decimal>() {
            Ok(v) => Some(v),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": format!("invalid min_return: {}", raw) })),
                )
                    .into_response()
            }
        },
        None => None,
    };

    let live = live_flag(&params);
    info!(index = %definition.name, live, "One-shot scan requested");

    let results = state
        .orchestrator
        .scan_now(
            &definition.symbols,
            &WindowSpec::for_mode(live),
            state.config.max_workers,
        )
        .await;
    let results = filter_min_return(results, min_return);

    match format {
        OutputFormat::Html => Html(render::scan_table(&definition.name, &results)).into_response(),
        OutputFormat::Csv => match render::scan_csv(&results) {
            Ok(body) => ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response(),
            Err(e) => {
                error!(error = %e, "CSV rendering failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        OutputFormat::Json => Json(results).into_response(),
    }
}

/// GET /api/analyze - synchronous analysis of one index or one symbol
async fn api_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let format = OutputFormat::resolve(
        params.get("format").map(|s| s.as_str()),
        accept_header(&headers),
    );

    let (title, symbols) = match params.get("symbol").filter(|s| !s.is_empty()) {
        Some(symbol) => (format!("Analysis - {}", symbol), vec![symbol.clone()]),
        None => match state.catalog.resolve(params.get("index").map(|s| s.as_str())) {
            Some(definition) => (
                format!("Analysis - {}", definition.name),
                definition.symbols.clone(),
            ),
            None => return empty_or_message(format, "No symbols found."),
        },
    };

    let live = live_flag(&params);
    info!(target_name = %title, live, symbols = symbols.len(), "One-shot analysis requested");

    let results = state
        .orchestrator
        .analyze_now(&symbols, &WindowSpec::for_mode(live), state.config.max_workers)
        .await;
    let results = filter_recommendation(results, params.get("recommendation").map(|s| s.as_str()));

    match format {
        OutputFormat::Html => Html(render::analysis_table(&title, &results)).into_response(),
        _ => Json(results).into_response(),
    }
}

/// GET /api/indexes
async fn api_indexes(State(state): State<AppState>) -> Json<IndexCatalog> {
    Json(state.catalog.as_ref().clone())
}

// ============================================================================
// API Handlers - background scans
// ============================================================================

/// GET /api/scan-start - launch a background scan; returns immediately
async fn api_scan_start(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let requested = params.get("index").map(|s| s.as_str());
    let Some(definition) = state.catalog.resolve(requested) else {
        warn!(index = requested.unwrap_or_default(), "Scan start for unknown index");
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!([]))).into_response();
    };

    let max_workers = params
        .get("max_workers")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(state.config.max_workers);

    let outcome = state.orchestrator.start(
        &definition.name,
        definition.symbols.clone(),
        WindowSpec::for_mode(live_flag(&params)),
        max_workers,
    );
    Json(outcome).into_response()
}

/// GET /api/scan-status - progress counters of the index's latest run
async fn api_scan_status(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<engine::ScanStatus> {
    let identity = identity_param(&state, &params);
    Json(state.orchestrator.status(&identity))
}

/// GET /api/scan-results - records of the index's latest run, in completion order
async fn api_scan_results(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<engine::ScanResults> {
    let identity = identity_param(&state, &params);
    Json(state.orchestrator.results(&identity))
}
