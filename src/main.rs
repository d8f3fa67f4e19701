//! Platform core service entrypoint.
//! Wires the isolation middleware in front of a small demo surface over
//! the resilience fabric, trade pipeline, and capacity plane.

use axum::{
    extract::State,
    middleware as axum_mw,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use dotenv::dotenv;
use platform_core::capacity::{CapacityConfig, ResourceMonitor};
use platform_core::pipeline::{OrderType, PipelineConfig, PipelineExecutor, PipelineOrder, Side};
use platform_core::resilience::{CircuitBreakerConfig, CIRCUIT_BREAKERS};
use platform_core::tenancy::{ContextManager, IsolationMiddleware, TenancyConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

struct AppState {
    pipeline: Arc<PipelineExecutor>,
    resources: Arc<ResourceMonitor>,
}

#[derive(Deserialize)]
struct SubmitOrderRequest {
    symbol: String,
    side: String,
    qty: f64,
    confidence: f64,
    position_size_pct: f64,
    limit_price: Option<f64>,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn breaker_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "breakers": CIRCUIT_BREAKERS.names() }))
}

async fn submit_order(State(state): State<Arc<AppState>>, Json(req): Json<SubmitOrderRequest>) -> Json<serde_json::Value> {
    let side = if req.side.eq_ignore_ascii_case("sell") { Side::Sell } else { Side::Buy };
    let order_type = if req.limit_price.is_some() { OrderType::Limit } else { OrderType::Market };
    let order = PipelineOrder {
        order_id: Uuid::new_v4(),
        symbol: req.symbol,
        side,
        order_type,
        qty: req.qty,
        limit_price: req.limit_price,
        stop_price: None,
        asset_type: "equity".to_string(),
        signal_type: "api".to_string(),
        confidence: req.confidence,
        position_size_pct: req.position_size_pct,
        stop_loss_pct: None,
        take_profit_pct: None,
        time_horizon: None,
        risk_level: None,
        reasoning: None,
        source_data: serde_json::json!({}),
        created_at: Utc::now(),
    };
    let result = state.pipeline.process(order);
    Json(serde_json::json!({
        "status": format!("{:?}", result.status),
        "rejection_reason": result.rejection_reason,
        "broker_name": result.broker_name,
        "fill_price": result.fill_price,
        "fill_qty": result.fill_qty,
        "stages_passed": result.stages_passed,
    }))
}

async fn pipeline_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.pipeline.stats();
    Json(serde_json::json!({
        "total_processed": stats.total_processed,
        "executed": stats.executed,
        "rejected": stats.rejected,
        "failed": stats.failed,
        "execution_rate": stats.execution_rate,
        "avg_latency_ms": stats.avg_latency_ms,
        "daily_pnl": stats.daily_pnl,
    }))
}

async fn capacity_snapshot(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.resources.take_snapshot();
    Json(serde_json::json!({
        "health": format!("{:?}", snapshot.health),
        "metric_count": snapshot.latest.len(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let context_manager = Arc::new(ContextManager::new());
    let isolation = Arc::new(IsolationMiddleware::new(TenancyConfig::default(), context_manager));

    // Pre-register the default outbound-broker breaker so its state is
    // inspectable before the first call ever lands.
    CIRCUIT_BREAKERS.get_or_create("broker", CircuitBreakerConfig::default());

    let state = Arc::new(AppState {
        pipeline: Arc::new(PipelineExecutor::new(PipelineConfig::default())),
        resources: Arc::new(ResourceMonitor::new(CapacityConfig::default())),
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/resilience/breakers", get(breaker_status))
        .route("/pipeline/orders", post(submit_order))
        .route("/pipeline/stats", get(pipeline_stats))
        .route("/capacity/snapshot", get(capacity_snapshot))
        .with_state(state)
        .layer(axum_mw::from_fn_with_state(isolation, platform_core::tenancy::isolation_middleware))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    info!(%addr, "starting platform-core");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
