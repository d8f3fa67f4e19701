//! Trade execution pipeline: signal normalization, the five-stage
//! executor, position tracking, and execution reconciliation.
//! See spec §3, §4.9-4.12.

pub mod bridge;
pub mod executor;
pub mod position_store;
pub mod reconciler;

pub use bridge::{EmaTradeSignal, FusionRecommendation, SignalBridge, SocialTradingSignal};
pub use executor::{OrderStatus, PipelineConfig, PipelineExecutor, PipelineResult, PipelineStats};
pub use position_store::{PositionStore, TrackedPosition};
pub use reconciler::{Reconciler, ReconciliationRecord, ReconciliationStats};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Stop => "stop",
            OrderType::StopLimit => "stop_limit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOrder {
    pub order_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub asset_type: String,
    pub signal_type: String,
    pub confidence: f64,
    pub position_size_pct: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub time_horizon: Option<String>,
    pub risk_level: Option<String>,
    pub reasoning: Option<String>,
    pub source_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The flat broker order shape emitted by the pipeline's Route stage
/// (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct BrokerOrder {
    pub symbol: String,
    pub side: &'static str,
    pub qty: f64,
    pub order_type: &'static str,
    pub asset_type: String,
    pub pipeline_order_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
}

impl From<&PipelineOrder> for BrokerOrder {
    fn from(order: &PipelineOrder) -> Self {
        Self {
            symbol: order.symbol.clone(),
            side: order.side.as_str(),
            qty: order.qty,
            order_type: order.order_type.as_str(),
            asset_type: order.asset_type.clone(),
            pipeline_order_id: order.order_id,
            limit_price: order.limit_price,
            stop_price: order.stop_price,
        }
    }
}
