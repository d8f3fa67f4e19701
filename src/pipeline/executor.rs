//! Five-stage sequential pipeline executor: validate -> risk_check ->
//! route -> execute -> record. See spec §4.10.

use super::position_store::PositionSide;
use super::{BrokerOrder, PipelineOrder, PositionStore, Side};
use crate::audit::RingLog;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Validated,
    RiskApproved,
    Routed,
    Executed,
    Rejected,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub result_id: Uuid,
    pub order: PipelineOrder,
    pub status: OrderStatus,
    pub rejection_reason: Option<String>,
    pub broker_name: Option<String>,
    pub fill_price: Option<f64>,
    pub fill_qty: Option<f64>,
    pub fee: f64,
    pub latency_ms: f64,
    pub stages_passed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub min_confidence: f64,
    pub blocked_symbols: HashSet<String>,
    pub max_positions: usize,
    pub max_position_pct: f64,
    pub daily_loss_limit_pct: f64,
    pub min_order_value: f64,
    pub max_order_value: f64,
    pub paper_mode: bool,
    pub equity: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            blocked_symbols: HashSet::new(),
            max_positions: 20,
            max_position_pct: 20.0,
            daily_loss_limit_pct: 5.0,
            min_order_value: 10.0,
            max_order_value: 1_000_000.0,
            paper_mode: true,
            equity: 100_000.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_processed: u64,
    pub executed: u64,
    pub rejected: u64,
    pub failed: u64,
    pub execution_rate: f64,
    pub avg_latency_ms: f64,
    pub daily_pnl: f64,
}

/// Collaborator supplying live-mode fills (spec §6: "a broker executor").
pub trait BrokerExecutor: Send + Sync {
    fn execute(&self, order: &BrokerOrder) -> Result<BrokerFill, String>;
}

pub struct BrokerFill {
    pub fill_price: f64,
    pub fill_qty: f64,
    pub fee: f64,
    pub broker_name: String,
}

fn valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

pub struct PipelineExecutor {
    config: PipelineConfig,
    positions: Mutex<PositionStore>,
    results: RingLog<PipelineResult>,
    daily_realized_pnl: Mutex<f64>,
    broker: Option<std::sync::Arc<dyn BrokerExecutor>>,
}

impl PipelineExecutor {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            positions: Mutex::new(PositionStore::new()),
            results: RingLog::new(10_000),
            daily_realized_pnl: Mutex::new(0.0),
            broker: None,
        }
    }

    pub fn with_broker(mut self, broker: std::sync::Arc<dyn BrokerExecutor>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn positions(&self) -> &Mutex<PositionStore> {
        &self.positions
    }

    fn validate(&self, order: &PipelineOrder) -> Result<(), String> {
        if !valid_symbol(&order.symbol) {
            return Err("invalid symbol".to_string());
        }
        if order.qty <= 0.0 {
            return Err("qty must be positive".to_string());
        }
        if order.confidence < self.config.min_confidence {
            return Err(format!(
                "confidence {:.2} below minimum {:.2}",
                order.confidence, self.config.min_confidence
            ));
        }
        use super::OrderType::*;
        match order.order_type {
            Limit | StopLimit if order.limit_price.is_none() => {
                return Err("limit order requires limit_price".to_string());
            }
            Stop | StopLimit if order.stop_price.is_none() => {
                return Err("stop order requires stop_price".to_string());
            }
            _ => {}
        }
        Ok(())
    }

    fn estimated_order_value(&self, order: &PipelineOrder) -> f64 {
        let price = order.limit_price.unwrap_or(100.0);
        price * order.qty
    }

    fn risk_check(&self, order: &PipelineOrder) -> Result<(), String> {
        if self.config.blocked_symbols.contains(&order.symbol) {
            return Err(format!("{} is blocked", order.symbol));
        }

        let positions = self.positions.lock();
        let is_new_entry = order.side == Side::Buy && positions.get(&order.symbol).is_none();
        if is_new_entry && positions.open_count() >= self.config.max_positions {
            return Err("max open positions reached".to_string());
        }
        drop(positions);

        if order.position_size_pct > self.config.max_position_pct {
            return Err(format!(
                "position_size_pct {:.2} exceeds max {:.2}",
                order.position_size_pct, self.config.max_position_pct
            ));
        }

        let daily_pnl = *self.daily_realized_pnl.lock();
        if daily_pnl < 0.0 && (-daily_pnl / self.config.equity * 100.0) >= self.config.daily_loss_limit_pct {
            return Err("daily loss limit reached".to_string());
        }

        let value = self.estimated_order_value(order);
        if value < self.config.min_order_value || value > self.config.max_order_value {
            return Err(format!("order value {value:.2} out of bounds"));
        }
        Ok(())
    }

    pub fn process(&self, order: PipelineOrder) -> PipelineResult {
        let start = Instant::now();
        let mut stages_passed = Vec::new();

        macro_rules! reject {
            ($stage:literal, $reason:expr) => {{
                return PipelineResult {
                    result_id: Uuid::new_v4(),
                    order,
                    status: OrderStatus::Rejected,
                    rejection_reason: Some($reason),
                    broker_name: None,
                    fill_price: None,
                    fill_qty: None,
                    fee: 0.0,
                    latency_ms: start.elapsed().as_secs_f64() * 1000.0,
                    stages_passed,
                };
            }};
        }

        if let Err(reason) = self.validate(&order) {
            reject!("validate", reason);
        }
        stages_passed.push("validate:passed".to_string());

        if let Err(reason) = self.risk_check(&order) {
            reject!("risk_check", reason);
        }
        stages_passed.push("risk_check:passed".to_string());

        let (status, broker_name, fill_price, fill_qty, fee) = if self.config.paper_mode {
            stages_passed.push("route:paper".to_string());
            let fill_price = order.limit_price.unwrap_or(100.0);
            (OrderStatus::Routed, "paper".to_string(), fill_price, order.qty, 0.0)
        } else {
            stages_passed.push("route:live".to_string());
            let broker_order = BrokerOrder::from(&order);
            match self.broker.as_ref().map(|b| b.execute(&broker_order)) {
                Some(Ok(fill)) => (
                    OrderStatus::Routed,
                    fill.broker_name,
                    fill.fill_price,
                    fill.fill_qty,
                    fill.fee,
                ),
                Some(Err(reason)) => {
                    return PipelineResult {
                        result_id: Uuid::new_v4(),
                        order,
                        status: OrderStatus::Failed,
                        rejection_reason: Some(reason),
                        broker_name: None,
                        fill_price: None,
                        fill_qty: None,
                        fee: 0.0,
                        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
                        stages_passed,
                    };
                }
                None => {
                    return PipelineResult {
                        result_id: Uuid::new_v4(),
                        order,
                        status: OrderStatus::Failed,
                        rejection_reason: Some("no broker executor configured".to_string()),
                        broker_name: None,
                        fill_price: None,
                        fill_qty: None,
                        fee: 0.0,
                        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
                        stages_passed,
                    };
                }
            }
        };

        let final_status = if self.config.paper_mode {
            stages_passed.push("execute:simulated".to_string());
            OrderStatus::Executed
        } else {
            stages_passed.push("execute:live".to_string());
            status
        };

        {
            let mut positions = self.positions.lock();
            match order.side {
                Side::Buy => {
                    positions.open(
                        &order.symbol,
                        fill_qty,
                        fill_price,
                        PositionSide::Long,
                        &order.signal_type,
                        order.order_id,
                        order.stop_price,
                        None,
                    );
                }
                Side::Sell => {
                    if let Some(realized) = positions.reduce(&order.symbol, fill_qty, fill_price) {
                        *self.daily_realized_pnl.lock() += realized;
                    }
                }
            }
        }
        stages_passed.push("record:logged".to_string());

        let result = PipelineResult {
            result_id: Uuid::new_v4(),
            order,
            status: final_status,
            rejection_reason: None,
            broker_name: Some(broker_name),
            fill_price: Some(fill_price),
            fill_qty: Some(fill_qty),
            fee,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            stages_passed,
        };
        self.results.push(result.clone());
        result
    }

    pub fn stats(&self) -> PipelineStats {
        let results = self.results.snapshot();
        if results.is_empty() {
            return PipelineStats::default();
        }
        let total_processed = results.len() as u64;
        let executed = results.iter().filter(|r| r.status == OrderStatus::Executed).count() as u64;
        let rejected = results.iter().filter(|r| r.status == OrderStatus::Rejected).count() as u64;
        let failed = results.iter().filter(|r| r.status == OrderStatus::Failed).count() as u64;
        let avg_latency_ms = results.iter().map(|r| r.latency_ms).sum::<f64>() / total_processed as f64;

        PipelineStats {
            total_processed,
            executed,
            rejected,
            failed,
            execution_rate: executed as f64 / total_processed as f64,
            avg_latency_ms,
            daily_pnl: *self.daily_realized_pnl.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OrderType;
    use chrono::Utc;

    fn order(symbol: &str, side: Side, qty: f64, confidence: f64, position_size_pct: f64) -> PipelineOrder {
        PipelineOrder {
            order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            qty,
            limit_price: None,
            stop_price: None,
            asset_type: "equity".to_string(),
            signal_type: "fusion".to_string(),
            confidence,
            position_size_pct,
            stop_loss_pct: None,
            take_profit_pct: None,
            time_horizon: None,
            risk_level: None,
            reasoning: None,
            source_data: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn paper_execution_matches_worked_example() {
        let executor = PipelineExecutor::new(PipelineConfig {
            equity: 100_000.0,
            ..PipelineConfig::default()
        });
        let result = executor.process(order("AAPL", Side::Buy, 50.0, 0.7, 5.0));
        assert_eq!(result.status, OrderStatus::Executed);
        assert_eq!(result.broker_name.as_deref(), Some("paper"));
        assert_eq!(result.fill_qty, Some(50.0));
        assert_eq!(
            result.stages_passed,
            vec!["validate:passed", "risk_check:passed", "route:paper", "execute:simulated", "record:logged"]
        );
        assert_eq!(executor.positions().lock().open_count(), 1);
    }

    #[test]
    fn low_confidence_is_rejected_before_risk_check() {
        let executor = PipelineExecutor::new(PipelineConfig::default());
        let result = executor.process(order("AAPL", Side::Buy, 10.0, 0.1, 5.0));
        assert_eq!(result.status, OrderStatus::Rejected);
        assert_eq!(executor.positions().lock().open_count(), 0);
    }

    #[test]
    fn blocked_symbol_is_rejected_at_risk_check() {
        let mut config = PipelineConfig::default();
        config.blocked_symbols.insert("BADCO".to_string());
        let executor = PipelineExecutor::new(config);
        let result = executor.process(order("BADCO", Side::Buy, 10.0, 0.9, 5.0));
        assert_eq!(result.status, OrderStatus::Rejected);
        assert!(result.rejection_reason.unwrap().contains("blocked"));
    }

    #[test]
    fn sell_reduces_position_and_updates_daily_pnl() {
        let executor = PipelineExecutor::new(PipelineConfig::default());
        executor.process(order("AAPL", Side::Buy, 10.0, 0.9, 5.0));
        let sell_result = executor.process(order("AAPL", Side::Sell, 10.0, 0.9, 5.0));
        assert_eq!(sell_result.status, OrderStatus::Executed);
        assert_eq!(executor.positions().lock().open_count(), 0);
    }
}
