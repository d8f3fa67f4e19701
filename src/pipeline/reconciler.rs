//! Execution reconciler: compares expected vs. actual fills, aggregating
//! slippage and fill quality. See spec §3, §4.11.

use crate::audit::RingLog;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReconciliationRecord {
    pub record_id: Uuid,
    pub order_id: Uuid,
    pub symbol: String,
    pub expected_price: f64,
    pub actual_price: f64,
    pub expected_qty: f64,
    pub actual_qty: f64,
    pub slippage_pct: f64,
    pub fill_ratio: f64,
    pub broker_name: String,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationStats {
    pub count: usize,
    pub avg_slippage_pct: f64,
    pub max_slippage_pct: f64,
    pub min_slippage_pct: f64,
    pub avg_fill_ratio: f64,
    pub full_fill_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_slippage_by_broker: HashMap<String, f64>,
}

pub struct Reconciler {
    records: RingLog<ReconciliationRecord>,
}

impl Reconciler {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RingLog::new(capacity),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &self,
        order_id: Uuid,
        symbol: &str,
        expected_price: f64,
        actual_price: f64,
        expected_qty: f64,
        actual_qty: f64,
        broker_name: &str,
        latency_ms: f64,
    ) -> ReconciliationRecord {
        let slippage_pct = if expected_price == 0.0 {
            0.0
        } else {
            (actual_price - expected_price) / expected_price * 100.0
        };
        let fill_ratio = if expected_qty == 0.0 {
            0.0
        } else {
            (actual_qty / expected_qty).clamp(0.0, 1.0)
        };
        let record = ReconciliationRecord {
            record_id: Uuid::new_v4(),
            order_id,
            symbol: symbol.to_string(),
            expected_price,
            actual_price,
            expected_qty,
            actual_qty,
            slippage_pct,
            fill_ratio,
            broker_name: broker_name.to_string(),
            latency_ms,
            timestamp: Utc::now(),
        };
        self.records.push(record.clone());
        record
    }

    pub fn stats(&self) -> ReconciliationStats {
        let records = self.records.snapshot();
        if records.is_empty() {
            return ReconciliationStats::default();
        }

        let count = records.len();
        let slippages: Vec<f64> = records.iter().map(|r| r.slippage_pct).collect();
        let avg_slippage_pct = slippages.iter().sum::<f64>() / count as f64;
        let max_slippage_pct = slippages.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_slippage_pct = slippages.iter().cloned().fold(f64::INFINITY, f64::min);
        let avg_fill_ratio = records.iter().map(|r| r.fill_ratio).sum::<f64>() / count as f64;
        let full_fill_rate = records.iter().filter(|r| r.fill_ratio >= 1.0).count() as f64 / count as f64;
        let avg_latency_ms = records.iter().map(|r| r.latency_ms).sum::<f64>() / count as f64;

        let mut by_broker: HashMap<String, (f64, usize)> = HashMap::new();
        for record in &records {
            let entry = by_broker.entry(record.broker_name.clone()).or_insert((0.0, 0));
            entry.0 += record.slippage_pct;
            entry.1 += 1;
        }
        let avg_slippage_by_broker = by_broker
            .into_iter()
            .map(|(broker, (sum, n))| (broker, sum / n as f64))
            .collect();

        ReconciliationStats {
            count,
            avg_slippage_pct,
            max_slippage_pct,
            min_slippage_pct,
            avg_fill_ratio,
            full_fill_rate,
            avg_latency_ms,
            avg_slippage_by_broker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_and_fill_ratio_match_worked_example() {
        let reconciler = Reconciler::new(100);
        let record = reconciler.submit(Uuid::new_v4(), "AAPL", 185.00, 185.50, 100.0, 100.0, "alpaca", 40.0);
        assert!((record.slippage_pct - 0.27027027).abs() < 1e-5);
        assert_eq!(record.fill_ratio, 1.0);
        assert_eq!(reconciler.stats().full_fill_rate, 1.0);
    }

    #[test]
    fn fill_ratio_is_capped_at_one() {
        let reconciler = Reconciler::new(100);
        let record = reconciler.submit(Uuid::new_v4(), "AAPL", 100.0, 100.0, 10.0, 15.0, "paper", 5.0);
        assert_eq!(record.fill_ratio, 1.0);
    }

    #[test]
    fn per_broker_average_slippage_is_tracked() {
        let reconciler = Reconciler::new(100);
        reconciler.submit(Uuid::new_v4(), "AAPL", 100.0, 101.0, 10.0, 10.0, "alpaca", 10.0);
        reconciler.submit(Uuid::new_v4(), "AAPL", 100.0, 103.0, 10.0, 10.0, "alpaca", 10.0);
        let stats = reconciler.stats();
        assert!((stats.avg_slippage_by_broker["alpaca"] - 2.0).abs() < 1e-9);
    }
}
