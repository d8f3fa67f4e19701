//! In-memory position store: open positions, average-entry re-averaging,
//! P&L, and exit-trigger checks. See spec §3, §4.12.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub symbol: String,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub current_price: f64,
    pub side: PositionSide,
    pub signal_type: String,
    pub stop_loss_price: Option<f64>,
    pub target_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub order_ids: Vec<Uuid>,
}

impl TrackedPosition {
    pub fn market_value(&self) -> f64 {
        self.qty.abs() * self.current_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        let diff = self.current_price - self.avg_entry_price;
        match self.side {
            PositionSide::Long => diff * self.qty,
            PositionSide::Short => -diff * self.qty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub qty: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub realized_pnl: f64,
    pub side: PositionSide,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionStoreSnapshot {
    pub positions: HashMap<String, TrackedPosition>,
    pub closed: Vec<ClosedTrade>,
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioSummary {
    pub position_count: usize,
    pub total_market_value: f64,
    pub total_unrealized_pnl: f64,
    pub realized_pnl: f64,
}

pub struct PositionStore {
    positions: HashMap<String, TrackedPosition>,
    closed: Vec<ClosedTrade>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            closed: Vec::new(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&TrackedPosition> {
        self.positions.get(symbol)
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Opens a new long/short position or re-averages into an existing one
    /// on the same side: `new_avg = (old_avg*old_qty + price*qty) / (old_qty+qty)`.
    pub fn open(
        &mut self,
        symbol: &str,
        qty: f64,
        price: f64,
        side: PositionSide,
        signal_type: &str,
        order_id: Uuid,
        stop_loss_price: Option<f64>,
        target_price: Option<f64>,
    ) {
        if let Some(existing) = self.positions.get_mut(symbol) {
            let new_qty = existing.qty + qty;
            existing.avg_entry_price = (existing.avg_entry_price * existing.qty + price * qty) / new_qty;
            existing.qty = new_qty;
            existing.current_price = price;
            existing.order_ids.push(order_id);
        } else {
            self.positions.insert(
                symbol.to_string(),
                TrackedPosition {
                    symbol: symbol.to_string(),
                    qty,
                    avg_entry_price: price,
                    current_price: price,
                    side,
                    signal_type: signal_type.to_string(),
                    stop_loss_price,
                    target_price,
                    opened_at: Utc::now(),
                    order_ids: vec![order_id],
                },
            );
        }
    }

    /// Realizes partial P&L on a reduction; closes the position on zero.
    pub fn reduce(&mut self, symbol: &str, qty: f64, exit_price: f64) -> Option<f64> {
        let position = self.positions.get_mut(symbol)?;
        let reduce_qty = qty.min(position.qty);
        let diff = exit_price - position.avg_entry_price;
        let realized = match position.side {
            PositionSide::Long => diff * reduce_qty,
            PositionSide::Short => -diff * reduce_qty,
        };
        position.qty -= reduce_qty;

        let side = position.side;
        let entry_price = position.avg_entry_price;
        if position.qty <= 1e-9 {
            self.positions.remove(symbol);
        }
        self.closed.push(ClosedTrade {
            symbol: symbol.to_string(),
            qty: reduce_qty,
            entry_price,
            exit_price,
            realized_pnl: realized,
            side,
            closed_at: Utc::now(),
        });
        Some(realized)
    }

    pub fn close(&mut self, symbol: &str, exit_price: f64) -> Option<f64> {
        let qty = self.positions.get(symbol)?.qty;
        self.reduce(symbol, qty, exit_price)
    }

    pub fn update_prices(&mut self, prices: &HashMap<String, f64>) {
        for (symbol, price) in prices {
            if let Some(position) = self.positions.get_mut(symbol) {
                position.current_price = *price;
            }
        }
    }

    /// Returns symbols whose current price has crossed a stop or target.
    pub fn check_exits(&self) -> Vec<String> {
        self.positions
            .values()
            .filter(|p| {
                let hit_stop = p
                    .stop_loss_price
                    .map(|stop| match p.side {
                        PositionSide::Long => p.current_price <= stop,
                        PositionSide::Short => p.current_price >= stop,
                    })
                    .unwrap_or(false);
                let hit_target = p
                    .target_price
                    .map(|target| match p.side {
                        PositionSide::Long => p.current_price >= target,
                        PositionSide::Short => p.current_price <= target,
                    })
                    .unwrap_or(false);
                hit_stop || hit_target
            })
            .map(|p| p.symbol.clone())
            .collect()
    }

    pub fn portfolio_summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            position_count: self.positions.len(),
            total_market_value: self.positions.values().map(|p| p.market_value()).sum(),
            total_unrealized_pnl: self.positions.values().map(|p| p.unrealized_pnl()).sum(),
            realized_pnl: self.closed.iter().map(|c| c.realized_pnl).sum(),
        }
    }

    pub fn to_json(&self) -> PositionStoreSnapshot {
        PositionStoreSnapshot {
            positions: self.positions.clone(),
            closed: self.closed.clone(),
        }
    }

    pub fn from_json(snapshot: PositionStoreSnapshot) -> Self {
        Self {
            positions: snapshot.positions,
            closed: snapshot.closed,
        }
    }
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}
