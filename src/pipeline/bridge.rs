//! Signal bridge: normalizes three heterogeneous signal shapes into a
//! single `PipelineOrder`. See spec §4.9.

use super::{OrderType, PipelineOrder, Side};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

/// A fusion-model trade recommendation (e.g. `"STRONG_BUY"`, `"SELL"`).
#[derive(Debug, Clone)]
pub struct FusionRecommendation {
    pub symbol: String,
    pub action: String,
    pub confidence: f64,
    pub position_size_pct: f64,
    pub asset_type: String,
    pub reference_price: f64,
    pub reasoning: Option<String>,
}

/// A social-trading consensus signal; confidence is on a 0-100 scale.
#[derive(Debug, Clone)]
pub struct SocialTradingSignal {
    pub symbol: String,
    pub action: String,
    pub confidence: f64,
    pub reference_price: f64,
    pub asset_type: String,
}

/// An EMA-crossover style trade signal with stop/target prices.
#[derive(Debug, Clone)]
pub struct EmaTradeSignal {
    pub symbol: String,
    pub conviction: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: Option<f64>,
    pub asset_type: String,
}

fn side_from_action(action: &str) -> Option<Side> {
    let action = action.to_uppercase();
    if action.contains("BUY") {
        Some(Side::Buy)
    } else if action.contains("SELL") {
        Some(Side::Sell)
    } else {
        None
    }
}

/// `floor(equity * pct / price)`, floored at 1 share.
pub fn share_count(equity: f64, position_size_pct: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 1.0;
    }
    ((equity * position_size_pct / 100.0) / price).floor().max(1.0)
}

pub struct SignalBridge {
    pub equity: f64,
}

impl SignalBridge {
    pub fn new(equity: f64) -> Self {
        Self { equity }
    }

    pub fn from_fusion(&self, signal: &FusionRecommendation) -> Option<PipelineOrder> {
        let side = side_from_action(&signal.action)?;
        let is_strong = signal.action.to_uppercase().starts_with("STRONG_");
        let order_type = if is_strong { OrderType::Market } else { OrderType::Limit };
        let qty = share_count(self.equity, signal.position_size_pct, signal.reference_price);

        Some(PipelineOrder {
            order_id: Uuid::new_v4(),
            symbol: signal.symbol.clone(),
            side,
            order_type,
            qty,
            limit_price: (order_type == OrderType::Limit).then_some(signal.reference_price),
            stop_price: None,
            asset_type: signal.asset_type.clone(),
            signal_type: "fusion".to_string(),
            confidence: signal.confidence,
            position_size_pct: signal.position_size_pct,
            stop_loss_pct: None,
            take_profit_pct: None,
            time_horizon: None,
            risk_level: None,
            reasoning: signal.reasoning.clone(),
            source_data: json!({ "action": signal.action }),
            created_at: Utc::now(),
        })
    }

    pub fn from_social(&self, signal: &SocialTradingSignal) -> Option<PipelineOrder> {
        let side = side_from_action(&signal.action)?;
        let confidence = (signal.confidence / 100.0).clamp(0.0, 1.0);
        let position_size_pct = (confidence * 12.0).clamp(2.0, 10.0);
        let qty = share_count(self.equity, position_size_pct, signal.reference_price);

        Some(PipelineOrder {
            order_id: Uuid::new_v4(),
            symbol: signal.symbol.clone(),
            side,
            order_type: OrderType::Limit,
            qty,
            limit_price: Some(signal.reference_price),
            stop_price: None,
            asset_type: signal.asset_type.clone(),
            signal_type: "social".to_string(),
            confidence,
            position_size_pct,
            stop_loss_pct: None,
            take_profit_pct: None,
            time_horizon: None,
            risk_level: None,
            reasoning: None,
            source_data: json!({ "action": signal.action, "raw_confidence": signal.confidence }),
            created_at: Utc::now(),
        })
    }

    pub fn from_ema(&self, signal: &EmaTradeSignal) -> Option<PipelineOrder> {
        if signal.conviction < 30.0 {
            return None;
        }
        let order_type = if signal.conviction >= 70.0 {
            OrderType::Market
        } else {
            OrderType::Limit
        };
        let confidence = (signal.conviction / 100.0).clamp(0.0, 1.0);
        let stop_loss_pct = ((signal.entry_price - signal.stop_price).abs() / signal.entry_price) * 100.0;
        let risk = (signal.entry_price - signal.stop_price).abs();
        let take_profit_pct = match signal.target_price {
            Some(target) => ((target - signal.entry_price).abs() / signal.entry_price) * 100.0,
            None => (risk * 2.0 / signal.entry_price) * 100.0,
        };
        let qty = share_count(self.equity, 5.0, signal.entry_price);

        Some(PipelineOrder {
            order_id: Uuid::new_v4(),
            symbol: signal.symbol.clone(),
            side: Side::Buy,
            order_type,
            qty,
            limit_price: (order_type == OrderType::Limit).then_some(signal.entry_price),
            stop_price: Some(signal.stop_price),
            asset_type: signal.asset_type.clone(),
            signal_type: "ema".to_string(),
            confidence,
            position_size_pct: 5.0,
            stop_loss_pct: Some(stop_loss_pct),
            take_profit_pct: Some(take_profit_pct),
            time_horizon: None,
            risk_level: None,
            reasoning: None,
            source_data: json!({ "conviction": signal.conviction }),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_action_produces_market_order() {
        let bridge = SignalBridge::new(100_000.0);
        let signal = FusionRecommendation {
            symbol: "AAPL".into(),
            action: "STRONG_BUY".into(),
            confidence: 0.9,
            position_size_pct: 5.0,
            asset_type: "equity".into(),
            reference_price: 100.0,
            reasoning: None,
        };
        let order = bridge.from_fusion(&signal).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.side, Side::Buy);
    }

    #[test]
    fn plain_action_produces_limit_order() {
        let bridge = SignalBridge::new(100_000.0);
        let signal = FusionRecommendation {
            symbol: "AAPL".into(),
            action: "BUY".into(),
            confidence: 0.6,
            position_size_pct: 5.0,
            asset_type: "equity".into(),
            reference_price: 100.0,
            reasoning: None,
        };
        let order = bridge.from_fusion(&signal).unwrap();
        assert_eq!(order.order_type, OrderType::Limit);
    }

    #[test]
    fn social_signal_scales_position_size_between_2_and_10_pct() {
        let bridge = SignalBridge::new(100_000.0);
        let signal = SocialTradingSignal {
            symbol: "TSLA".into(),
            action: "buy".into(),
            confidence: 50.0,
            reference_price: 200.0,
            asset_type: "equity".into(),
        };
        let order = bridge.from_social(&signal).unwrap();
        assert!((order.position_size_pct - 6.0).abs() < 1e-9);
    }

    #[test]
    fn ema_signal_below_30_conviction_produces_no_order() {
        let bridge = SignalBridge::new(100_000.0);
        let signal = EmaTradeSignal {
            symbol: "MSFT".into(),
            conviction: 20.0,
            entry_price: 300.0,
            stop_price: 290.0,
            target_price: None,
            asset_type: "equity".into(),
        };
        assert!(bridge.from_ema(&signal).is_none());
    }

    #[test]
    fn ema_signal_default_take_profit_is_2to1() {
        let bridge = SignalBridge::new(100_000.0);
        let signal = EmaTradeSignal {
            symbol: "MSFT".into(),
            conviction: 80.0,
            entry_price: 300.0,
            stop_price: 290.0,
            target_price: None,
            asset_type: "equity".into(),
        };
        let order = bridge.from_ema(&signal).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        let stop_pct = order.stop_loss_pct.unwrap();
        let tp_pct = order.take_profit_pct.unwrap();
        assert!((tp_pct - stop_pct * 2.0).abs() < 1e-6);
    }

    #[test]
    fn share_count_floors_and_has_minimum_of_one() {
        assert_eq!(share_count(1_000.0, 1.0, 500.0), 1.0);
        assert_eq!(share_count(100_000.0, 5.0, 101.0), 49.0);
    }
}
