//! Cost analyzer: period costs, savings opportunities, right-sizing, and
//! efficiency scoring. See spec §4.16.

use super::config::{CapacityConfig, ResourceType};
use std::collections::HashMap;

const MONTHLY_COMPOUND_GROWTH: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct ResourceCostInput {
    pub resource_type: ResourceType,
    pub service: String,
    pub hourly_rate: f64,
    pub avg_utilization_pct: f64,
}

#[derive(Debug, Clone)]
pub struct PeriodCost {
    pub service: String,
    pub hourly: f64,
    pub daily: f64,
    pub monthly: f64,
}

#[derive(Debug, Clone)]
pub struct SavingsOpportunity {
    pub service: String,
    pub current_monthly_cost: f64,
    pub recommended_monthly_cost: f64,
    pub estimated_savings: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightSizeAction {
    Downsize,
    Upsize,
    Maintain,
}

#[derive(Debug, Clone)]
pub struct RightSizingRecommendation {
    pub service: String,
    pub action: RightSizeAction,
}

pub struct CostAnalyzer {
    config: CapacityConfig,
}

impl CostAnalyzer {
    pub fn new(config: CapacityConfig) -> Self {
        Self { config }
    }

    pub fn period_costs(&self, inputs: &[ResourceCostInput]) -> Vec<PeriodCost> {
        inputs
            .iter()
            .map(|input| PeriodCost {
                service: input.service.clone(),
                hourly: input.hourly_rate,
                daily: input.hourly_rate * 24.0,
                monthly: input.hourly_rate * 730.0,
            })
            .collect()
    }

    pub fn savings_opportunities(&self, inputs: &[ResourceCostInput]) -> Vec<SavingsOpportunity> {
        inputs
            .iter()
            .filter(|input| input.avg_utilization_pct < self.config.savings_utilization_threshold_pct)
            .map(|input| {
                let current_monthly_cost = input.hourly_rate * 730.0;
                let factor = (input.avg_utilization_pct / 100.0).max(0.1) + 0.2;
                let recommended_monthly_cost = current_monthly_cost * factor;
                SavingsOpportunity {
                    service: input.service.clone(),
                    current_monthly_cost,
                    recommended_monthly_cost,
                    estimated_savings: current_monthly_cost - recommended_monthly_cost,
                }
            })
            .collect()
    }

    pub fn right_sizing_recommendations(&self, inputs: &[ResourceCostInput]) -> Vec<RightSizingRecommendation> {
        inputs
            .iter()
            .map(|input| {
                let action = if input.avg_utilization_pct < 30.0 {
                    RightSizeAction::Downsize
                } else if input.avg_utilization_pct > 80.0 {
                    RightSizeAction::Upsize
                } else {
                    RightSizeAction::Maintain
                };
                RightSizingRecommendation {
                    service: input.service.clone(),
                    action,
                }
            })
            .collect()
    }

    pub fn efficiency_score(&self, inputs: &[ResourceCostInput]) -> f64 {
        if inputs.is_empty() {
            return 0.0;
        }
        let avg_util = inputs.iter().map(|i| i.avg_utilization_pct).sum::<f64>() / inputs.len() as f64;
        (100.0 - 1.5 * (avg_util - 65.0).abs()).max(0.0)
    }

    /// 5%-monthly compound cost projection `months` forward per service.
    pub fn project_costs(&self, inputs: &[ResourceCostInput], months: u32) -> HashMap<String, f64> {
        inputs
            .iter()
            .map(|input| {
                let monthly = input.hourly_rate * 730.0;
                let projected = monthly * (1.0 + MONTHLY_COMPOUND_GROWTH).powi(months as i32);
                (input.service.clone(), projected)
            })
            .collect()
    }
}
