//! Capacity control plane: resource telemetry, demand forecasting,
//! scaling decisions, and cost analysis. See spec §4.13-4.16.

pub mod config;
pub mod cost;
pub mod forecaster;
pub mod monitor;
pub mod scaling;

pub use config::{CapacityConfig, ResourceType};
pub use cost::{CostAnalyzer, PeriodCost, RightSizeAction, RightSizingRecommendation, SavingsOpportunity};
pub use forecaster::{DemandForecast, ForecastPoint, Forecaster};
pub use monitor::{HealthStatus, ResourceMetric, ResourceMonitor, ResourceSnapshot};
pub use scaling::{ScalingAction, ScalingDirection, ScalingManager, ScalingRule, ScalingThresholds};
