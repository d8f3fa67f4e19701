//! Resource telemetry ingestion with a health rollup. See spec §3, §4.13.

use super::config::{CapacityConfig, ResourceType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ResourceMetric {
    pub metric_id: Uuid,
    pub resource_type: ResourceType,
    pub current_value: f64,
    pub capacity: f64,
    pub utilization_pct: f64,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl ResourceMetric {
    pub fn new(resource_type: ResourceType, current_value: f64, capacity: f64, service: impl Into<String>) -> Self {
        let utilization_pct = if capacity > 0.0 {
            current_value / capacity * 100.0
        } else {
            0.0
        };
        Self {
            metric_id: Uuid::new_v4(),
            resource_type,
            current_value,
            capacity,
            utilization_pct,
            service: service.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    OverProvisioned,
}

#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    pub latest: Vec<ResourceMetric>,
    pub health: HealthStatus,
}

pub struct ResourceMonitor {
    config: CapacityConfig,
    log: Mutex<Vec<ResourceMetric>>,
}

impl ResourceMonitor {
    pub fn new(config: CapacityConfig) -> Self {
        Self {
            config,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, metric: ResourceMetric) {
        self.log.lock().push(metric);
    }

    pub fn history(&self, resource_type: ResourceType, service: &str, limit: usize) -> Vec<ResourceMetric> {
        let log = self.log.lock();
        log.iter()
            .filter(|m| m.resource_type == resource_type && m.service == service)
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    fn latest_per_key(&self) -> Vec<ResourceMetric> {
        let log = self.log.lock();
        let mut latest: HashMap<(ResourceType, String), ResourceMetric> = HashMap::new();
        for metric in log.iter() {
            let key = (metric.resource_type, metric.service.clone());
            match latest.get(&key) {
                Some(existing) if existing.timestamp >= metric.timestamp => {}
                _ => {
                    latest.insert(key, metric.clone());
                }
            }
        }
        latest.into_values().collect()
    }

    pub fn take_snapshot(&self) -> ResourceSnapshot {
        let latest = self.latest_per_key();
        let health = if latest.iter().any(|m| m.utilization_pct >= self.config.critical_threshold_pct) {
            HealthStatus::Critical
        } else if latest.iter().any(|m| m.utilization_pct >= self.config.warning_threshold_pct) {
            HealthStatus::Warning
        } else if !latest.is_empty()
            && latest.iter().all(|m| m.utilization_pct <= self.config.scale_down_threshold_pct)
        {
            HealthStatus::OverProvisioned
        } else {
            HealthStatus::Healthy
        };
        ResourceSnapshot { latest, health }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_is_derived_when_not_given() {
        let metric = ResourceMetric::new(ResourceType::Cpu, 80.0, 100.0, "api");
        assert!((metric.utilization_pct - 80.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_rolls_up_to_critical_when_any_metric_crosses() {
        let monitor = ResourceMonitor::new(CapacityConfig::default());
        monitor.record(ResourceMetric::new(ResourceType::Cpu, 95.0, 100.0, "api"));
        monitor.record(ResourceMetric::new(ResourceType::Memory, 10.0, 100.0, "api"));
        assert_eq!(monitor.take_snapshot().health, HealthStatus::Critical);
    }

    #[test]
    fn snapshot_is_over_provisioned_when_all_metrics_below_scale_down() {
        let monitor = ResourceMonitor::new(CapacityConfig::default());
        monitor.record(ResourceMetric::new(ResourceType::Cpu, 5.0, 100.0, "api"));
        assert_eq!(monitor.take_snapshot().health, HealthStatus::OverProvisioned);
    }
}
