//! Config value objects for the capacity control plane.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Cpu,
    Memory,
    QueueDepth,
    ApiCalls,
    DiskIo,
    NetworkIo,
}

#[derive(Debug, Clone)]
pub struct CapacityConfig {
    pub warning_threshold_pct: f64,
    pub critical_threshold_pct: f64,
    pub scale_down_threshold_pct: f64,
    pub enable_auto_scaling: bool,
    pub max_scaling_actions_per_hour: u32,
    pub savings_utilization_threshold_pct: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            warning_threshold_pct: 70.0,
            critical_threshold_pct: 90.0,
            scale_down_threshold_pct: 30.0,
            enable_auto_scaling: true,
            max_scaling_actions_per_hour: 6,
            savings_utilization_threshold_pct: 50.0,
        }
    }
}
