//! Scaling manager: rule evaluation, cooldowns, and the action log.
//! See spec §3, §4.15.

use super::config::{CapacityConfig, ResourceType};
use super::monitor::ResourceMetric;
use crate::audit::RingLog;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScalingThresholds {
    pub warning: f64,
    pub critical: f64,
    pub scale_up: f64,
    pub scale_down: f64,
    pub cooldown_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ScalingRule {
    pub rule_id: String,
    pub resource_type: ResourceType,
    pub service: String,
    pub thresholds: ScalingThresholds,
    pub min_instances: u32,
    pub max_instances: u32,
    pub current_instances: u32,
    pub enabled: bool,
    pub last_action_time: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDirection {
    ScaleUp,
    ScaleDown,
    ScaleOut,
    ScaleIn,
    NoAction,
}

#[derive(Debug, Clone)]
pub struct ScalingAction {
    pub action_id: Uuid,
    pub rule_id: String,
    pub direction: ScalingDirection,
    pub from_value: u32,
    pub to_value: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub executed: bool,
    pub success: bool,
}

pub struct ScalingManager {
    config: CapacityConfig,
    rules: Mutex<HashMap<String, ScalingRule>>,
    action_log: RingLog<ScalingAction>,
    action_times: Mutex<Vec<Instant>>,
}

impl ScalingManager {
    pub fn new(config: CapacityConfig) -> Self {
        Self {
            config,
            rules: Mutex::new(HashMap::new()),
            action_log: RingLog::new(10_000),
            action_times: Mutex::new(Vec::new()),
        }
    }

    pub fn add_rule(&self, rule: ScalingRule) {
        self.rules.lock().insert(rule.rule_id.clone(), rule);
    }

    pub fn rule(&self, rule_id: &str) -> Option<ScalingRule> {
        self.rules.lock().get(rule_id).cloned()
    }

    pub fn action_log(&self) -> Vec<ScalingAction> {
        self.action_log.snapshot()
    }

    fn actions_in_last_hour(&self) -> usize {
        let mut times = self.action_times.lock();
        times.retain(|t| t.elapsed() < Duration::from_secs(3600));
        times.len()
    }

    /// Evaluates `metric` against `rule_id`'s thresholds and, if the auto
    /// scaling gate and hourly cap allow it, applies the resulting action.
    pub fn process_metric(&self, rule_id: &str, metric: &ResourceMetric) -> Option<ScalingAction> {
        let mut rules = self.rules.lock();
        let rule = rules.get_mut(rule_id)?;

        if let Some(last) = rule.last_action_time {
            if last.elapsed() < Duration::from_secs(rule.thresholds.cooldown_seconds) {
                return Some(self.log_action(rule, ScalingDirection::NoAction, rule.current_instances, "within cooldown", false, false));
            }
        }

        let direction = if metric.utilization_pct >= rule.thresholds.scale_up {
            ScalingDirection::ScaleOut
        } else if metric.utilization_pct <= rule.thresholds.scale_down {
            ScalingDirection::ScaleIn
        } else {
            ScalingDirection::NoAction
        };

        if direction == ScalingDirection::NoAction {
            return Some(self.log_action(rule, direction, rule.current_instances, "utilization within bounds", false, false));
        }

        let from_value = rule.current_instances;
        let to_value = match direction {
            ScalingDirection::ScaleOut => (from_value + 1).min(rule.max_instances),
            ScalingDirection::ScaleIn => from_value.saturating_sub(1).max(rule.min_instances),
            _ => from_value,
        };

        if !self.config.enable_auto_scaling {
            return Some(self.log_action(rule, direction, to_value, "auto-scaling disabled", false, false));
        }
        if self.actions_in_last_hour() as u32 >= self.config.max_scaling_actions_per_hour {
            return Some(self.log_action(rule, direction, to_value, "hourly scaling action cap reached", false, false));
        }

        let success = to_value != from_value;
        rule.current_instances = to_value;
        rule.last_action_time = Some(Instant::now());
        self.action_times.lock().push(Instant::now());

        let reason = if success {
            format!("{direction:?} from {from_value} to {to_value}")
        } else {
            "target already at instance bound".to_string()
        };
        Some(self.log_action(rule, direction, to_value, &reason, true, success))
    }

    fn log_action(
        &self,
        rule: &ScalingRule,
        direction: ScalingDirection,
        to_value: u32,
        reason: &str,
        executed: bool,
        success: bool,
    ) -> ScalingAction {
        let action = ScalingAction {
            action_id: Uuid::new_v4(),
            rule_id: rule.rule_id.clone(),
            direction,
            from_value: rule.current_instances,
            to_value,
            reason: reason.to_string(),
            timestamp: Utc::now(),
            executed,
            success,
        };
        self.action_log.push(action.clone());
        action
    }
}
