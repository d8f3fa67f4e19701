//! Role-hierarchy-aware policy engine with a TTL-cached evaluator.
//! See spec §4.7.

use super::config::{AccessLevel, PolicyAction, Role, TenancyConfig};
use super::context::TenantContext;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Policy {
    pub policy_id: String,
    /// `None` means global (applies to every workspace).
    pub workspace_id: Option<String>,
    pub resource_type: String,
    pub role: Role,
    pub access_level: AccessLevel,
    pub action: PolicyAction,
    pub priority: i32,
    pub conditions: HashMap<String, Vec<String>>,
    pub enabled: bool,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct PolicyEvaluation {
    pub allowed: bool,
    pub policy_id: Option<String>,
    pub reason: String,
    pub access_level: AccessLevel,
    pub evaluated_policies: usize,
    pub cached: bool,
    pub elapsed_ms: f64,
}

#[derive(Hash, Eq, PartialEq, Clone)]
struct CacheKey {
    workspace_id: String,
    roles: Vec<String>,
    resource_type: String,
    requested_level: u8,
}

struct CacheEntry {
    evaluation: PolicyEvaluation,
    inserted_at: Instant,
}

pub struct PolicyEngine {
    config: TenancyConfig,
    policies: Mutex<Vec<Policy>>,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
}

fn level_rank(level: AccessLevel) -> u8 {
    match level {
        AccessLevel::None => 0,
        AccessLevel::Read => 1,
        AccessLevel::Write => 2,
        AccessLevel::Admin => 3,
    }
}

impl PolicyEngine {
    pub fn new(config: TenancyConfig) -> Self {
        Self {
            config,
            policies: Mutex::new(Vec::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_policy(&self, policy: Policy) {
        self.policies.lock().push(policy);
        self.cache.lock().clear();
    }

    pub fn remove_policy(&self, policy_id: &str) {
        self.policies.lock().retain(|p| p.policy_id != policy_id);
        self.cache.lock().clear();
    }

    fn matches(&self, policy: &Policy, ctx: &TenantContext, resource_type: &str) -> bool {
        if !policy.enabled {
            return false;
        }
        if let Some(ws) = &policy.workspace_id {
            if ws != &ctx.workspace_id {
                return false;
            }
        }
        if policy.resource_type != resource_type {
            return false;
        }
        let Some(highest) = ctx.highest_role() else {
            return false;
        };
        if policy.role > highest {
            return false;
        }
        policy.conditions.iter().all(|(key, allowed_values)| {
            ctx.permissions
                .get(key)
                .map(|v| allowed_values.iter().any(|allowed| allowed == v))
                .unwrap_or(false)
        })
    }

    fn evaluate_uncached(
        &self,
        ctx: &TenantContext,
        resource_type: &str,
        requested_level: AccessLevel,
    ) -> PolicyEvaluation {
        let start = Instant::now();
        let policies = self.policies.lock();
        let mut matched: Vec<&Policy> = policies
            .iter()
            .filter(|p| self.matches(p, ctx, resource_type))
            .collect();

        matched.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| {
                // DENY before ALLOW at equal priority.
                let rank = |action: PolicyAction| if action == PolicyAction::Deny { 0 } else { 1 };
                rank(a.action).cmp(&rank(b.action))
            })
        });

        let evaluated_policies = matched.len();
        let evaluation = match matched.first() {
            None => PolicyEvaluation {
                allowed: false,
                policy_id: None,
                reason: "no matching policy".into(),
                access_level: AccessLevel::None,
                evaluated_policies,
                cached: false,
                elapsed_ms: 0.0,
            },
            Some(top) if top.action == PolicyAction::Deny => PolicyEvaluation {
                allowed: false,
                policy_id: Some(top.policy_id.clone()),
                reason: format!("denied by policy {}", top.policy_id),
                access_level: AccessLevel::None,
                evaluated_policies,
                cached: false,
                elapsed_ms: 0.0,
            },
            Some(top) => {
                let allowed = level_rank(top.access_level) >= level_rank(requested_level);
                PolicyEvaluation {
                    allowed,
                    policy_id: Some(top.policy_id.clone()),
                    reason: if allowed {
                        format!("allowed by policy {}", top.policy_id)
                    } else {
                        format!("policy {} grants insufficient access", top.policy_id)
                    },
                    access_level: top.access_level,
                    evaluated_policies,
                    cached: false,
                    elapsed_ms: 0.0,
                }
            }
        };

        PolicyEvaluation {
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            ..evaluation
        }
    }

    pub fn evaluate(
        &self,
        ctx: &TenantContext,
        resource_type: &str,
        requested_level: AccessLevel,
    ) -> PolicyEvaluation {
        let mut sorted_roles: Vec<String> = ctx.roles.iter().map(|r| r.as_str().to_string()).collect();
        sorted_roles.sort();
        let key = CacheKey {
            workspace_id: ctx.workspace_id.clone(),
            roles: sorted_roles,
            resource_type: resource_type.to_string(),
            requested_level: level_rank(requested_level),
        };

        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(&key) {
                if entry.inserted_at.elapsed() < self.config.policy_cache_ttl {
                    return PolicyEvaluation {
                        cached: true,
                        ..entry.evaluation.clone()
                    };
                }
            }
        }

        let evaluation = self.evaluate_uncached(ctx, resource_type, requested_level);
        self.cache.lock().insert(
            key,
            CacheEntry {
                evaluation: evaluation.clone(),
                inserted_at: Instant::now(),
            },
        );
        evaluation
    }

    /// Probes ADMIN -> WRITE -> READ and returns the highest granted level.
    pub fn get_effective_access(&self, ctx: &TenantContext, resource_type: &str) -> AccessLevel {
        for level in [AccessLevel::Admin, AccessLevel::Write, AccessLevel::Read] {
            if self.evaluate(ctx, resource_type, level).allowed {
                return level;
            }
        }
        AccessLevel::None
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(id: &str, role: Role, level: AccessLevel, action: PolicyAction, priority: i32) -> Policy {
        Policy {
            policy_id: id.to_string(),
            workspace_id: None,
            resource_type: "portfolios".to_string(),
            role,
            access_level: level,
            action,
            priority,
            conditions: HashMap::new(),
            enabled: true,
            description: String::new(),
        }
    }

    #[test]
    fn no_matching_policy_denies() {
        let engine = PolicyEngine::new(TenancyConfig::default());
        let ctx = TenantContext::new("ws_a", "u1", vec![Role::Viewer]);
        let eval = engine.evaluate(&ctx, "portfolios", AccessLevel::Read);
        assert!(!eval.allowed);
        assert_eq!(eval.reason, "no matching policy");
    }

    #[test]
    fn viewer_policy_grants_editor_and_admin_too() {
        let engine = PolicyEngine::new(TenancyConfig::default());
        engine.add_policy(policy("p1", Role::Viewer, AccessLevel::Read, PolicyAction::Allow, 1));
        let admin_ctx = TenantContext::new("ws_a", "u1", vec![Role::Admin]);
        assert!(engine.evaluate(&admin_ctx, "portfolios", AccessLevel::Read).allowed);
    }

    #[test]
    fn deny_wins_tie_break_at_equal_priority() {
        let engine = PolicyEngine::new(TenancyConfig::default());
        engine.add_policy(policy("allow", Role::Viewer, AccessLevel::Admin, PolicyAction::Allow, 1));
        engine.add_policy(policy("deny", Role::Viewer, AccessLevel::None, PolicyAction::Deny, 1));
        let ctx = TenantContext::new("ws_a", "u1", vec![Role::Viewer]);
        let eval = engine.evaluate(&ctx, "portfolios", AccessLevel::Read);
        assert!(!eval.allowed);
        assert_eq!(eval.policy_id, Some("deny".to_string()));
    }

    #[test]
    fn mutation_invalidates_cache() {
        let engine = PolicyEngine::new(TenancyConfig::default());
        let ctx = TenantContext::new("ws_a", "u1", vec![Role::Admin]);
        engine.evaluate(&ctx, "portfolios", AccessLevel::Read);
        assert_eq!(engine.cache_len(), 1);
        engine.add_policy(policy("p1", Role::Viewer, AccessLevel::Read, PolicyAction::Allow, 1));
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn effective_access_probes_highest_first() {
        let engine = PolicyEngine::new(TenancyConfig::default());
        engine.add_policy(policy("p1", Role::Viewer, AccessLevel::Write, PolicyAction::Allow, 1));
        let ctx = TenantContext::new("ws_a", "u1", vec![Role::Viewer]);
        assert_eq!(engine.get_effective_access(&ctx, "portfolios"), AccessLevel::Write);
    }
}
