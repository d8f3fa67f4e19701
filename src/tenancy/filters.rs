//! Query filter: injects a workspace predicate into query parameters and
//! audits every decision. See spec §4.6.

use super::config::TenancyConfig;
use super::context::TenantContext;
use crate::audit::RingLog;
use crate::error::CoreError;
use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct QueryAuditEntry {
    pub table: String,
    pub workspace_id: Option<String>,
    pub allowed: bool,
    pub reason: String,
    pub timestamp: SystemTime,
}

pub struct QueryFilter {
    config: TenancyConfig,
    audit: RingLog<QueryAuditEntry>,
    audit_enabled: bool,
}

impl QueryFilter {
    pub fn new(config: TenancyConfig) -> Self {
        let audit = RingLog::new(config.audit_capacity);
        Self {
            config,
            audit,
            audit_enabled: true,
        }
    }

    pub fn set_audit_enabled(&mut self, enabled: bool) {
        self.audit_enabled = enabled;
    }

    fn record(&self, table: &str, workspace_id: Option<&str>, allowed: bool, reason: &str) {
        if !self.audit_enabled {
            return;
        }
        self.audit.push(QueryAuditEntry {
            table: table.to_string(),
            workspace_id: workspace_id.map(String::from),
            allowed,
            reason: reason.to_string(),
            timestamp: SystemTime::now(),
        });
    }

    pub fn audit_log(&self) -> Vec<QueryAuditEntry> {
        self.audit.snapshot()
    }

    /// Produces a new params map with `workspace_id` injected/validated.
    pub fn filter(
        &self,
        table: &str,
        params: &HashMap<String, String>,
        ctx: Option<&TenantContext>,
    ) -> Result<HashMap<String, String>, CoreError> {
        if self.config.shared_resource_tables.contains(table) {
            self.record(table, None, true, "shared resource table");
            return Ok(params.clone());
        }

        let Some(ctx) = ctx else {
            if self.config.enforce_row_level_security {
                self.record(table, None, false, "no tenant context");
                return Err(CoreError::PermissionDenied {
                    reason: "no tenant context".into(),
                });
            }
            self.record(table, None, true, "row-level security not enforced");
            return Ok(params.clone());
        };

        let mut out = params.clone();
        if let Some(requested_ws) = params.get("workspace_id") {
            if requested_ws != &ctx.workspace_id {
                let can_cross_workspace = ctx
                    .roles
                    .iter()
                    .any(|r| self.config.allowed_cross_workspace_roles.contains(r));
                if !can_cross_workspace {
                    self.record(table, Some(requested_ws), false, "cross-workspace access denied");
                    return Err(CoreError::PermissionDenied {
                        reason: "cross-workspace access denied".into(),
                    });
                }
                out.insert("workspace_id".to_string(), ctx.workspace_id.clone());
                self.record(table, Some(requested_ws), true, "cross-workspace allowed by role");
                return Ok(out);
            }
        }

        out.insert("workspace_id".to_string(), ctx.workspace_id.clone());
        self.record(table, Some(&ctx.workspace_id), true, "scoped to own workspace");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::config::Role;

    fn ctx(ws: &str, roles: Vec<Role>) -> TenantContext {
        TenantContext::new(ws, "u1", roles)
    }

    #[test]
    fn shared_resource_table_passes_through_unmodified() {
        let filter = QueryFilter::new(TenancyConfig::default());
        let params = HashMap::new();
        let out = filter.filter("market_data", &params, None).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn no_context_denies_when_rls_enforced() {
        let filter = QueryFilter::new(TenancyConfig::default());
        let err = filter.filter("portfolios", &HashMap::new(), None).unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));
    }

    #[test]
    fn own_workspace_is_injected() {
        let filter = QueryFilter::new(TenancyConfig::default());
        let c = ctx("ws_a", vec![Role::Viewer]);
        let out = filter.filter("portfolios", &HashMap::new(), Some(&c)).unwrap();
        assert_eq!(out.get("workspace_id"), Some(&"ws_a".to_string()));
    }

    #[test]
    fn cross_workspace_denied_for_viewer_allowed_for_admin() {
        let filter = QueryFilter::new(TenancyConfig::default());
        let mut params = HashMap::new();
        params.insert("workspace_id".to_string(), "ws_b".to_string());

        let viewer = ctx("ws_a", vec![Role::Viewer]);
        let err = filter.filter("portfolios", &params, Some(&viewer)).unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));

        let admin = ctx("ws_a", vec![Role::Admin]);
        let out = filter.filter("portfolios", &params, Some(&admin)).unwrap();
        assert_eq!(out.get("workspace_id"), Some(&"ws_a".to_string()));
    }
}
