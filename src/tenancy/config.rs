//! Config value objects for the multi-tenancy layer.

use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "viewer" => Some(Role::Viewer),
            "editor" => Some(Role::Editor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    None,
    Read,
    Write,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone)]
pub struct TenancyConfig {
    /// Tables exempt from workspace filtering (spec §6).
    pub shared_resource_tables: HashSet<String>,
    pub enforce_row_level_security: bool,
    pub allowed_cross_workspace_roles: HashSet<Role>,
    pub policy_cache_ttl: Duration,
    pub enable_ip_allowlist: bool,
    pub max_workspaces_per_ip: u32,
    pub rate_limit_per_workspace: u32,
    pub rate_limit_window: Duration,
    pub block_cross_tenant_requests: bool,
    pub audit_capacity: usize,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        let shared = [
            "market_data",
            "market_data_daily",
            "exchange_info",
            "symbols",
            "indices",
            "sectors",
            "economic_indicators",
            "benchmark_returns",
            "risk_free_rates",
            "dividends_calendar",
            "earnings_calendar",
        ];
        Self {
            shared_resource_tables: shared.iter().map(|s| s.to_string()).collect(),
            enforce_row_level_security: true,
            allowed_cross_workspace_roles: [Role::Admin].into_iter().collect(),
            policy_cache_ttl: Duration::from_secs(30),
            enable_ip_allowlist: false,
            max_workspaces_per_ip: 5,
            rate_limit_per_workspace: 100,
            rate_limit_window: Duration::from_secs(60),
            block_cross_tenant_requests: true,
            audit_capacity: 10_000,
        }
    }
}
