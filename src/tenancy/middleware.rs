//! Isolation middleware: extracts tenant identity from ingress headers and
//! enforces IP allowlisting, per-IP workspace fan-out caps, per-workspace
//! rate limiting, and cross-tenant blocking. See spec §4.8, §6.

use super::config::{Role, TenancyConfig};
use super::context::{ContextManager, TenantContext};
use crate::audit::RingLog;
use crate::error::CoreError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

#[derive(Debug, Clone)]
pub struct MiddlewareAuditEntry {
    pub workspace_id: Option<String>,
    pub user_id: Option<String>,
    pub action: &'static str,
    pub ip: Option<IpAddr>,
    pub allowed: bool,
    pub reason: String,
    pub timestamp: SystemTime,
}

struct MutableState {
    ip_workspaces: HashMap<IpAddr, HashSet<String>>,
    workspace_hits: HashMap<String, VecDeque<Instant>>,
}

pub struct IsolationMiddleware {
    config: TenancyConfig,
    ip_allowlist: HashMap<String, HashSet<IpAddr>>,
    state: Mutex<MutableState>,
    audit: RingLog<MiddlewareAuditEntry>,
    pub context_manager: Arc<ContextManager>,
}

fn parse_roles(raw: &str) -> Vec<Role> {
    raw.split(',')
        .filter_map(|s| Role::parse(s.trim()))
        .collect()
}

impl IsolationMiddleware {
    pub fn new(config: TenancyConfig, context_manager: Arc<ContextManager>) -> Self {
        Self {
            audit: RingLog::new(config.audit_capacity),
            config,
            ip_allowlist: HashMap::new(),
            state: Mutex::new(MutableState {
                ip_workspaces: HashMap::new(),
                workspace_hits: HashMap::new(),
            }),
            context_manager,
        }
    }

    pub fn set_ip_allowlist(&mut self, workspace_id: impl Into<String>, ips: HashSet<IpAddr>) {
        self.ip_allowlist.insert(workspace_id.into(), ips);
    }

    pub fn audit_log(&self) -> Vec<MiddlewareAuditEntry> {
        self.audit.snapshot()
    }

    fn deny(
        &self,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
        ip: Option<IpAddr>,
        reason: impl Into<String>,
    ) -> CoreError {
        let reason = reason.into();
        self.audit.push(MiddlewareAuditEntry {
            workspace_id: workspace_id.map(String::from),
            user_id: user_id.map(String::from),
            action: "reject",
            ip,
            allowed: false,
            reason: reason.clone(),
            timestamp: SystemTime::now(),
        });
        CoreError::PermissionDenied { reason }
    }

    /// Runs the full admission pipeline and, on success, returns a
    /// validated `TenantContext` ready to be established on the task.
    pub fn check_request(
        &self,
        workspace_id: Option<&str>,
        user_id: Option<&str>,
        roles_header: Option<&str>,
        ip: IpAddr,
    ) -> Result<TenantContext, CoreError> {
        let (Some(workspace_id), Some(user_id)) = (workspace_id, user_id) else {
            return Err(self.deny(workspace_id, user_id, Some(ip), "missing workspace or user claim"));
        };
        if workspace_id.is_empty() || user_id.is_empty() {
            return Err(self.deny(Some(workspace_id), Some(user_id), Some(ip), "missing workspace or user claim"));
        }
        let roles = roles_header.map(parse_roles).unwrap_or_default();

        if self.config.enable_ip_allowlist {
            if let Some(allowed_ips) = self.ip_allowlist.get(workspace_id) {
                if !allowed_ips.contains(&ip) {
                    return Err(self.deny(Some(workspace_id), Some(user_id), Some(ip), "ip not allowlisted"));
                }
            }
        }

        {
            let mut state = self.state.lock();
            let seen = state.ip_workspaces.entry(ip).or_default();
            if !seen.contains(workspace_id) && seen.len() as u32 >= self.config.max_workspaces_per_ip {
                return Err(self.deny(Some(workspace_id), Some(user_id), Some(ip), "ip workspace fan-out cap exceeded"));
            }
            seen.insert(workspace_id.to_string());
        }

        {
            let mut state = self.state.lock();
            let now = Instant::now();
            let window = self.config.rate_limit_window;
            let hits = state.workspace_hits.entry(workspace_id.to_string()).or_default();
            while let Some(front) = hits.front() {
                if now.duration_since(*front) >= window {
                    hits.pop_front();
                } else {
                    break;
                }
            }
            if hits.len() as u32 >= self.config.rate_limit_per_workspace {
                return Err(self.deny(Some(workspace_id), Some(user_id), Some(ip), "Rate limit exceeded for workspace"));
            }
            hits.push_back(now);
        }

        if self.config.block_cross_tenant_requests {
            if let Some(existing) = self.context_manager.get() {
                if existing.workspace_id != workspace_id {
                    return Err(self.deny(Some(workspace_id), Some(user_id), Some(ip), "cross-tenant request blocked"));
                }
            }
        }

        let mut ctx = TenantContext::new(workspace_id, user_id, roles);
        ctx.ip_address = Some(ip);
        self.audit.push(MiddlewareAuditEntry {
            workspace_id: Some(workspace_id.to_string()),
            user_id: Some(user_id.to_string()),
            action: "admit",
            ip: Some(ip),
            allowed: true,
            reason: "admitted".into(),
            timestamp: SystemTime::now(),
        });
        Ok(ctx)
    }
}

/// Axum middleware entry point. Reads `X-Workspace-ID`, `X-User-ID`,
/// `X-User-Roles` and runs the handler inside a fresh task-local context
/// scope, clearing it on the way out.
pub async fn isolation_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(middleware): State<Arc<IsolationMiddleware>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let headers = request.headers();
    let workspace_id = headers.get("X-Workspace-ID").and_then(|v| v.to_str().ok()).map(String::from);
    let user_id = headers.get("X-User-ID").and_then(|v| v.to_str().ok()).map(String::from);
    let roles = headers.get("X-User-Roles").and_then(|v| v.to_str().ok()).map(String::from);

    let outcome = middleware.context_manager
        .scope(async {
            match middleware.check_request(workspace_id.as_deref(), user_id.as_deref(), roles.as_deref(), addr.ip()) {
                Ok(ctx) => {
                    middleware.context_manager.set(ctx).expect("context already validated");
                    let response = next.run(request).await;
                    middleware.context_manager.clear();
                    Ok(response)
                }
                Err(err) => Err(err),
            }
        })
        .await;

    match outcome {
        Ok(response) => response,
        Err(err) => axum::response::IntoResponse::into_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn middleware() -> IsolationMiddleware {
        IsolationMiddleware::new(TenancyConfig::default(), Arc::new(ContextManager::new()))
    }

    #[test]
    fn missing_claims_are_rejected() {
        let m = middleware();
        let err = m.check_request(None, Some("u1"), None, "127.0.0.1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));
    }

    #[test]
    fn admits_with_valid_claims() {
        let m = middleware();
        let ctx = m.check_request(Some("ws_a"), Some("u1"), Some("viewer,editor"), "127.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(ctx.workspace_id, "ws_a");
        assert_eq!(ctx.roles.len(), 2);
    }

    #[test]
    fn rate_limited_after_per_workspace_cap() {
        let mut config = TenancyConfig::default();
        config.rate_limit_per_workspace = 3;
        let m = IsolationMiddleware::new(config, Arc::new(ContextManager::new()));
        let ip = "127.0.0.1".parse().unwrap();
        for _ in 0..3 {
            assert!(m.check_request(Some("ws_a"), Some("u1"), None, ip).is_ok());
        }
        let err = m.check_request(Some("ws_a"), Some("u1"), None, ip).unwrap_err();
        assert!(err.to_string().contains("Rate limit exceeded"));
    }

    #[test]
    fn ip_fanout_cap_trips_after_max_workspaces() {
        let mut config = TenancyConfig::default();
        config.max_workspaces_per_ip = 2;
        let m = IsolationMiddleware::new(config, Arc::new(ContextManager::new()));
        let ip = "127.0.0.1".parse().unwrap();
        assert!(m.check_request(Some("ws_a"), Some("u1"), None, ip).is_ok());
        assert!(m.check_request(Some("ws_b"), Some("u1"), None, ip).is_ok());
        let err = m.check_request(Some("ws_c"), Some("u1"), None, ip).unwrap_err();
        assert!(err.to_string().contains("fan-out"));
    }
}
