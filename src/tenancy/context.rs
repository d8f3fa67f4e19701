//! Tenant context and its manager. Context storage is task-local (spec
//! §4.5, §5): every logical request/task carries at most one active
//! context, established via [`ContextManager::scope`] around the handler.

use crate::error::CoreError;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::time::SystemTime;
use uuid::Uuid;

use super::config::Role;

#[derive(Debug, Clone)]
pub struct TenantContext {
    pub context_id: Uuid,
    pub workspace_id: String,
    pub user_id: String,
    pub roles: Vec<Role>,
    pub permissions: HashMap<String, String>,
    pub ip_address: Option<IpAddr>,
    pub parent_context_id: Option<Uuid>,
    pub is_background: bool,
    pub created_at: SystemTime,
}

impl TenantContext {
    pub fn new(workspace_id: impl Into<String>, user_id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            context_id: Uuid::new_v4(),
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            roles,
            permissions: HashMap::new(),
            ip_address: None,
            parent_context_id: None,
            is_background: false,
            created_at: SystemTime::now(),
        }
    }

    pub fn highest_role(&self) -> Option<Role> {
        self.roles.iter().copied().max()
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.workspace_id.is_empty() {
            return Err(CoreError::InvalidContext {
                reason: "workspace_id is empty".into(),
            });
        }
        if self.user_id.is_empty() {
            return Err(CoreError::InvalidContext {
                reason: "user_id is empty".into(),
            });
        }
        Ok(())
    }
}

tokio::task_local! {
    static CURRENT: RefCell<Option<TenantContext>>;
}

/// Process-wide history of contexts seen, keyed by id, for `by_id` lookups.
/// This is deliberately separate from the task-local "current" slot — it
/// never substitutes for per-task isolation (spec §9 open question).
pub struct ContextManager {
    history: Mutex<HashMap<Uuid, TenantContext>>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Establishes a fresh task-local context slot for the duration of
    /// `fut`. Every inbound request handler must run inside a scope.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT.scope(RefCell::new(None), fut).await
    }

    pub fn set(&self, ctx: TenantContext) -> Result<(), CoreError> {
        ctx.validate()?;
        self.history.lock().insert(ctx.context_id, ctx.clone());
        CURRENT
            .try_with(|cell| *cell.borrow_mut() = Some(ctx))
            .map_err(|_| CoreError::ConfigError {
                reason: "set() called outside a context scope".into(),
            })
    }

    pub fn get(&self) -> Option<TenantContext> {
        CURRENT.try_with(|cell| cell.borrow().clone()).unwrap_or(None)
    }

    pub fn clear(&self) {
        let _ = CURRENT.try_with(|cell| *cell.borrow_mut() = None);
    }

    pub fn require(&self) -> Result<TenantContext, CoreError> {
        self.get().ok_or(CoreError::ContextMissing)
    }

    pub fn by_id(&self, id: Uuid) -> Option<TenantContext> {
        self.history.lock().get(&id).cloned()
    }

    /// Builds a child context inheriting workspace/roles from the current
    /// one, marked `is_background`. The caller is responsible for handing
    /// it to the spawned task's own scope (spec §5: no implicit inheritance
    /// across task boundaries).
    pub fn create_background(&self) -> Result<TenantContext, CoreError> {
        let parent = self.require()?;
        let mut child = TenantContext::new(parent.workspace_id.clone(), parent.user_id.clone(), parent.roles.clone());
        child.parent_context_id = Some(parent.context_id);
        child.is_background = true;
        self.history.lock().insert(child.context_id, child.clone());
        Ok(child)
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_round_trip_inside_scope() {
        let manager = ContextManager::new();
        manager
            .scope(async {
                manager.set(TenantContext::new("ws_a", "u1", vec![Role::Viewer])).unwrap();
                let ctx = manager.get().unwrap();
                assert_eq!(ctx.workspace_id, "ws_a");
            })
            .await;
    }

    #[tokio::test]
    async fn require_fails_without_context() {
        let manager = ContextManager::new();
        manager
            .scope(async {
                assert!(matches!(manager.require(), Err(CoreError::ContextMissing)));
            })
            .await;
    }

    #[tokio::test]
    async fn invalid_context_is_rejected() {
        let manager = ContextManager::new();
        manager
            .scope(async {
                let err = manager.set(TenantContext::new("", "u1", vec![])).unwrap_err();
                assert!(matches!(err, CoreError::InvalidContext { .. }));
            })
            .await;
    }

    #[tokio::test]
    async fn background_context_inherits_workspace_and_roles() {
        let manager = ContextManager::new();
        manager
            .scope(async {
                manager
                    .set(TenantContext::new("ws_a", "u1", vec![Role::Admin]))
                    .unwrap();
                let parent_id = manager.get().unwrap().context_id;
                let child = manager.create_background().unwrap();
                assert_eq!(child.workspace_id, "ws_a");
                assert!(child.is_background);
                assert_eq!(child.parent_context_id, Some(parent_id));
            })
            .await;
    }

    #[test]
    fn highest_role_picks_top_of_hierarchy() {
        let ctx = TenantContext::new("ws_a", "u1", vec![Role::Viewer, Role::Admin, Role::Editor]);
        assert_eq!(ctx.highest_role(), Some(Role::Admin));
    }
}
