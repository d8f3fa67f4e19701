//! Multi-tenancy enforcement: tenant context, row-level query filtering,
//! policy-based access control, and ingress isolation middleware.
//! See spec §4.5-4.8.

pub mod config;
pub mod context;
pub mod filters;
pub mod middleware;
pub mod policies;

pub use config::{AccessLevel, PolicyAction, Role, TenancyConfig};
pub use context::{ContextManager, TenantContext};
pub use filters::{QueryAuditEntry, QueryFilter};
pub use middleware::{isolation_middleware, IsolationMiddleware, MiddlewareAuditEntry};
pub use policies::{Policy, PolicyEngine, PolicyEvaluation};
