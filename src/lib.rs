//! Core runtime services of a multi-tenant trading platform.
//!
//! Four subsystems, leaves first: the resilience fabric wraps outbound
//! calls, the tenancy layer scopes every request to a workspace, the
//! pipeline turns signals into tracked positions, and the capacity plane
//! watches the resources the pipeline consumes.

pub mod audit;
pub mod capacity;
pub mod error;
pub mod pipeline;
pub mod resilience;
pub mod tenancy;

pub use error::{CoreError, CoreResult};
