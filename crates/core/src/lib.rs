//! `aegis-core`: shared primitives for the authorization core.
//!
//! This crate contains identifiers, the domain error model and the
//! thread-bound tenant context. No HTTP, no storage.

pub mod error;
pub mod id;
pub mod tenant_context;

pub use error::{DomainError, DomainResult};
pub use id::{EmployeeId, GroupId, PermissionId, RoleId, TenantId};
pub use tenant_context::{TenantContext, TenantScope};
