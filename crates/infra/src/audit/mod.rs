//! Audit trail: storage and the pooled dispatcher feeding it.

pub mod dispatcher;
pub mod store;

pub use dispatcher::{AUDIT_FAILURE_COUNTER, AuditDispatcher, AuditDispatcherConfig, DispatcherStats};
pub use store::{AuditPage, AuditStore, AuditStoreError, InMemoryAuditStore};
