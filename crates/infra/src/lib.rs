//! Infrastructure layer: audit persistence and dispatch, principal directory,
//! target ownership lookups.

pub mod audit;
pub mod directory;
pub mod ownership;

mod integration_tests;

pub use audit::{
    AUDIT_FAILURE_COUNTER, AuditDispatcher, AuditDispatcherConfig, AuditPage, AuditStore,
    AuditStoreError, DispatcherStats, InMemoryAuditStore,
};
pub use directory::{InMemoryPrincipalDirectory, StaticTokenAuthenticator};
pub use ownership::InMemoryTargetOwnership;
