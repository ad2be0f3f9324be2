//! Thread-bound tenant context.
//!
//! Holds the tenant ("filial") selected for the request currently executing
//! on this thread. Values are never visible to other threads, so whoever sets
//! a value must clear it on the same thread before the thread is handed back
//! to a pool. Prefer [`TenantContext::enter`], which clears on drop (normal
//! return, early return, `?` and panic unwinding alike).
//!
//! Async code must not rely on this store: a task may resume on another
//! worker thread. The HTTP layer threads the tenant explicitly instead.

use std::cell::Cell;
use std::marker::PhantomData;

use crate::TenantId;

thread_local! {
    static CURRENT_TENANT: Cell<Option<TenantId>> = const { Cell::new(None) };
}

/// Accessor for the current thread's tenant.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext;

impl TenantContext {
    /// Bind `tenant_id` to the current thread, overwriting any previous value.
    pub fn set(tenant_id: TenantId) {
        CURRENT_TENANT.with(|c| c.set(Some(tenant_id)));
        tracing::trace!(tenant_id = %tenant_id, "tenant context set");
    }

    /// The tenant bound to the current thread, if any.
    pub fn get() -> Option<TenantId> {
        CURRENT_TENANT.with(Cell::get)
    }

    /// Remove the current thread's binding.
    pub fn clear() {
        CURRENT_TENANT.with(|c| c.set(None));
    }

    /// Bind `tenant_id` (when present) and return a guard that clears the
    /// binding when dropped.
    ///
    /// The guard clears even when `tenant_id` is `None`, so a value left
    /// behind by an earlier, misbehaving caller on this thread cannot survive
    /// past the scope either.
    pub fn enter(tenant_id: Option<TenantId>) -> TenantScope {
        match tenant_id {
            Some(id) => Self::set(id),
            None => Self::clear(),
        }
        TenantScope {
            _not_send: PhantomData,
        }
    }
}

/// Scope guard returned by [`TenantContext::enter`].
///
/// Not `Send`: the binding must be released on the thread that created it.
#[must_use = "dropping the scope immediately clears the tenant context"]
#[derive(Debug)]
pub struct TenantScope {
    _not_send: PhantomData<*const ()>,
}

impl Drop for TenantScope {
    fn drop(&mut self) {
        TenantContext::clear();
    }
}
