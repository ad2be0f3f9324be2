//! Audit trail storage.

use std::sync::{Arc, RwLock};

use serde::Serialize;

use aegis_auth::AuditLogEntry;

/// Append-only store of decision records.
pub trait AuditStore: Send + Sync {
    fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError>;

    /// Entries newest first (reverse append order). `page` is zero-based.
    fn page(&self, page: usize, size: usize) -> Result<AuditPage, AuditStoreError>;
}

impl<S: AuditStore + ?Sized> AuditStore for Arc<S> {
    fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError> {
        (**self).append(entry)
    }

    fn page(&self, page: usize, size: usize) -> Result<AuditPage, AuditStoreError> {
        (**self).page(page, size)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

/// In-memory audit store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot in insertion order.
    pub fn all(&self) -> Vec<AuditLogEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditStoreError::Storage("lock poisoned".to_string()))?;
        entries.push(entry);
        Ok(())
    }

    fn page(&self, page: usize, size: usize) -> Result<AuditPage, AuditStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditStoreError::Storage("lock poisoned".to_string()))?;

        let size = size.max(1);
        let selected = entries
            .iter()
            .rev()
            .skip(page.saturating_mul(size))
            .take(size)
            .cloned()
            .collect();

        Ok(AuditPage {
            entries: selected,
            page,
            size,
            total: entries.len(),
        })
    }
}
