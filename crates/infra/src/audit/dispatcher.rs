//! Asynchronous audit dispatch.
//!
//! Decision records are handed to a bounded queue drained by a small worker
//! pool, keeping persistence off the request path. When the queue is full,
//! or after shutdown, the record is written on the submitting thread instead
//! of being dropped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use aegis_auth::{AuditError, AuditLogEntry, AuditSink};
use aegis_observability::{MetricsRecorder, Tags};

use super::store::AuditStore;

pub const AUDIT_FAILURE_COUNTER: &str = "aegis_audit_log_failure";

#[derive(Debug, Clone)]
pub struct AuditDispatcherConfig {
    /// Worker threads draining the queue.
    pub workers: usize,
    /// Entries buffered before submitters run the write themselves.
    pub queue_capacity: usize,
    /// Thread name prefix for logging.
    pub name: String,
}

impl Default for AuditDispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 500,
            name: "audit-dispatcher".to_string(),
        }
    }
}

impl AuditDispatcherConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub submitted: u64,
    pub queued: u64,
    pub caller_runs: u64,
    pub persisted: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    queued: AtomicU64,
    caller_runs: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            caller_runs: self.caller_runs.load(Ordering::SeqCst),
            persisted: self.persisted.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Writes entries to the store. Failures are logged and counted, never raised.
#[derive(Clone)]
struct Writer {
    store: Arc<dyn AuditStore>,
    metrics: Arc<dyn MetricsRecorder>,
    counters: Arc<Counters>,
}

impl Writer {
    fn write(&self, entry: AuditLogEntry) {
        let id = entry.id;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.store.append(entry)));
        let failure = match result {
            Ok(Ok(())) => {
                self.counters.persisted.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => "audit store panicked".to_string(),
        };

        self.counters.failed.fetch_add(1, Ordering::SeqCst);
        error!(entry_id = %id, error = %failure, "failed to persist audit log");
        if let Err(err) = self.metrics.increment_counter(AUDIT_FAILURE_COUNTER, &Tags::new()) {
            debug!(error = %err, "failed to count audit failure");
        }
    }
}

/// Bounded, pooled [`AuditSink`].
pub struct AuditDispatcher {
    sender: RwLock<Option<SyncSender<AuditLogEntry>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    writer: Writer,
    name: String,
}

impl core::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AuditDispatcher {
    /// Start the worker pool.
    pub fn spawn(
        config: AuditDispatcherConfig,
        store: Arc<dyn AuditStore>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<AuditLogEntry>(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let writer = Writer {
            store,
            metrics,
            counters: Arc::new(Counters::default()),
        };

        let mut workers = Vec::with_capacity(config.workers);
        for i in 0..config.workers.max(1) {
            let rx = rx.clone();
            let writer = writer.clone();
            let name = format!("{}-{i}", config.name);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&name, &rx, &writer))?;
            workers.push(handle);
        }

        info!(
            dispatcher = %config.name,
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            "audit dispatcher started"
        );

        Ok(Self {
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(workers),
            writer,
            name: config.name,
        })
    }

    pub fn stats(&self) -> DispatcherStats {
        self.writer.counters.snapshot()
    }

    /// Stop accepting queued work, drain what is queued and join the workers.
    ///
    /// Later submissions are written on the caller's thread.
    pub fn shutdown(&self) {
        let sender = match self.sender.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if sender.is_none() {
            return;
        }
        drop(sender);

        let handles = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!(dispatcher = %self.name, "audit worker exited abnormally");
            }
        }
        info!(dispatcher = %self.name, "audit dispatcher stopped");
    }

    fn run_on_caller(&self, entry: AuditLogEntry) {
        self.writer.counters.caller_runs.fetch_add(1, Ordering::SeqCst);
        self.writer.write(entry);
    }
}

impl AuditSink for AuditDispatcher {
    fn record(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        self.writer.counters.submitted.fetch_add(1, Ordering::SeqCst);

        let guard = match self.sender.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            drop(guard);
            self.run_on_caller(entry);
            return Ok(());
        };

        match sender.try_send(entry) {
            Ok(()) => {
                self.writer.counters.queued.fetch_add(1, Ordering::SeqCst);
            }
            Err(TrySendError::Full(entry)) => {
                drop(guard);
                debug!(dispatcher = %self.name, "audit queue saturated; writing on caller thread");
                self.run_on_caller(entry);
            }
            Err(TrySendError::Disconnected(entry)) => {
                drop(guard);
                self.run_on_caller(entry);
            }
        }
        Ok(())
    }
}

impl Drop for AuditDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(name: &str, rx: &Mutex<Receiver<AuditLogEntry>>, writer: &Writer) {
    debug!(worker = name, "audit worker started");
    loop {
        let next = match rx.lock() {
            Ok(rx) => rx.recv(),
            Err(poisoned) => poisoned.into_inner().recv(),
        };
        match next {
            Ok(entry) => writer.write(entry),
            Err(_) => break,
        }
    }
    debug!(worker = name, "audit worker stopped");
}
