//! In-process implementation of the `Storage` trait.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use courier_core::clock::{Clock, SystemClock};
use courier_core::context::Context;
use courier_core::error::StorageError;
use courier_core::storage::{Filter, PersistedRecord, Storage};

#[derive(Debug, Default)]
struct Log {
    records: Vec<PersistedRecord>,
    keys: HashSet<(String, i64)>,
}

/// Storage kept in process memory.
///
/// Enforces the same `(aggregate_id, version)` uniqueness as the database
/// table, and writes each batch all-or-nothing. Must be opened before use.
pub struct MemoryStorage {
    log: Mutex<Log>,
    open: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl MemoryStorage {
    /// Creates an empty, closed storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Log::default()),
            open: AtomicBool::new(false),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for deadline checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Returns `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(&self, ctx: &Context) -> Result<(), StorageError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(StorageError::NotOpen);
        }
        if ctx.is_expired(self.clock.as_ref()) {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("records", &self.len())
            .field("open", &self.open.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(&self, ctx: &Context) -> Result<(), StorageError> {
        if ctx.is_expired(self.clock.as_ref()) {
            return Err(StorageError::Cancelled);
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn get(&self, ctx: &Context, filter: &Filter) -> Result<PersistedRecord, StorageError> {
        self.guard(ctx)?;
        let log = self.lock();
        let latest = match &filter.aggregate_id {
            Some(_) => log
                .records
                .iter()
                .filter(|record| filter.matches(record))
                .max_by_key(|record| record.version),
            None => log.records.last(),
        };
        latest.cloned().ok_or(StorageError::NotFound)
    }

    async fn load(
        &self,
        ctx: &Context,
        filter: &Filter,
    ) -> Result<Vec<PersistedRecord>, StorageError> {
        self.guard(ctx)?;
        let mut records: Vec<PersistedRecord> = self
            .lock()
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        if filter.aggregate_id.is_some() {
            records.sort_by_key(|record| record.version);
        }
        Ok(records)
    }

    async fn put(&self, ctx: &Context, records: &[PersistedRecord]) -> Result<(), StorageError> {
        self.guard(ctx)?;
        let mut log = self.lock();

        let mut staged = HashSet::with_capacity(records.len());
        for record in records {
            let key = (record.aggregate_id.clone(), record.version);
            if log.keys.contains(&key) || !staged.insert(key) {
                warn!(
                    aggregate_id = %record.aggregate_id,
                    version = record.version,
                    "rejected batch on version conflict"
                );
                return Err(StorageError::ConcurrencyConflict {
                    aggregate_id: record.aggregate_id.clone(),
                    version: record.version,
                });
            }
        }

        log.keys.extend(staged);
        log.records.extend_from_slice(records);
        debug!(count = records.len(), "stored batch");
        Ok(())
    }
}
