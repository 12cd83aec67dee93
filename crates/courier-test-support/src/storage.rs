//! Test storages — mock `Storage` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use courier_core::context::Context;
use courier_core::error::StorageError;
use courier_core::storage::{Filter, PersistedRecord, Storage};

/// A storage that records every call and keeps what it was given.
///
/// Reads are served from the seeded history plus everything written since.
/// It does not enforce `(aggregate_id, version)` uniqueness; use
/// `courier_event_store::MemoryStorage` when a test needs conflicts.
#[derive(Debug, Default)]
pub struct RecordingStorage {
    records: Mutex<Vec<PersistedRecord>>,
    batches: Mutex<Vec<Vec<PersistedRecord>>>,
    get_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl RecordingStorage {
    /// Creates an empty recording storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording storage seeded with existing history.
    #[must_use]
    pub fn with_history(records: Vec<PersistedRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Every batch passed to `put`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_batches(&self) -> Vec<Vec<PersistedRecord>> {
        self.batches.lock().unwrap().clone()
    }

    /// Seeded history plus every record written.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<PersistedRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of `get` calls.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `load` calls.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `put` calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Total calls of any kind.
    pub fn interactions(&self) -> usize {
        self.get_calls() + self.load_calls() + self.put_calls()
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn get(&self, _ctx: &Context, filter: &Filter) -> Result<PersistedRecord, StorageError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| filter.matches(record))
            .max_by_key(|record| record.version)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn load(
        &self,
        _ctx: &Context,
        filter: &Filter,
    ) -> Result<Vec<PersistedRecord>, StorageError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let mut matching: Vec<PersistedRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.version);
        Ok(matching)
    }

    async fn put(&self, _ctx: &Context, records: &[PersistedRecord]) -> Result<(), StorageError> {
        self.batches.lock().unwrap().push(records.to_vec());
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}

/// How a [`FailingStorage`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Backend,
    Conflict,
}

/// A storage that fails. Useful for testing error-handling paths.
#[derive(Debug)]
pub struct FailingStorage {
    failure: Failure,
}

impl FailingStorage {
    /// Every operation returns a backend error.
    #[must_use]
    pub fn backend() -> Self {
        Self {
            failure: Failure::Backend,
        }
    }

    /// Reads find nothing and every `put` reports a concurrency conflict on
    /// the first record of the batch.
    #[must_use]
    pub fn conflict() -> Self {
        Self {
            failure: Failure::Conflict,
        }
    }

    fn read_error(&self) -> StorageError {
        match self.failure {
            Failure::Backend => StorageError::Backend("connection refused".into()),
            Failure::Conflict => StorageError::NotFound,
        }
    }
}

#[async_trait]
impl Storage for FailingStorage {
    async fn get(&self, _ctx: &Context, _filter: &Filter) -> Result<PersistedRecord, StorageError> {
        Err(self.read_error())
    }

    async fn load(
        &self,
        _ctx: &Context,
        _filter: &Filter,
    ) -> Result<Vec<PersistedRecord>, StorageError> {
        match self.failure {
            Failure::Backend => Err(self.read_error()),
            Failure::Conflict => Ok(Vec::new()),
        }
    }

    async fn put(&self, _ctx: &Context, records: &[PersistedRecord]) -> Result<(), StorageError> {
        match (self.failure, records.first()) {
            (Failure::Conflict, Some(first)) => Err(StorageError::ConcurrencyConflict {
                aggregate_id: first.aggregate_id.clone(),
                version: first.version,
            }),
            _ => Err(StorageError::Backend("connection refused".into())),
        }
    }
}
