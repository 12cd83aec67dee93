//! Storage collaborator contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Context;
use crate::error::StorageError;

/// Durable representation of one committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Position within the aggregate stream, starting at 1.
    pub version: i64,
    /// Event kind, used to decode the payload.
    pub kind: String,
    /// Serialized event body.
    pub payload: Vec<u8>,
    /// Correlation id of the dispatch that wrote this record.
    pub correlation_id: Uuid,
    /// When the dispatcher staged the record.
    pub recorded_at: DateTime<Utc>,
}

/// Query criteria against storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Restrict to one aggregate stream.
    pub aggregate_id: Option<String>,
}

impl Filter {
    /// Filter matching a single aggregate stream.
    #[must_use]
    pub fn aggregate(aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_id: Some(aggregate_id.into()),
        }
    }

    /// Returns `true` if `record` satisfies this filter.
    #[must_use]
    pub fn matches(&self, record: &PersistedRecord) -> bool {
        self.aggregate_id
            .as_deref()
            .is_none_or(|id| id == record.aggregate_id)
    }
}

/// Storage trait for reading and appending persisted records.
///
/// Implementations must reject a second record for the same
/// `(aggregate_id, version)` with `StorageError::ConcurrencyConflict`; the
/// dispatcher's version assignment is only safe under that constraint.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Prepares the storage for use.
    async fn open(&self, _ctx: &Context) -> Result<(), StorageError> {
        Ok(())
    }

    /// Releases resources held by the storage.
    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Returns the record with the highest version matching `filter`.
    ///
    /// Returns `StorageError::NotFound` when nothing matches.
    async fn get(&self, ctx: &Context, filter: &Filter) -> Result<PersistedRecord, StorageError>;

    /// Returns every record matching `filter`, ordered by version.
    async fn load(
        &self,
        ctx: &Context,
        filter: &Filter,
    ) -> Result<Vec<PersistedRecord>, StorageError>;

    /// Writes `records` as one atomic batch.
    async fn put(&self, ctx: &Context, records: &[PersistedRecord]) -> Result<(), StorageError>;
}
