//! Error taxonomy for registration, dispatch and the collaborators.

use thiserror::Error;

/// Boxed error used for domain and processor failures whose concrete type is
/// owned by the application.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error returned by registration and dispatch.
#[derive(Debug, Error)]
pub enum CourierError {
    /// A command name was bound twice on the same dispatcher.
    #[error("command already registered: {0}")]
    DuplicateCommandRegistration(String),

    /// No route is bound for the dispatched command name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The aggregate rejected the command or failed to apply an event.
    #[error("domain rule violation: {0}")]
    DomainRuleViolation(#[source] BoxError),

    /// The aggregate recorded events without ever exposing an identity.
    #[error("aggregate recorded events without an identity")]
    MissingAggregateId,

    /// An event payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// An inbound or stored payload does not match the registered type.
    #[error("deserialization error for {kind}: {source}")]
    Deserialization {
        /// Event kind or command name being decoded.
        kind: String,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The storage collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The broker collaborator failed to publish or subscribe.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The client was assembled without a required collaborator or with an
    /// invalid setting.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CourierError {
    /// Wraps an aggregate's own error as a `DomainRuleViolation`.
    pub fn domain<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::DomainRuleViolation(Box::new(err))
    }

    /// Returns `true` when re-dispatching the same command may succeed.
    ///
    /// Only version collisions detected by storage qualify.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::ConcurrencyConflict { .. }))
    }

    /// Returns `true` for a storage `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound))
    }
}

/// Errors reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record matches the filter. Dispatch treats this as version 0.
    #[error("no record found")]
    NotFound,

    /// A record with the same aggregate id and version already exists.
    #[error("concurrency conflict on aggregate {aggregate_id}: version {version} already recorded")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The version that was already taken.
        version: i64,
    },

    /// The context deadline passed before the operation ran.
    #[error("storage operation cancelled")]
    Cancelled,

    /// The storage has not been opened, or was closed.
    #[error("storage is not open")]
    NotOpen,

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors reported by a broker collaborator.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker has not been opened, or was closed.
    #[error("broker is not open")]
    NotOpen,

    /// The context deadline passed before the operation ran.
    #[error("broker operation cancelled")]
    Cancelled,

    /// The transport could not be reached.
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    /// The transport refused the message or subscription.
    #[error("broker rejected the request: {0}")]
    Rejected(String),
}
