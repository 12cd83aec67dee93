//! Per-call context carried through dispatch into the collaborators.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::clock::Clock;

/// Correlation and cancellation information for one public operation.
///
/// The core never acts on the deadline itself. It hands the context to the
/// storage and broker collaborators, which may refuse work once it expires.
#[derive(Debug, Clone)]
pub struct Context {
    correlation_id: Uuid,
    deadline: Option<DateTime<Utc>>,
}

impl Context {
    /// Creates a context with a fresh correlation id and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            deadline: None,
        }
    }

    /// Replaces the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to the clock's current time.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration, clock: &dyn Clock) -> Self {
        let deadline = clock.now() + timeout;
        self.with_deadline(deadline)
    }

    /// Correlation id used to trace this call through its effects.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// The deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.deadline.is_some_and(|deadline| clock.now() >= deadline)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
