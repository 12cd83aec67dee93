//! Aggregate root abstraction and its shared bookkeeping.

use crate::event::{DomainEvent, Event};

/// Version counter and uncommitted-event buffer shared by every aggregate.
///
/// Concrete aggregates hold one of these and expose it through
/// [`Aggregate::state`] / [`Aggregate::state_mut`].
#[derive(Debug)]
pub struct AggregateState<E> {
    version: i64,
    changes: Vec<Event<E>>,
}

impl<E> AggregateState<E> {
    /// Creates bookkeeping for an aggregate with no history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: 0,
            changes: Vec::new(),
        }
    }

    /// Number of events applied so far, replayed or new.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Events recorded since the last commit, in recording order.
    #[must_use]
    pub fn uncommitted(&self) -> &[Event<E>] {
        &self.changes
    }

    /// Drops the uncommitted buffer after a successful publish and persist.
    pub fn committed(&mut self) {
        self.changes.clear();
    }

    fn advance(&mut self) -> i64 {
        self.version += 1;
        self.version
    }

    fn push(&mut self, event: Event<E>) {
        self.changes.push(event);
    }
}

impl<E> Default for AggregateState<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for event-sourced aggregate roots.
///
/// Implementors supply identity, access to their [`AggregateState`] and a
/// deterministic [`apply_change`](Aggregate::apply_change). Versioning,
/// buffering and replay are provided.
///
/// After any error from [`apply`](Aggregate::apply) or
/// [`replay`](Aggregate::replay) the instance must be discarded: the version
/// counter has already advanced and is not rolled back.
pub trait Aggregate: Default + Send + Sync + 'static {
    /// Identifies this aggregate type in logs and spans (e.g. `"account"`).
    const AGGREGATE_TYPE: &'static str;

    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Business-rule violation raised by command handling or `apply_change`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stable identity used for storage lookups. Empty until assigned.
    fn aggregate_id(&self) -> &str;

    /// Shared bookkeeping.
    fn state(&self) -> &AggregateState<Self::Event>;

    /// Shared bookkeeping, mutably.
    fn state_mut(&mut self) -> &mut AggregateState<Self::Event>;

    /// Mutates domain state for one event.
    ///
    /// Must be deterministic: replay relies on the same prior state and event
    /// always producing the same result.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` when the event cannot be applied to the current
    /// state.
    fn apply_change(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Current version (events applied, replayed or new).
    fn version(&self) -> i64 {
        self.state().version()
    }

    /// Applies one event.
    ///
    /// The version counter always advances first. New events are stamped with
    /// the advanced counter and buffered; replayed events keep their stored
    /// version and are not buffered.
    ///
    /// # Errors
    ///
    /// Propagates the error from `apply_change`; the event is not buffered.
    fn apply(&mut self, mut event: Event<Self::Event>, is_new: bool) -> Result<(), Self::Error> {
        let version = self.state_mut().advance();
        self.apply_change(event.payload())?;
        if is_new {
            event.stamp(version);
            self.state_mut().push(event);
        }
        Ok(())
    }

    /// Records a new event produced by command handling.
    ///
    /// # Errors
    ///
    /// Propagates the error from `apply_change`.
    fn record(&mut self, payload: Self::Event) -> Result<(), Self::Error> {
        self.apply(Event::new(payload), true)
    }

    /// Folds committed history into the aggregate, in stored order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing event and returns its error; the aggregate
    /// is left at the state of the last successfully applied event.
    fn replay<I>(&mut self, history: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Event<Self::Event>>,
    {
        for event in history {
            self.apply(event, false)?;
        }
        Ok(())
    }

    /// Events recorded since the last commit.
    fn uncommitted(&self) -> &[Event<Self::Event>] {
        self.state().uncommitted()
    }

    /// Clears the uncommitted buffer. Only the dispatcher calls this, after
    /// publish and persist both succeed.
    fn committed(&mut self) {
        self.state_mut().committed();
    }
}
