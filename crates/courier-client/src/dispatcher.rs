//! Command dispatcher.
//!
//! One dispatcher serves one aggregate type. Each dispatch is a short
//! transaction: build the aggregate, optionally rehydrate it, let it handle
//! the command, then version, publish and persist whatever it recorded.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use courier_core::aggregate::Aggregate;
use courier_core::broker::{Broker, Message};
use courier_core::clock::{Clock, SystemClock};
use courier_core::command::{Command, Handles};
use courier_core::context::Context;
use courier_core::error::{CourierError, StorageError};
use courier_core::event::{self, Event};
use courier_core::storage::{Filter, PersistedRecord, Storage};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Whether committed history is replayed before a command is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rehydration {
    /// Load and replay the aggregate's history whenever the command exposes
    /// its identity, so handlers validate against committed state.
    #[default]
    FullReplay,
    /// Handle every command against a fresh aggregate and only read the
    /// latest stored version to stamp new events.
    VersionOnly,
}

impl FromStr for Rehydration {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" | "full-replay" => Ok(Self::FullReplay),
            "version-only" => Ok(Self::VersionOnly),
            other => Err(CourierError::Configuration(format!(
                "unknown rehydration policy: {other} (expected replay or version-only)"
            ))),
        }
    }
}

impl fmt::Display for Rehydration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullReplay => f.write_str("replay"),
            Self::VersionOnly => f.write_str("version-only"),
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// The aggregate affected by the command. Empty only when nothing was
    /// recorded by an aggregate that never assigned itself an identity.
    pub aggregate_id: String,
    /// The records published and persisted, in version order.
    pub records: Vec<PersistedRecord>,
}

impl CommitReceipt {
    /// Versions assigned in this dispatch.
    #[must_use]
    pub fn versions(&self) -> Vec<i64> {
        self.records.iter().map(|record| record.version).collect()
    }

    /// Returns `true` if the command recorded no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A registered command, erased so routes for different command types share
/// one table.
#[async_trait]
trait CommandRoute<A: Aggregate>: Send + Sync {
    fn command_type(&self) -> TypeId;

    async fn dispatch_value(
        &self,
        dispatcher: &CommandDispatcher<A>,
        ctx: &Context,
        body: Value,
    ) -> Result<CommitReceipt, CourierError>;
}

struct Route<C>(PhantomData<fn() -> C>);

#[async_trait]
impl<A, C> CommandRoute<A> for Route<C>
where
    A: Handles<C>,
    C: Command,
{
    fn command_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    async fn dispatch_value(
        &self,
        dispatcher: &CommandDispatcher<A>,
        ctx: &Context,
        body: Value,
    ) -> Result<CommitReceipt, CourierError> {
        let command: C =
            serde_json::from_value(body).map_err(|source| CourierError::Deserialization {
                kind: C::NAME.to_owned(),
                source,
            })?;
        dispatcher.execute(ctx, command).await
    }
}

/// Routes commands to aggregate `A` and runs the dispatch transaction.
pub struct CommandDispatcher<A: Aggregate> {
    storage: Arc<dyn Storage>,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    rehydration: Rehydration,
    routes: RwLock<HashMap<&'static str, Arc<dyn CommandRoute<A>>>>,
}

impl<A: Aggregate> CommandDispatcher<A> {
    /// Creates a dispatcher using the system clock and full replay.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, broker: Arc<dyn Broker>) -> Self {
        Self {
            storage,
            broker,
            clock: Arc::new(SystemClock),
            rehydration: Rehydration::default(),
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the clock used to timestamp persisted records.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the rehydration policy.
    #[must_use]
    pub fn with_rehydration(mut self, rehydration: Rehydration) -> Self {
        self.rehydration = rehydration;
        self
    }

    /// The active rehydration policy.
    #[must_use]
    pub fn rehydration(&self) -> Rehydration {
        self.rehydration
    }

    /// Binds command `C` to this dispatcher under `C::NAME`.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::DuplicateCommandRegistration` if the name is
    /// already bound; the existing binding is kept.
    pub fn register<C>(&self) -> Result<(), CourierError>
    where
        C: Command,
        A: Handles<C>,
    {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(C::NAME) {
            return Err(CourierError::DuplicateCommandRegistration(
                C::NAME.to_owned(),
            ));
        }
        routes.insert(C::NAME, Arc::new(Route::<C>(PhantomData)));
        info!(
            aggregate_type = A::AGGREGATE_TYPE,
            command = C::NAME,
            "registered command"
        );
        Ok(())
    }

    /// Returns `true` if a command is bound under `name`.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of all bound commands, sorted.
    #[must_use]
    pub fn commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        names.sort_unstable();
        names
    }

    fn route(&self, name: &str) -> Result<Arc<dyn CommandRoute<A>>, CourierError> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| CourierError::UnknownCommand(name.to_owned()))
    }

    /// Dispatches a typed command.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::UnknownCommand` before any domain logic runs if
    /// `C` is not registered. Otherwise returns the first failure of the
    /// transaction; see [`commit`](Self::commit).
    #[instrument(skip(self, ctx, command), fields(aggregate_type = A::AGGREGATE_TYPE, command = C::NAME, correlation_id = %ctx.correlation_id()))]
    pub async fn dispatch<C>(&self, ctx: &Context, command: C) -> Result<CommitReceipt, CourierError>
    where
        C: Command,
        A: Handles<C>,
    {
        let route = self.route(C::NAME)?;
        if route.command_type() != TypeId::of::<C>() {
            return Err(CourierError::UnknownCommand(C::NAME.to_owned()));
        }
        self.execute(ctx, command).await
    }

    /// Dispatches a command by name, decoding `body` into the registered
    /// command type.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::UnknownCommand` if `name` is not registered and
    /// `CourierError::Deserialization` if `body` does not match the command.
    #[instrument(skip(self, ctx, body), fields(aggregate_type = A::AGGREGATE_TYPE, correlation_id = %ctx.correlation_id()))]
    pub async fn dispatch_json(
        &self,
        ctx: &Context,
        name: &str,
        body: Value,
    ) -> Result<CommitReceipt, CourierError> {
        let route = self.route(name)?;
        route.dispatch_value(self, ctx, body).await
    }

    async fn execute<C>(&self, ctx: &Context, command: C) -> Result<CommitReceipt, CourierError>
    where
        C: Command,
        A: Handles<C>,
    {
        let (mut aggregate, expected) = match (self.rehydration, command.aggregate_id()) {
            (Rehydration::FullReplay, Some(id)) if !id.is_empty() => {
                let aggregate = self.rehydrate(ctx, &id).await?;
                let replayed = aggregate.version();
                (aggregate, Some(replayed))
            }
            _ => (A::default(), None),
        };
        debug!(?command, version = aggregate.version(), "handling command");
        aggregate
            .handle(ctx, command)
            .map_err(CourierError::domain)?;
        self.commit_at(ctx, &mut aggregate, expected).await
    }

    /// Rebuilds aggregate `aggregate_id` from its persisted history.
    ///
    /// An identity with no history yields a fresh aggregate.
    ///
    /// # Errors
    ///
    /// Returns storage errors other than `NotFound`,
    /// `CourierError::Deserialization` for records that no longer decode, and
    /// `CourierError::DomainRuleViolation` if replay fails.
    #[instrument(skip(self, ctx), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn rehydrate(&self, ctx: &Context, aggregate_id: &str) -> Result<A, CourierError> {
        let records = match self.storage.load(ctx, &Filter::aggregate(aggregate_id)).await {
            Ok(records) => records,
            Err(StorageError::NotFound) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        let history = records
            .iter()
            .map(|record| {
                let payload = event::decode::<A::Event>(&record.kind, &record.payload)?;
                Ok(Event::with_version(payload, record.version))
            })
            .collect::<Result<Vec<_>, CourierError>>()?;

        let mut aggregate = A::default();
        aggregate.replay(history).map_err(CourierError::domain)?;
        debug!(version = aggregate.version(), "rehydrated aggregate");
        Ok(aggregate)
    }

    /// Versions, publishes and persists the aggregate's uncommitted events,
    /// then clears its buffer.
    ///
    /// Each event is published before the batch is written, so a failure
    /// after a publish leaves that event visible to subscribers but not
    /// durably recorded. On any error the buffer is kept.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::MissingAggregateId` if events were recorded
    /// without an identity, serialization errors, and any storage or broker
    /// error. A storage `NotFound` on the version lookup means version 0.
    #[instrument(skip_all, fields(aggregate_type = A::AGGREGATE_TYPE, aggregate_id = aggregate.aggregate_id()))]
    pub async fn commit(&self, ctx: &Context, aggregate: &mut A) -> Result<CommitReceipt, CourierError> {
        self.commit_at(ctx, aggregate, None).await
    }

    /// Commits against the version the handler decided on. When `expected`
    /// is set and the stream has moved past it, nothing is published or
    /// written and a retryable conflict is returned.
    async fn commit_at(
        &self,
        ctx: &Context,
        aggregate: &mut A,
        expected: Option<i64>,
    ) -> Result<CommitReceipt, CourierError> {
        let aggregate_id = aggregate.aggregate_id().to_owned();
        if aggregate.uncommitted().is_empty() {
            debug!("command recorded no events");
            return Ok(CommitReceipt {
                aggregate_id,
                records: Vec::new(),
            });
        }
        if aggregate_id.is_empty() {
            return Err(CourierError::MissingAggregateId);
        }

        let baseline = match self.storage.get(ctx, &Filter::aggregate(&aggregate_id)).await {
            Ok(latest) => latest.version,
            Err(StorageError::NotFound) => 0,
            Err(err) => return Err(err.into()),
        };
        if expected.is_some_and(|expected| expected != baseline) {
            warn!(?expected, baseline, "stream moved since rehydration");
            return Err(StorageError::ConcurrencyConflict {
                aggregate_id,
                version: baseline,
            }
            .into());
        }

        let recorded_at = self.clock.now();
        let mut records = Vec::with_capacity(aggregate.uncommitted().len());
        for (offset, pending) in (1_i64..).zip(aggregate.uncommitted()) {
            let version = baseline + offset;
            let encoded = event::encode(pending.payload())?;
            let message = Message {
                subject: encoded.kind,
                aggregate_id: aggregate_id.clone(),
                version,
                correlation_id: ctx.correlation_id(),
                payload: encoded.data,
            };
            self.broker.publish(ctx, &message).await?;
            debug!(kind = %message.subject, version, "published event");
            records.push(PersistedRecord {
                aggregate_id: message.aggregate_id,
                version,
                kind: message.subject,
                payload: message.payload,
                correlation_id: message.correlation_id,
                recorded_at,
            });
        }

        self.storage.put(ctx, &records).await?;
        aggregate.committed();
        info!(
            events = records.len(),
            first_version = baseline + 1,
            "committed events"
        );
        Ok(CommitReceipt {
            aggregate_id,
            records,
        })
    }
}

impl<A: Aggregate> fmt::Debug for CommandDispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("aggregate_type", &A::AGGREGATE_TYPE)
            .field("rehydration", &self.rehydration)
            .field("commands", &self.commands())
            .finish_non_exhaustive()
    }
}
