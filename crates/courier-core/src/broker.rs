//! Broker collaborator contract and subscriber adapters.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{BoxError, BrokerError};
use crate::event::{DomainEvent, Event, EventProcessor};
use crate::registry::{ErasedPayload, TypeDescriptor};

/// Outbound wire form of one committed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Routing subject; always the event kind.
    pub subject: String,
    /// Aggregate that produced the event.
    pub aggregate_id: String,
    /// Version assigned to the event by the dispatcher.
    pub version: i64,
    /// Correlation id of the dispatch that produced the event.
    pub correlation_id: Uuid,
    /// Serialized event body.
    pub payload: Vec<u8>,
}

/// A delivered message whose payload has been rebuilt through the type
/// registry.
#[derive(Debug)]
pub struct Inbound {
    /// Subject the message arrived on.
    pub subject: String,
    /// Aggregate that produced the event.
    pub aggregate_id: String,
    /// Version the dispatcher stamped on the event.
    pub version: i64,
    /// Correlation id of the originating dispatch.
    pub correlation_id: Uuid,
    /// The decoded event, still erased.
    pub payload: ErasedPayload,
}

/// Type-erased subscriber, the form brokers store.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Handles one inbound message.
    async fn process(&self, inbound: Inbound) -> Result<(), BoxError>;
}

/// Broker trait for publishing committed events and registering subscribers.
///
/// Processor failures are the broker's concern: they must never reach the
/// publisher.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Connects to the transport.
    async fn open(&self, _ctx: &Context) -> Result<(), BrokerError> {
        Ok(())
    }

    /// Disconnects, waiting for in-flight deliveries where the transport can.
    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    /// Publishes one message on `message.subject`.
    async fn publish(&self, ctx: &Context, message: &Message) -> Result<(), BrokerError>;

    /// Attaches `processor` to the subject `descriptor.kind()`.
    ///
    /// The descriptor travels with the subscription so the broker can decode
    /// what arrives on that subject without sharing the caller's registry.
    async fn subscribe(
        &self,
        descriptor: TypeDescriptor,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), BrokerError>;
}

/// Adapts a typed [`EventProcessor`] to a [`MessageProcessor`].
///
/// The adapter downcasts the inbound payload to `E` and hands the processor an
/// [`Event`] carrying the published version. A payload of any other type is
/// reported as a processing failure.
pub fn typed_processor<E, P>(processor: P) -> Arc<dyn MessageProcessor>
where
    E: DomainEvent,
    P: EventProcessor<E> + 'static,
{
    Arc::new(TypedProcessor {
        processor,
        _event: PhantomData,
    })
}

struct TypedProcessor<E, P> {
    processor: P,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, P> MessageProcessor for TypedProcessor<E, P>
where
    E: DomainEvent,
    P: EventProcessor<E> + 'static,
{
    async fn process(&self, inbound: Inbound) -> Result<(), BoxError> {
        let Inbound {
            subject,
            version,
            payload,
            ..
        } = inbound;
        let payload = payload.downcast::<E>().map_err(|_| {
            format!(
                "payload for {subject} is not a {}",
                std::any::type_name::<E>()
            )
        })?;
        self.processor
            .process(Event::with_version(*payload, version))
            .await
    }
}
