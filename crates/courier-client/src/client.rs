//! Client facade: explicit collaborator wiring, lifecycle and registration.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use courier_core::aggregate::Aggregate;
use courier_core::broker::{Broker, typed_processor};
use courier_core::clock::Clock;
use courier_core::command::{Command, Handles};
use courier_core::context::Context;
use courier_core::error::CourierError;
use courier_core::event::{DomainEvent, EventProcessor};
use courier_core::registry::{TypeDescriptor, TypeRegistry};
use courier_core::storage::Storage;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::dispatcher::{CommandDispatcher, CommitReceipt};

/// Entry point for applications: dispatches commands to aggregate `A` and
/// subscribes event processors through the broker.
pub struct Client<A: Aggregate> {
    dispatcher: CommandDispatcher<A>,
    registry: Arc<TypeRegistry>,
    storage: Arc<dyn Storage>,
    broker: Arc<dyn Broker>,
}

impl<A: Aggregate> Client<A> {
    /// Starts building a client.
    #[must_use]
    pub fn builder() -> ClientBuilder<A> {
        ClientBuilder::new()
    }

    /// Opens storage, then the broker.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator failure.
    pub async fn open(&self, ctx: &Context) -> Result<(), CourierError> {
        self.storage.open(ctx).await?;
        self.broker.open(ctx).await?;
        info!(aggregate_type = A::AGGREGATE_TYPE, "client opened");
        Ok(())
    }

    /// Closes the broker, then storage. Both are closed even if the first
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns the broker's error if it failed, else the storage's.
    pub async fn close(&self) -> Result<(), CourierError> {
        let broker = self.broker.close().await;
        if let Err(err) = &broker {
            warn!(error = %err, "broker close failed");
        }
        let storage = self.storage.close().await;
        info!(aggregate_type = A::AGGREGATE_TYPE, "client closed");
        broker?;
        storage?;
        Ok(())
    }

    /// Binds command `C` to the aggregate.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::DuplicateCommandRegistration` if `C::NAME` is
    /// already bound.
    pub fn add_command<C>(&self) -> Result<(), CourierError>
    where
        C: Command,
        A: Handles<C>,
    {
        self.dispatcher.register::<C>()
    }

    /// Registers `E` under `kind` in the type registry and subscribes
    /// `processor` to that subject. The broker receives the same descriptor,
    /// so it decodes the subject even when built with another registry.
    ///
    /// # Errors
    ///
    /// Returns the broker's error if the subscription is refused. The type
    /// binding is kept either way.
    pub async fn add_event_processor<E, P>(
        &self,
        kind: &str,
        processor: P,
    ) -> Result<(), CourierError>
    where
        E: DomainEvent,
        P: EventProcessor<E> + 'static,
    {
        let descriptor = TypeDescriptor::of::<E>(kind);
        self.registry.insert(descriptor.clone());
        self.broker
            .subscribe(descriptor, typed_processor::<E, P>(processor))
            .await?;
        info!(kind, "subscribed event processor");
        Ok(())
    }

    /// Dispatches a typed command.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::dispatch`].
    pub async fn dispatch<C>(&self, ctx: &Context, command: C) -> Result<CommitReceipt, CourierError>
    where
        C: Command,
        A: Handles<C>,
    {
        self.dispatcher.dispatch(ctx, command).await
    }

    /// Dispatches a command by name from a JSON body.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::dispatch_json`].
    pub async fn dispatch_json(
        &self,
        ctx: &Context,
        name: &str,
        body: Value,
    ) -> Result<CommitReceipt, CourierError> {
        self.dispatcher.dispatch_json(ctx, name, body).await
    }

    /// The shared type registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The underlying dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &CommandDispatcher<A> {
        &self.dispatcher
    }
}

impl<A: Aggregate> fmt::Debug for Client<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dispatcher", &self.dispatcher)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Client`]. Storage, broker and registry have no defaults.
pub struct ClientBuilder<A> {
    storage: Option<Arc<dyn Storage>>,
    broker: Option<Arc<dyn Broker>>,
    registry: Option<Arc<TypeRegistry>>,
    clock: Option<Arc<dyn Clock>>,
    config: ClientConfig,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> ClientBuilder<A> {
    fn new() -> Self {
        Self {
            storage: None,
            broker: None,
            registry: None,
            clock: None,
            config: ClientConfig::default(),
            _aggregate: PhantomData,
        }
    }

    /// The event store commits are written to.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// The broker committed events are published on.
    #[must_use]
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// The registry event processors are bound in.
    #[must_use]
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Overrides the clock that timestamps persisted records.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Dispatch settings; defaults to [`ClientConfig::default`].
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Assembles the client.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Configuration` naming the first missing
    /// collaborator.
    pub fn build(self) -> Result<Client<A>, CourierError> {
        let storage = self.storage.ok_or_else(|| missing("storage"))?;
        let broker = self.broker.ok_or_else(|| missing("broker"))?;
        let registry = self.registry.ok_or_else(|| missing("type registry"))?;

        let mut dispatcher = CommandDispatcher::new(Arc::clone(&storage), Arc::clone(&broker))
            .with_rehydration(self.config.rehydration);
        if let Some(clock) = self.clock {
            dispatcher = dispatcher.with_clock(clock);
        }

        Ok(Client {
            dispatcher,
            registry,
            storage,
            broker,
        })
    }
}

fn missing(collaborator: &str) -> CourierError {
    CourierError::Configuration(format!("client requires an explicit {collaborator}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use courier_core::broker::Message;
    use courier_core::error::BoxError;
    use courier_core::event::{self, Event};
    use courier_test_support::{
        FailingBroker, Increment, Incremented, RecordingBroker, RecordingStorage, Tally,
        TallyEvent,
    };
    use uuid::Uuid;

    use super::*;
    use crate::dispatcher::Rehydration;

    fn client(storage: &Arc<RecordingStorage>, broker: Arc<dyn Broker>) -> Client<Tally> {
        Client::<Tally>::builder()
            .storage(storage.clone())
            .broker(broker)
            .registry(Arc::new(TypeRegistry::new()))
            .build()
            .unwrap()
    }

    fn incremented_message(version: i64) -> Message {
        let encoded = event::encode(&TallyEvent::Incremented(Incremented {
            tally_id: "t-1".to_owned(),
            by: 2,
        }))
        .unwrap();
        Message {
            subject: encoded.kind,
            aggregate_id: "t-1".to_owned(),
            version,
            correlation_id: Uuid::new_v4(),
            payload: encoded.data,
        }
    }

    #[test]
    fn test_build_requires_every_collaborator() {
        let without_storage = Client::<Tally>::builder()
            .broker(Arc::new(RecordingBroker::new()))
            .registry(Arc::new(TypeRegistry::new()))
            .build();
        let without_broker = Client::<Tally>::builder()
            .storage(Arc::new(RecordingStorage::new()))
            .registry(Arc::new(TypeRegistry::new()))
            .build();
        let without_registry = Client::<Tally>::builder()
            .storage(Arc::new(RecordingStorage::new()))
            .broker(Arc::new(RecordingBroker::new()))
            .build();

        assert!(matches!(without_storage, Err(CourierError::Configuration(m)) if m.contains("storage")));
        assert!(matches!(without_broker, Err(CourierError::Configuration(m)) if m.contains("broker")));
        assert!(matches!(without_registry, Err(CourierError::Configuration(m)) if m.contains("registry")));
    }

    #[test]
    fn test_config_sets_rehydration_policy() {
        let client = Client::<Tally>::builder()
            .storage(Arc::new(RecordingStorage::new()))
            .broker(Arc::new(RecordingBroker::new()))
            .registry(Arc::new(TypeRegistry::new()))
            .config(ClientConfig {
                rehydration: Rehydration::VersionOnly,
            })
            .build()
            .unwrap();

        assert_eq!(client.dispatcher().rehydration(), Rehydration::VersionOnly);
    }

    #[tokio::test]
    async fn test_add_event_processor_registers_type_and_subscribes() {
        // Arrange
        let storage = Arc::new(RecordingStorage::new());
        let broker = Arc::new(RecordingBroker::new());
        let client = client(&storage, broker.clone());
        let seen: Arc<Mutex<Vec<i64>>> = Arc::default();
        let sink = Arc::clone(&seen);

        // Act
        client
            .add_event_processor::<TallyEvent, _>(
                "tally.incremented",
                move |event: Event<TallyEvent>| -> Result<(), BoxError> {
                    sink.lock().unwrap().push(event.version());
                    Ok(())
                },
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(broker.subjects(), vec!["tally.incremented".to_owned()]);
        let descriptor = client.registry().get("tally.incremented").unwrap();
        assert!(descriptor.is::<TallyEvent>());
        assert!(broker.descriptors()[0].is::<TallyEvent>());
        let outcomes = broker.redeliver(&incremented_message(7)).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_refused_subscription_is_reported() {
        let storage = Arc::new(RecordingStorage::new());
        let client = client(&storage, Arc::new(FailingBroker));

        let result = client
            .add_event_processor::<TallyEvent, _>(
                "tally.incremented",
                |_: Event<TallyEvent>| -> Result<(), BoxError> { Ok(()) },
            )
            .await;

        assert!(matches!(result, Err(CourierError::Broker(_))));
    }

    #[tokio::test]
    async fn test_dispatch_through_client() {
        let storage = Arc::new(RecordingStorage::new());
        let broker = Arc::new(RecordingBroker::new());
        let client = client(&storage, broker.clone());
        client.add_command::<Increment>().unwrap();
        let ctx = Context::new();
        client.open(&ctx).await.unwrap();

        let receipt = client
            .dispatch(
                &ctx,
                Increment {
                    tally_id: "t-1".to_owned(),
                    by: 1,
                },
            )
            .await
            .unwrap();
        client.close().await.unwrap();

        assert_eq!(receipt.versions(), vec![1]);
        assert_eq!(storage.records().len(), 1);
        assert_eq!(broker.messages().len(), 1);
    }

    #[test]
    fn test_duplicate_command_through_client() {
        let storage = Arc::new(RecordingStorage::new());
        let client = client(&storage, Arc::new(RecordingBroker::new()));
        client.add_command::<Increment>().unwrap();

        let result = client.add_command::<Increment>();

        assert!(matches!(
            result,
            Err(CourierError::DuplicateCommandRegistration(_))
        ));
    }
}
