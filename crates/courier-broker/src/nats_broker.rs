//! NATS-backed broker.
//!
//! Each message is published on its event kind with the serialized event as
//! the body. Aggregate id, version and correlation id travel as headers.
//! Every subscription runs a listener task that hands each inbound message to
//! its own handler task, decoding through the broker's type registry.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_nats::{Client, HeaderMap, Subscriber};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_core::broker::{Broker, Message, MessageProcessor};
use courier_core::clock::{Clock, SystemClock};
use courier_core::context::Context;
use courier_core::error::{BoxError, BrokerError};
use courier_core::registry::{TypeDescriptor, TypeRegistry};

use crate::delivery::deliver;
use crate::stats::DeliveryStats;

/// Header carrying the aggregate id.
pub const AGGREGATE_ID_HEADER: &str = "Courier-Aggregate-Id";
/// Header carrying the committed version.
pub const VERSION_HEADER: &str = "Courier-Version";
/// Header carrying the dispatch correlation id.
pub const CORRELATION_ID_HEADER: &str = "Courier-Correlation-Id";

type Subscription = (String, Arc<dyn MessageProcessor>);

/// Broker publishing to and consuming from a NATS server.
pub struct NatsBroker {
    url: String,
    registry: Arc<TypeRegistry>,
    connection: RwLock<Option<Client>>,
    subscriptions: Mutex<Vec<Subscription>>,
    listeners: std::sync::Mutex<JoinSet<()>>,
    shutdown: watch::Sender<bool>,
    stats: Arc<DeliveryStats>,
    clock: Arc<dyn Clock>,
}

impl NatsBroker {
    /// Creates a closed broker for the server at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, registry: Arc<TypeRegistry>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            url: url.into(),
            registry,
            connection: RwLock::new(None),
            subscriptions: Mutex::new(Vec::new()),
            listeners: std::sync::Mutex::new(JoinSet::new()),
            shutdown,
            stats: Arc::new(DeliveryStats::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for deadline checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Server address this broker connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Delivery counters since construction.
    #[must_use]
    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Number of processors subscribed to `subject`, connected or not.
    pub async fn subscriber_count(&self, subject: &str) -> usize {
        self.subscriptions
            .lock()
            .await
            .iter()
            .filter(|(recorded, _)| recorded == subject)
            .count()
    }

    fn connected(&self) -> Option<Client> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn listen(
        &self,
        client: &Client,
        subject: &str,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), BrokerError> {
        let subscriber = client
            .subscribe(subject.to_owned())
            .await
            .map_err(|err| BrokerError::Rejected(err.to_string()))?;
        let registry = Arc::clone(&self.registry);
        let stats = Arc::clone(&self.stats);
        let shutdown = self.shutdown.subscribe();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(consume(subscriber, processor, registry, stats, shutdown));
        debug!(subject, "listening");
        Ok(())
    }
}

impl fmt::Debug for NatsBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsBroker")
            .field("url", &self.url)
            .field("connected", &self.connected().is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn open(&self, ctx: &Context) -> Result<(), BrokerError> {
        if ctx.is_expired(self.clock.as_ref()) {
            return Err(BrokerError::Cancelled);
        }
        let subscriptions = self.subscriptions.lock().await;
        let client = async_nats::connect(self.url.as_str())
            .await
            .map_err(|err| BrokerError::Unreachable(err.to_string()))?;
        self.shutdown.send_replace(false);
        for (subject, processor) in subscriptions.iter() {
            if let Err(err) = self.listen(&client, subject, Arc::clone(processor)).await {
                self.shutdown.send_replace(true);
                return Err(err);
            }
        }
        *self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(client);
        info!(url = %self.url, subscriptions = subscriptions.len(), "nats broker connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let client = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shutdown.send_replace(true);
        let mut listeners = {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *listeners)
        };
        while let Some(result) = listeners.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "nats listener aborted");
            }
        }
        if let Some(client) = client {
            client
                .flush()
                .await
                .map_err(|err| BrokerError::Unreachable(err.to_string()))?;
        }
        info!(
            delivered = self.stats.delivered(),
            failed = self.stats.failed(),
            "nats broker closed"
        );
        Ok(())
    }

    async fn publish(&self, ctx: &Context, message: &Message) -> Result<(), BrokerError> {
        let client = self.connected().ok_or(BrokerError::NotOpen)?;
        if ctx.is_expired(self.clock.as_ref()) {
            return Err(BrokerError::Cancelled);
        }
        client
            .publish_with_headers(
                message.subject.clone(),
                headers_for(message),
                message.payload.clone().into(),
            )
            .await
            .map_err(|err| BrokerError::Unreachable(err.to_string()))?;
        client
            .flush()
            .await
            .map_err(|err| BrokerError::Unreachable(err.to_string()))?;
        debug!(subject = %message.subject, version = message.version, "published to nats");
        Ok(())
    }

    async fn subscribe(
        &self,
        descriptor: TypeDescriptor,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), BrokerError> {
        let subject = descriptor.kind().to_owned();
        self.registry.insert(descriptor);
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(client) = self.connected() {
            self.listen(&client, &subject, Arc::clone(&processor)).await?;
        }
        subscriptions.push((subject.clone(), processor));
        debug!(%subject, "subscribed");
        Ok(())
    }
}

/// Runs until the subscription ends or shutdown is signalled, then waits for
/// the handlers it spawned.
async fn consume(
    mut subscriber: Subscriber,
    processor: Arc<dyn MessageProcessor>,
    registry: Arc<TypeRegistry>,
    stats: Arc<DeliveryStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut handlers = JoinSet::new();
    loop {
        tokio::select! {
            next = subscriber.next() => {
                let Some(inbound) = next else { break };
                let subject: &str = &inbound.subject;
                match message_from(subject, inbound.headers.as_ref(), &inbound.payload) {
                    Ok(message) => {
                        let processor = Arc::clone(&processor);
                        let registry = Arc::clone(&registry);
                        let stats = Arc::clone(&stats);
                        handlers.spawn(async move {
                            deliver(&registry, processor.as_ref(), &stats, message).await;
                        });
                    }
                    Err(err) => {
                        stats.record_failed();
                        warn!(subject, error = %err, "malformed nats message");
                    }
                }
                while handlers.try_join_next().is_some() {}
            }
            _ = shutdown.changed() => break,
        }
    }
    if let Err(err) = subscriber.unsubscribe().await {
        debug!(error = %err, "nats unsubscribe failed");
    }
    while let Some(result) = handlers.join_next().await {
        if let Err(err) = result {
            stats.record_failed();
            warn!(error = %err, "delivery task aborted");
        }
    }
}

/// Headers describing `message`.
#[must_use]
pub fn headers_for(message: &Message) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AGGREGATE_ID_HEADER, message.aggregate_id.as_str());
    headers.insert(VERSION_HEADER, message.version.to_string());
    headers.insert(CORRELATION_ID_HEADER, message.correlation_id.to_string());
    headers
}

/// Rebuilds a [`Message`] from what arrived on `subject`.
///
/// # Errors
///
/// Fails if a Courier header is missing or does not parse.
pub fn message_from(
    subject: &str,
    headers: Option<&HeaderMap>,
    payload: &[u8],
) -> Result<Message, BoxError> {
    let headers = headers.ok_or("message carries no headers")?;
    let header = |name: &str| {
        headers
            .get(name)
            .map(|value| value.as_str().to_owned())
            .ok_or_else(|| format!("missing header {name}"))
    };
    let version = header(VERSION_HEADER)?
        .parse::<i64>()
        .map_err(|err| format!("bad {VERSION_HEADER}: {err}"))?;
    let correlation_id = Uuid::parse_str(&header(CORRELATION_ID_HEADER)?)
        .map_err(|err| format!("bad {CORRELATION_ID_HEADER}: {err}"))?;
    Ok(Message {
        subject: subject.to_owned(),
        aggregate_id: header(AGGREGATE_ID_HEADER)?,
        version,
        correlation_id,
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use courier_core::broker::typed_processor;
    use courier_core::event::Event;
    use courier_test_support::{FixedClock, TallyEvent};

    use super::*;

    fn message() -> Message {
        Message {
            subject: "tally.incremented".to_owned(),
            aggregate_id: "t-1".to_owned(),
            version: 7,
            correlation_id: Uuid::new_v4(),
            payload: br#"{"tally_id":"t-1","by":2}"#.to_vec(),
        }
    }

    fn ignore() -> Arc<dyn MessageProcessor> {
        typed_processor::<TallyEvent, _>(|_: Event<TallyEvent>| -> Result<(), BoxError> { Ok(()) })
    }

    #[test]
    fn test_headers_carry_identity_version_and_correlation() {
        // Arrange
        let original = message();

        // Act
        let headers = headers_for(&original);
        let rebuilt = message_from("tally.incremented", Some(&headers), &original.payload).unwrap();

        // Assert
        assert_eq!(headers.get(VERSION_HEADER).unwrap().as_str(), "7");
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_message_without_headers_is_rejected() {
        let result = message_from("tally.incremented", None, b"{}");

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_correlation_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AGGREGATE_ID_HEADER, "t-1");
        headers.insert(VERSION_HEADER, "1");

        let err = message_from("tally.incremented", Some(&headers), b"{}").unwrap_err();

        assert!(err.to_string().contains(CORRELATION_ID_HEADER));
    }

    #[test]
    fn test_unparsable_version_is_rejected() {
        let mut headers = headers_for(&message());
        headers.insert(VERSION_HEADER, "seven");

        let err = message_from("tally.incremented", Some(&headers), b"{}").unwrap_err();

        assert!(err.to_string().contains(VERSION_HEADER));
    }

    #[tokio::test]
    async fn test_publish_requires_open_broker() {
        let broker = NatsBroker::new("nats://127.0.0.1:4222", Arc::new(TypeRegistry::new()));

        let result = broker.publish(&Context::new(), &message()).await;

        assert!(matches!(result, Err(BrokerError::NotOpen)));
    }

    #[tokio::test]
    async fn test_subscribe_before_open_is_recorded_and_bound() {
        // Arrange
        let registry = Arc::new(TypeRegistry::new());
        let broker = NatsBroker::new("nats://127.0.0.1:4222", Arc::clone(&registry));

        // Act
        broker
            .subscribe(TypeDescriptor::of::<TallyEvent>("tally.incremented"), ignore())
            .await
            .unwrap();

        // Assert
        assert_eq!(broker.subscriber_count("tally.incremented").await, 1);
        assert!(registry.get("tally.incremented").unwrap().is::<TallyEvent>());
    }

    #[tokio::test]
    async fn test_open_with_expired_context_is_cancelled() {
        let clock = FixedClock::epoch();
        let broker = NatsBroker::new("nats://127.0.0.1:4222", Arc::new(TypeRegistry::new()))
            .with_clock(Arc::new(clock));
        let ctx = Context::new().with_deadline(clock.0 - Duration::seconds(1));

        let result = broker.open(&ctx).await;

        assert!(matches!(result, Err(BrokerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_close_without_open_is_ok() {
        let broker = NatsBroker::new("nats://127.0.0.1:4222", Arc::new(TypeRegistry::new()));

        assert!(broker.close().await.is_ok());
        assert!(matches!(
            broker.publish(&Context::new(), &message()).await,
            Err(BrokerError::NotOpen)
        ));
    }
}
