//! Test brokers — mock `Broker` implementations for tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::broker::{Broker, Inbound, Message, MessageProcessor};
use courier_core::context::Context;
use courier_core::error::{BoxError, BrokerError};
use courier_core::registry::TypeDescriptor;

type Subscription = (TypeDescriptor, Arc<dyn MessageProcessor>);

/// A broker that records published messages and subscriptions without
/// delivering anything on its own.
///
/// Optionally fails the n-th publish attempt (1-based), leaving earlier
/// messages recorded. [`redeliver`](Self::redeliver) hands a recorded message
/// to the subscribers of its subject on demand.
#[derive(Default)]
pub struct RecordingBroker {
    messages: Mutex<Vec<Message>>,
    subscriptions: Mutex<Vec<Subscription>>,
    attempts: AtomicUsize,
    fail_on: Option<usize>,
}

impl RecordingBroker {
    /// Creates a broker that accepts every publish.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker whose `attempt`-th publish fails as unreachable.
    #[must_use]
    pub fn failing_on(attempt: usize) -> Self {
        Self {
            fail_on: Some(attempt),
            ..Self::default()
        }
    }

    /// Successfully published messages, in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Subjects passed to `subscribe`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn subjects(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(descriptor, _)| descriptor.kind().to_owned())
            .collect()
    }

    /// Descriptors passed to `subscribe`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn descriptors(&self) -> Vec<TypeDescriptor> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(descriptor, _)| descriptor.clone())
            .collect()
    }

    /// Decodes `message` with each matching subscription's descriptor and
    /// runs its processor, returning one result per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub async fn redeliver(&self, message: &Message) -> Vec<Result<(), BoxError>> {
        let matching: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(descriptor, _)| descriptor.kind() == message.subject)
            .cloned()
            .collect();
        let mut outcomes = Vec::with_capacity(matching.len());
        for (descriptor, processor) in matching {
            let outcome = match descriptor.decode(&message.payload) {
                Ok(payload) => {
                    processor
                        .process(Inbound {
                            subject: message.subject.clone(),
                            aggregate_id: message.aggregate_id.clone(),
                            version: message.version,
                            correlation_id: message.correlation_id,
                            payload,
                        })
                        .await
                }
                Err(err) => Err(err.into()),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Publish attempts, failed ones included.
    pub fn publish_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(&self, _ctx: &Context, message: &Message) -> Result<(), BrokerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(attempt) {
            return Err(BrokerError::Unreachable("broker down".into()));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn subscribe(
        &self,
        descriptor: TypeDescriptor,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), BrokerError> {
        self.subscriptions.lock().unwrap().push((descriptor, processor));
        Ok(())
    }
}

impl fmt::Debug for RecordingBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingBroker")
            .field("messages", &self.messages.lock().unwrap().len())
            .field("subjects", &self.subjects())
            .field("fail_on", &self.fail_on)
            .finish_non_exhaustive()
    }
}

/// A broker that refuses every publish and subscription.
#[derive(Debug)]
pub struct FailingBroker;

#[async_trait]
impl Broker for FailingBroker {
    async fn publish(&self, _ctx: &Context, _message: &Message) -> Result<(), BrokerError> {
        Err(BrokerError::Unreachable("connection refused".into()))
    }

    async fn subscribe(
        &self,
        _descriptor: TypeDescriptor,
        _processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), BrokerError> {
        Err(BrokerError::Unreachable("connection refused".into()))
    }
}
