//! In-process publish/subscribe broker.
//!
//! Every published message is handed to each subscriber of its subject on a
//! separate `tokio` task. The payload is rebuilt through the broker's type
//! registry inside that task, so a slow or failing subscriber never holds up
//! the publisher or its siblings. Each subscription binds its descriptor in
//! that registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use courier_core::broker::{Broker, Message, MessageProcessor};
use courier_core::clock::{Clock, SystemClock};
use courier_core::context::Context;
use courier_core::error::BrokerError;
use courier_core::registry::{TypeDescriptor, TypeRegistry};

use crate::delivery::deliver;
use crate::stats::DeliveryStats;

type Subscribers = HashMap<String, Vec<Arc<dyn MessageProcessor>>>;

/// Broker that delivers within the current process.
pub struct MemoryBroker {
    registry: Arc<TypeRegistry>,
    subscriptions: RwLock<Subscribers>,
    open: AtomicBool,
    in_flight: Mutex<JoinSet<()>>,
    stats: Arc<DeliveryStats>,
    clock: Arc<dyn Clock>,
}

impl MemoryBroker {
    /// Creates a closed broker decoding inbound payloads through `registry`.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            subscriptions: RwLock::new(HashMap::new()),
            open: AtomicBool::new(false),
            in_flight: Mutex::new(JoinSet::new()),
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

    /// Delivery counters since construction.
    #[must_use]
    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Number of processors subscribed to `subject`.
    #[must_use]
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .map_or(0, Vec::len)
    }

    /// Waits until every delivery spawned so far has finished.
    pub async fn flush(&self) {
        let mut pending = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *in_flight)
        };
        while let Some(result) = pending.join_next().await {
            if let Err(err) = result {
                self.stats.record_failed();
                warn!(error = %err, "delivery task aborted");
            }
        }
    }

    fn guard(&self, ctx: &Context) -> Result<(), BrokerError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(BrokerError::NotOpen);
        }
        if ctx.is_expired(self.clock.as_ref()) {
            return Err(BrokerError::Cancelled);
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("open", &self.open.load(Ordering::Acquire))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn open(&self, ctx: &Context) -> Result<(), BrokerError> {
        if ctx.is_expired(self.clock.as_ref()) {
            return Err(BrokerError::Cancelled);
        }
        self.open.store(true, Ordering::Release);
        info!("memory broker opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.open.store(false, Ordering::Release);
        self.flush().await;
        info!(
            delivered = self.stats.delivered(),
            failed = self.stats.failed(),
            "memory broker closed"
        );
        Ok(())
    }

    async fn publish(&self, ctx: &Context, message: &Message) -> Result<(), BrokerError> {
        self.guard(ctx)?;
        let subscribers = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.subject)
            .cloned()
            .unwrap_or_default();
        if subscribers.is_empty() {
            debug!(subject = %message.subject, "no subscribers");
            return Ok(());
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while in_flight.try_join_next().is_some() {}
        for processor in subscribers {
            let registry = Arc::clone(&self.registry);
            let stats = Arc::clone(&self.stats);
            let message = message.clone();
            in_flight.spawn(async move {
                deliver(&registry, processor.as_ref(), &stats, message).await;
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        descriptor: TypeDescriptor,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), BrokerError> {
        let subject = descriptor.kind().to_owned();
        self.registry.insert(descriptor);
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subject.clone())
            .or_default()
            .push(processor);
        debug!(%subject, "subscribed");
        Ok(())
    }
}
