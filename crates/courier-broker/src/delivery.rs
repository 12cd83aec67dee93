//! Hands one message to one processor, decoding through the type registry.

use courier_core::broker::{Inbound, Message, MessageProcessor};
use courier_core::error::BoxError;
use courier_core::registry::TypeRegistry;
use tracing::warn;

use crate::stats::DeliveryStats;

/// Decodes `message` and runs `processor`, then counts the outcome. Failures
/// are logged and never returned.
pub(crate) async fn deliver(
    registry: &TypeRegistry,
    processor: &dyn MessageProcessor,
    stats: &DeliveryStats,
    message: Message,
) {
    let subject = message.subject.clone();
    let aggregate_id = message.aggregate_id.clone();
    let version = message.version;
    let correlation_id = message.correlation_id;
    match process(registry, processor, message).await {
        Ok(()) => stats.record_delivered(),
        Err(err) => {
            stats.record_failed();
            warn!(
                %subject,
                %aggregate_id,
                version,
                %correlation_id,
                error = %err,
                "event delivery failed"
            );
        }
    }
}

async fn process(
    registry: &TypeRegistry,
    processor: &dyn MessageProcessor,
    message: Message,
) -> Result<(), BoxError> {
    let descriptor = registry
        .get(&message.subject)
        .ok_or_else(|| format!("no type registered for {}", message.subject))?;
    let payload = descriptor.decode(&message.payload)?;
    processor
        .process(Inbound {
            subject: message.subject,
            aggregate_id: message.aggregate_id,
            version: message.version,
            correlation_id: message.correlation_id,
            payload,
        })
        .await
}
