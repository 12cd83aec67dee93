//! Broker collaborators for the Courier event-sourcing framework.

mod delivery;
pub mod memory_broker;
pub mod nats_broker;
mod stats;

pub use memory_broker::MemoryBroker;
pub use nats_broker::NatsBroker;
pub use stats::DeliveryStats;
