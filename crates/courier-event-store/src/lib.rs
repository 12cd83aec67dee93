//! Storage collaborators for the Courier event-sourcing framework.

pub mod memory_storage;
pub mod pg_storage;
pub mod schema;

pub use memory_storage::MemoryStorage;
pub use pg_storage::PgStorage;
