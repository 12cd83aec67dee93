//! Command abstractions.

use serde::de::DeserializeOwned;

use crate::aggregate::Aggregate;
use crate::context::Context;

/// Trait that all commands implement.
///
/// Commands are deserializable so they can also be dispatched by name from a
/// JSON body.
pub trait Command: DeserializeOwned + std::fmt::Debug + Send + 'static {
    /// Routing name, unique per dispatcher (e.g. `"account.deposit"`).
    const NAME: &'static str;

    /// Identity of the target aggregate when the command already knows it.
    ///
    /// Returning `None` means the aggregate assigns its own identity while
    /// handling the command, so there is no history to rehydrate.
    fn aggregate_id(&self) -> Option<String> {
        None
    }
}

/// Command-handling capability of an aggregate, one impl per command type.
pub trait Handles<C: Command>: Aggregate {
    /// Validates `command` against current state and records zero or more
    /// events through [`Aggregate::record`].
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` when a business rule rejects the command.
    fn handle(&mut self, ctx: &Context, command: C) -> Result<(), Self::Error>;
}
