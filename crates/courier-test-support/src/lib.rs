//! Shared test doubles and fixtures for the Courier workspace.

mod broker;
mod clock;
mod storage;
mod tally;

pub use broker::{FailingBroker, RecordingBroker};
pub use clock::FixedClock;
pub use storage::{FailingStorage, RecordingStorage};
pub use tally::{
    Decrement, Decremented, Increment, IncrementMany, IncrementUnnamed, Incremented, Tally,
    TallyError, TallyEvent, Touch,
};
