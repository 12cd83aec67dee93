//! `Tally` — a minimal counter aggregate used as a dispatch fixture.

use courier_core::aggregate::{Aggregate, AggregateState};
use courier_core::command::{Command, Handles};
use courier_core::context::Context;
use courier_core::event::DomainEvent;
use serde::{Deserialize, Serialize};

/// Payload of `tally.incremented`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incremented {
    pub tally_id: String,
    pub by: i64,
}

/// Payload of `tally.decremented`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decremented {
    pub tally_id: String,
    pub by: i64,
}

/// Events produced by [`Tally`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TallyEvent {
    #[serde(rename = "tally.incremented")]
    Incremented(Incremented),
    #[serde(rename = "tally.decremented")]
    Decremented(Decremented),
}

impl DomainEvent for TallyEvent {}

/// Errors raised by [`Tally`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("tally would go negative: total {total}, decrement {by}")]
    WouldGoNegative { total: i64, by: i64 },
    #[error("step must be positive, got {0}")]
    InvalidStep(i64),
}

/// Adds `by` to the tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Increment {
    pub tally_id: String,
    pub by: i64,
}

/// Adds each step in order, one event per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementMany {
    pub tally_id: String,
    pub steps: Vec<i64>,
}

/// Validates the tally but records nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Touch {
    pub tally_id: String,
}

/// Subtracts `by`, refusing to go below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decrement {
    pub tally_id: String,
    pub by: i64,
}

/// Increments a tally that never gets an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementUnnamed {
    pub by: i64,
}

impl Command for Increment {
    const NAME: &'static str = "tally.increment";

    fn aggregate_id(&self) -> Option<String> {
        Some(self.tally_id.clone())
    }
}

impl Command for IncrementMany {
    const NAME: &'static str = "tally.increment_many";

    fn aggregate_id(&self) -> Option<String> {
        Some(self.tally_id.clone())
    }
}

impl Command for Touch {
    const NAME: &'static str = "tally.touch";

    fn aggregate_id(&self) -> Option<String> {
        Some(self.tally_id.clone())
    }
}

impl Command for Decrement {
    const NAME: &'static str = "tally.decrement";

    fn aggregate_id(&self) -> Option<String> {
        Some(self.tally_id.clone())
    }
}

impl Command for IncrementUnnamed {
    const NAME: &'static str = "tally.increment_unnamed";
}

/// Counter aggregate. The total is rebuilt purely from events.
#[derive(Debug, Default)]
pub struct Tally {
    id: String,
    total: i64,
    state: AggregateState<TallyEvent>,
}

impl Tally {
    /// Current total.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.total
    }

    fn increment(&mut self, tally_id: String, by: i64) -> Result<(), TallyError> {
        if by <= 0 {
            return Err(TallyError::InvalidStep(by));
        }
        self.record(TallyEvent::Incremented(Incremented { tally_id, by }))
    }
}

impl Aggregate for Tally {
    const AGGREGATE_TYPE: &'static str = "tally";
    type Event = TallyEvent;
    type Error = TallyError;

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &AggregateState<TallyEvent> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AggregateState<TallyEvent> {
        &mut self.state
    }

    fn apply_change(&mut self, event: &TallyEvent) -> Result<(), TallyError> {
        match event {
            TallyEvent::Incremented(e) => {
                self.id.clone_from(&e.tally_id);
                self.total += e.by;
            }
            TallyEvent::Decremented(e) => {
                self.id.clone_from(&e.tally_id);
                self.total -= e.by;
            }
        }
        Ok(())
    }
}

impl Handles<Increment> for Tally {
    fn handle(&mut self, _ctx: &Context, command: Increment) -> Result<(), TallyError> {
        self.increment(command.tally_id, command.by)
    }
}

impl Handles<IncrementMany> for Tally {
    fn handle(&mut self, _ctx: &Context, command: IncrementMany) -> Result<(), TallyError> {
        for by in command.steps {
            self.increment(command.tally_id.clone(), by)?;
        }
        Ok(())
    }
}

impl Handles<Touch> for Tally {
    fn handle(&mut self, _ctx: &Context, _command: Touch) -> Result<(), TallyError> {
        Ok(())
    }
}

impl Handles<Decrement> for Tally {
    fn handle(&mut self, _ctx: &Context, command: Decrement) -> Result<(), TallyError> {
        if command.by <= 0 {
            return Err(TallyError::InvalidStep(command.by));
        }
        if self.total < command.by {
            return Err(TallyError::WouldGoNegative {
                total: self.total,
                by: command.by,
            });
        }
        self.record(TallyEvent::Decremented(Decremented {
            tally_id: command.tally_id,
            by: command.by,
        }))
    }
}

impl Handles<IncrementUnnamed> for Tally {
    fn handle(&mut self, _ctx: &Context, command: IncrementUnnamed) -> Result<(), TallyError> {
        self.increment(String::new(), command.by)
    }
}
