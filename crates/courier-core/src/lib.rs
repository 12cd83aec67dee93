//! Courier Core — event-sourcing abstractions.
//!
//! This crate defines the aggregate engine, the command and event capability
//! traits, the event-kind type registry and the contracts for the storage and
//! broker collaborators. It contains no infrastructure code.

pub mod aggregate;
pub mod broker;
pub mod clock;
pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod registry;
pub mod storage;
