//! Courier Client — command dispatch and the registration facade.
//!
//! A [`CommandDispatcher`] runs the per-dispatch transaction for one aggregate
//! type. A [`Client`] wires a dispatcher to explicitly injected storage, broker
//! and type registry, and owns their open/close lifecycle.

mod client;
mod config;
mod dispatcher;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, REHYDRATION_ENV};
pub use dispatcher::{CommandDispatcher, CommitReceipt, Rehydration};
