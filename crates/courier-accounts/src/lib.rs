//! Courier Accounts — a sample bounded context built on the framework.
//!
//! Accounts are opened, credited, debited and closed through commands; every
//! event carries the resulting balance so the read side can be rebuilt from
//! any single event.

pub mod application;
pub mod domain;
