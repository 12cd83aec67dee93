//! Application layer for the Accounts context.

pub mod projections;
pub mod registration;
