//! Route modules.

pub mod accounts;
pub mod commands;
pub mod health;
