//! Business-rule violations for the Accounts context.

use thiserror::Error;

/// Errors raised by the [`Account`](super::aggregates::Account) aggregate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    /// The account has already been opened.
    #[error("account {0} is already open")]
    AlreadyOpen(String),

    /// The account has never been opened.
    #[error("account {0} does not exist")]
    NotOpen(String),

    /// The account has been closed.
    #[error("account {0} is closed")]
    Closed(String),

    /// An account needs a named holder.
    #[error("owner must not be empty")]
    MissingOwner,

    /// Deposits and withdrawals must move money.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// The withdrawal exceeds the balance.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Current balance.
        balance: u64,
        /// Amount requested.
        requested: u64,
    },

    /// The balance would overflow.
    #[error("balance overflow")]
    Overflow,

    /// Only empty accounts can be closed.
    #[error("account still holds {0}")]
    NonZeroBalance(u64),
}
