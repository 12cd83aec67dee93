//! Commands for the Accounts context.

use courier_core::command::Command;
use serde::{Deserialize, Serialize};

/// Command to open an account.
///
/// Without an `account_id` the aggregate assigns a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccount {
    /// Requested identifier, if the caller picks one.
    #[serde(default)]
    pub account_id: Option<String>,
    /// The account holder.
    pub owner: String,
    /// Opening deposit.
    #[serde(default)]
    pub initial_deposit: u64,
}

/// Command to pay money in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    /// The account identifier.
    pub account_id: String,
    /// Amount to pay in.
    pub amount: u64,
}

/// Command to pay money out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdraw {
    /// The account identifier.
    pub account_id: String,
    /// Amount to pay out.
    pub amount: u64,
}

/// Command to close an empty account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseAccount {
    /// The account identifier.
    pub account_id: String,
}

impl Command for OpenAccount {
    const NAME: &'static str = "account.open";

    fn aggregate_id(&self) -> Option<String> {
        self.account_id.clone()
    }
}

impl Command for Deposit {
    const NAME: &'static str = "account.deposit";

    fn aggregate_id(&self) -> Option<String> {
        Some(self.account_id.clone())
    }
}

impl Command for Withdraw {
    const NAME: &'static str = "account.withdraw";

    fn aggregate_id(&self) -> Option<String> {
        Some(self.account_id.clone())
    }
}

impl Command for CloseAccount {
    const NAME: &'static str = "account.close";

    fn aggregate_id(&self) -> Option<String> {
        Some(self.account_id.clone())
    }
}
