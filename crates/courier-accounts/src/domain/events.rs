//! Domain events for the Accounts context.

use courier_core::event::DomainEvent;
use serde::{Deserialize, Serialize};

/// Event kind for [`AccountOpened`].
pub const ACCOUNT_OPENED_EVENT_KIND: &str = "account.opened";
/// Event kind for [`Deposited`].
pub const DEPOSITED_EVENT_KIND: &str = "account.deposited";
/// Event kind for [`Withdrawn`].
pub const WITHDRAWN_EVENT_KIND: &str = "account.withdrawn";
/// Event kind for [`AccountClosed`].
pub const ACCOUNT_CLOSED_EVENT_KIND: &str = "account.closed";

/// Every kind an [`AccountEvent`] can carry.
pub const ACCOUNT_EVENT_KINDS: [&str; 4] = [
    ACCOUNT_OPENED_EVENT_KIND,
    DEPOSITED_EVENT_KIND,
    WITHDRAWN_EVENT_KIND,
    ACCOUNT_CLOSED_EVENT_KIND,
];

/// Emitted when an account is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    /// The account identifier.
    pub account_id: String,
    /// The account holder.
    pub owner: String,
    /// Balance after the opening deposit.
    pub balance: u64,
}

/// Emitted when money is paid in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    /// The account identifier.
    pub account_id: String,
    /// Amount paid in.
    pub amount: u64,
    /// Balance after the deposit.
    pub balance: u64,
}

/// Emitted when money is paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    /// The account identifier.
    pub account_id: String,
    /// Amount paid out.
    pub amount: u64,
    /// Balance after the withdrawal.
    pub balance: u64,
}

/// Emitted when an account is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountClosed {
    /// The account identifier.
    pub account_id: String,
    /// Balance at closing, always zero.
    pub balance: u64,
}

/// Event payload variants for the Accounts context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccountEvent {
    /// An account has been opened.
    #[serde(rename = "account.opened")]
    Opened(AccountOpened),
    /// Money has been deposited.
    #[serde(rename = "account.deposited")]
    Deposited(Deposited),
    /// Money has been withdrawn.
    #[serde(rename = "account.withdrawn")]
    Withdrawn(Withdrawn),
    /// The account has been closed.
    #[serde(rename = "account.closed")]
    Closed(AccountClosed),
}

impl AccountEvent {
    /// The account this event belongs to.
    #[must_use]
    pub fn account_id(&self) -> &str {
        match self {
            Self::Opened(e) => &e.account_id,
            Self::Deposited(e) => &e.account_id,
            Self::Withdrawn(e) => &e.account_id,
            Self::Closed(e) => &e.account_id,
        }
    }

    /// Balance after this event.
    #[must_use]
    pub fn balance(&self) -> u64 {
        match self {
            Self::Opened(e) => e.balance,
            Self::Deposited(e) => e.balance,
            Self::Withdrawn(e) => e.balance,
            Self::Closed(e) => e.balance,
        }
    }

    /// The stable kind this event is stored and published under.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Opened(_) => ACCOUNT_OPENED_EVENT_KIND,
            Self::Deposited(_) => DEPOSITED_EVENT_KIND,
            Self::Withdrawn(_) => WITHDRAWN_EVENT_KIND,
            Self::Closed(_) => ACCOUNT_CLOSED_EVENT_KIND,
        }
    }
}

impl DomainEvent for AccountEvent {}

#[cfg(test)]
mod tests {
    use courier_core::event;

    use super::*;

    #[test]
    fn test_kind_constants_match_serialized_tags() {
        let samples = [
            AccountEvent::Opened(AccountOpened {
                account_id: "acc-1".into(),
                owner: "ada".into(),
                balance: 0,
            }),
            AccountEvent::Deposited(Deposited {
                account_id: "acc-1".into(),
                amount: 5,
                balance: 5,
            }),
            AccountEvent::Withdrawn(Withdrawn {
                account_id: "acc-1".into(),
                amount: 5,
                balance: 0,
            }),
            AccountEvent::Closed(AccountClosed {
                account_id: "acc-1".into(),
                balance: 0,
            }),
        ];

        for sample in &samples {
            let encoded = event::encode(sample).unwrap();
            assert_eq!(encoded.kind, sample.kind());
        }
        let kinds: Vec<&str> = samples.iter().map(AccountEvent::kind).collect();
        assert_eq!(kinds, ACCOUNT_EVENT_KINDS);
    }

    #[test]
    fn test_deposited_body_is_field_named() {
        let encoded = event::encode(&AccountEvent::Deposited(Deposited {
            account_id: "acc-1".into(),
            amount: 7,
            balance: 12,
        }))
        .unwrap();

        let body: serde_json::Value = serde_json::from_slice(&encoded.data).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "account_id": "acc-1", "amount": 7, "balance": 12 })
        );
    }
}
