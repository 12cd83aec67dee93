//! Read-side projection of account balances, fed by broker deliveries.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use courier_core::event::Event;
use serde::Serialize;
use tracing::debug;

use crate::domain::aggregates::AccountStatus;
use crate::domain::events::AccountEvent;

/// Read-only view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    /// The account identifier.
    pub account_id: String,
    /// The account holder. Empty until `account.opened` has been seen.
    pub owner: String,
    /// Balance as of `version`.
    pub balance: u64,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Highest stream version folded into this view.
    pub version: i64,
}

impl AccountView {
    fn empty(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_owned(),
            owner: String::new(),
            balance: 0,
            status: AccountStatus::Unopened,
            version: 0,
        }
    }
}

/// In-memory balance projection.
///
/// Deliveries may arrive more than once and out of order, so each view keeps
/// the balance carried by the highest version it has seen.
#[derive(Debug, Default)]
pub struct BalanceProjection {
    views: RwLock<HashMap<String, AccountView>>,
}

impl BalanceProjection {
    /// Creates an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one delivered event into its account view.
    pub fn apply(&self, event: &Event<AccountEvent>) {
        let payload = event.payload();
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        let view = views
            .entry(payload.account_id().to_owned())
            .or_insert_with(|| AccountView::empty(payload.account_id()));

        match payload {
            AccountEvent::Opened(opened) => {
                view.owner.clone_from(&opened.owner);
                if view.status == AccountStatus::Unopened {
                    view.status = AccountStatus::Open;
                }
            }
            AccountEvent::Closed(_) => view.status = AccountStatus::Closed,
            AccountEvent::Deposited(_) | AccountEvent::Withdrawn(_) => {
                if view.status == AccountStatus::Unopened {
                    view.status = AccountStatus::Open;
                }
            }
        }

        if event.version() > view.version {
            view.version = event.version();
            view.balance = payload.balance();
        } else {
            debug!(
                account_id = %view.account_id,
                version = event.version(),
                seen = view.version,
                "skipping stale account event"
            );
        }
    }

    /// Returns the view for `account_id`, if any event for it has arrived.
    #[must_use]
    pub fn get(&self, account_id: &str) -> Option<AccountView> {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account_id)
            .cloned()
    }

    /// Number of accounts tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no account has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{AccountClosed, AccountOpened, Deposited, Withdrawn};

    fn opened(balance: u64) -> Event<AccountEvent> {
        Event::with_version(
            AccountEvent::Opened(AccountOpened {
                account_id: "acc-1".to_owned(),
                owner: "ada".to_owned(),
                balance,
            }),
            1,
        )
    }

    fn deposited(amount: u64, balance: u64, version: i64) -> Event<AccountEvent> {
        Event::with_version(
            AccountEvent::Deposited(Deposited {
                account_id: "acc-1".to_owned(),
                amount,
                balance,
            }),
            version,
        )
    }

    #[test]
    fn test_in_order_events_build_view() {
        // Arrange
        let projection = BalanceProjection::new();

        // Act
        projection.apply(&opened(10));
        projection.apply(&deposited(5, 15, 2));
        projection.apply(&Event::with_version(
            AccountEvent::Withdrawn(Withdrawn {
                account_id: "acc-1".to_owned(),
                amount: 15,
                balance: 0,
            }),
            3,
        ));

        // Assert
        let view = projection.get("acc-1").unwrap();
        assert_eq!(view.owner, "ada");
        assert_eq!(view.balance, 0);
        assert_eq!(view.version, 3);
        assert_eq!(view.status, AccountStatus::Open);
    }

    #[test]
    fn test_out_of_order_delivery_keeps_latest_balance() {
        let projection = BalanceProjection::new();

        projection.apply(&deposited(5, 15, 2));
        projection.apply(&opened(10));

        let view = projection.get("acc-1").unwrap();
        assert_eq!(view.balance, 15);
        assert_eq!(view.version, 2);
        assert_eq!(view.owner, "ada");
    }

    #[test]
    fn test_duplicate_delivery_is_harmless() {
        let projection = BalanceProjection::new();

        projection.apply(&opened(10));
        projection.apply(&deposited(5, 15, 2));
        projection.apply(&deposited(5, 15, 2));

        assert_eq!(projection.get("acc-1").unwrap().balance, 15);
        assert_eq!(projection.len(), 1);
    }

    #[test]
    fn test_closed_is_terminal() {
        let projection = BalanceProjection::new();

        projection.apply(&Event::with_version(
            AccountEvent::Closed(AccountClosed {
                account_id: "acc-1".to_owned(),
                balance: 0,
            }),
            2,
        ));
        projection.apply(&opened(0));

        assert_eq!(
            projection.get("acc-1").unwrap().status,
            AccountStatus::Closed
        );
    }

    #[test]
    fn test_unknown_account_has_no_view() {
        let projection = BalanceProjection::new();

        assert!(projection.get("missing").is_none());
        assert!(projection.is_empty());
    }
}
