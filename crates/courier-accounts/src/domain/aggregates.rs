//! Aggregate roots for the Accounts context.

use courier_core::aggregate::{Aggregate, AggregateState};
use courier_core::command::Handles;
use courier_core::context::Context;
use serde::Serialize;
use uuid::Uuid;

use super::commands::{CloseAccount, Deposit, OpenAccount, Withdraw};
use super::errors::AccountError;
use super::events::{AccountClosed, AccountEvent, AccountOpened, Deposited, Withdrawn};

/// Lifecycle of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// No `account.opened` event yet.
    #[default]
    Unopened,
    /// Accepting deposits and withdrawals.
    Open,
    /// Terminal.
    Closed,
}

/// The aggregate root for a bank account.
#[derive(Debug, Default)]
pub struct Account {
    id: String,
    owner: String,
    balance: u64,
    status: AccountStatus,
    state: AggregateState<AccountEvent>,
}

impl Account {
    /// The account holder.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Current balance.
    #[must_use]
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    fn ensure_open(&self, account_id: &str) -> Result<(), AccountError> {
        match self.status {
            AccountStatus::Open => Ok(()),
            AccountStatus::Unopened => Err(AccountError::NotOpen(account_id.to_owned())),
            AccountStatus::Closed => Err(AccountError::Closed(account_id.to_owned())),
        }
    }
}

impl Aggregate for Account {
    const AGGREGATE_TYPE: &'static str = "account";
    type Event = AccountEvent;
    type Error = AccountError;

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &AggregateState<AccountEvent> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AggregateState<AccountEvent> {
        &mut self.state
    }

    fn apply_change(&mut self, event: &AccountEvent) -> Result<(), AccountError> {
        match event {
            AccountEvent::Opened(opened) => {
                if self.status != AccountStatus::Unopened {
                    return Err(AccountError::AlreadyOpen(opened.account_id.clone()));
                }
                self.id.clone_from(&opened.account_id);
                self.owner.clone_from(&opened.owner);
                self.status = AccountStatus::Open;
            }
            AccountEvent::Deposited(_) | AccountEvent::Withdrawn(_) => {
                self.ensure_open(event.account_id())?;
            }
            AccountEvent::Closed(_) => {
                self.ensure_open(event.account_id())?;
                self.status = AccountStatus::Closed;
            }
        }
        self.balance = event.balance();
        Ok(())
    }
}

impl Handles<OpenAccount> for Account {
    fn handle(&mut self, _ctx: &Context, command: OpenAccount) -> Result<(), AccountError> {
        let account_id = command
            .account_id
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        if self.status != AccountStatus::Unopened {
            return Err(AccountError::AlreadyOpen(account_id));
        }
        let owner = command.owner.trim();
        if owner.is_empty() {
            return Err(AccountError::MissingOwner);
        }
        self.record(AccountEvent::Opened(AccountOpened {
            account_id,
            owner: owner.to_owned(),
            balance: command.initial_deposit,
        }))
    }
}

impl Handles<Deposit> for Account {
    fn handle(&mut self, _ctx: &Context, command: Deposit) -> Result<(), AccountError> {
        self.ensure_open(&command.account_id)?;
        if command.amount == 0 {
            return Err(AccountError::InvalidAmount);
        }
        let balance = self
            .balance
            .checked_add(command.amount)
            .ok_or(AccountError::Overflow)?;
        self.record(AccountEvent::Deposited(Deposited {
            account_id: command.account_id,
            amount: command.amount,
            balance,
        }))
    }
}

impl Handles<Withdraw> for Account {
    fn handle(&mut self, _ctx: &Context, command: Withdraw) -> Result<(), AccountError> {
        self.ensure_open(&command.account_id)?;
        if command.amount == 0 {
            return Err(AccountError::InvalidAmount);
        }
        let balance =
            self.balance
                .checked_sub(command.amount)
                .ok_or(AccountError::InsufficientFunds {
                    balance: self.balance,
                    requested: command.amount,
                })?;
        self.record(AccountEvent::Withdrawn(Withdrawn {
            account_id: command.account_id,
            amount: command.amount,
            balance,
        }))
    }
}

impl Handles<CloseAccount> for Account {
    fn handle(&mut self, _ctx: &Context, command: CloseAccount) -> Result<(), AccountError> {
        self.ensure_open(&command.account_id)?;
        if self.balance != 0 {
            return Err(AccountError::NonZeroBalance(self.balance));
        }
        self.record(AccountEvent::Closed(AccountClosed {
            account_id: command.account_id,
            balance: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use courier_core::event::Event;

    use super::*;

    fn opened(balance: u64) -> Account {
        let mut account = Account::default();
        account
            .replay(vec![Event::with_version(
                AccountEvent::Opened(AccountOpened {
                    account_id: "acc-1".to_owned(),
                    owner: "ada".to_owned(),
                    balance,
                }),
                1,
            )])
            .unwrap();
        account
    }

    fn deposit(amount: u64) -> Deposit {
        Deposit {
            account_id: "acc-1".to_owned(),
            amount,
        }
    }

    fn withdraw(amount: u64) -> Withdraw {
        Withdraw {
            account_id: "acc-1".to_owned(),
            amount,
        }
    }

    #[test]
    fn test_open_records_opened_event() {
        // Arrange
        let mut account = Account::default();

        // Act
        account
            .handle(
                &Context::new(),
                OpenAccount {
                    account_id: Some("acc-1".to_owned()),
                    owner: " ada ".to_owned(),
                    initial_deposit: 25,
                },
            )
            .unwrap();

        // Assert
        assert_eq!(account.aggregate_id(), "acc-1");
        assert_eq!(account.owner(), "ada");
        assert_eq!(account.balance(), 25);
        assert_eq!(account.status(), AccountStatus::Open);
        assert_eq!(account.uncommitted().len(), 1);
        assert_eq!(account.uncommitted()[0].version(), 1);
    }

    #[test]
    fn test_open_without_id_assigns_one() {
        let mut account = Account::default();

        account
            .handle(
                &Context::new(),
                OpenAccount {
                    account_id: None,
                    owner: "ada".to_owned(),
                    initial_deposit: 0,
                },
            )
            .unwrap();

        assert!(Uuid::parse_str(account.aggregate_id()).is_ok());
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let mut account = opened(0);

        let result = account.handle(
            &Context::new(),
            OpenAccount {
                account_id: Some("acc-1".to_owned()),
                owner: "ada".to_owned(),
                initial_deposit: 0,
            },
        );

        assert_eq!(result, Err(AccountError::AlreadyOpen("acc-1".to_owned())));
        assert!(account.uncommitted().is_empty());
    }

    #[test]
    fn test_open_requires_owner() {
        let mut account = Account::default();

        let result = account.handle(
            &Context::new(),
            OpenAccount {
                account_id: None,
                owner: "   ".to_owned(),
                initial_deposit: 0,
            },
        );

        assert_eq!(result, Err(AccountError::MissingOwner));
    }

    #[test]
    fn test_deposit_then_withdraw_tracks_balance() {
        // Arrange
        let mut account = opened(10);
        let ctx = Context::new();

        // Act
        account.handle(&ctx, deposit(15)).unwrap();
        account.handle(&ctx, withdraw(20)).unwrap();

        // Assert
        assert_eq!(account.balance(), 5);
        assert_eq!(account.version(), 3);
        let versions: Vec<i64> = account.uncommitted().iter().map(Event::version).collect();
        assert_eq!(versions, vec![2, 3]);
    }

    #[test]
    fn test_deposit_on_unopened_account_is_rejected() {
        let mut account = Account::default();

        let result = account.handle(&Context::new(), deposit(5));

        assert_eq!(result, Err(AccountError::NotOpen("acc-1".to_owned())));
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let mut account = opened(10);

        assert_eq!(
            account.handle(&Context::new(), deposit(0)),
            Err(AccountError::InvalidAmount)
        );
        assert_eq!(
            account.handle(&Context::new(), withdraw(0)),
            Err(AccountError::InvalidAmount)
        );
    }

    #[test]
    fn test_overdraft_is_rejected() {
        let mut account = opened(10);

        let result = account.handle(&Context::new(), withdraw(11));

        assert_eq!(
            result,
            Err(AccountError::InsufficientFunds {
                balance: 10,
                requested: 11
            })
        );
        assert_eq!(account.balance(), 10);
    }

    #[test]
    fn test_deposit_overflow_is_rejected() {
        let mut account = opened(u64::MAX);

        let result = account.handle(&Context::new(), deposit(1));

        assert_eq!(result, Err(AccountError::Overflow));
    }

    #[test]
    fn test_close_requires_empty_balance() {
        let mut account = opened(3);

        let result = account.handle(
            &Context::new(),
            CloseAccount {
                account_id: "acc-1".to_owned(),
            },
        );

        assert_eq!(result, Err(AccountError::NonZeroBalance(3)));
    }

    #[test]
    fn test_closed_account_rejects_further_commands() {
        // Arrange
        let mut account = opened(0);
        let ctx = Context::new();
        account
            .handle(
                &ctx,
                CloseAccount {
                    account_id: "acc-1".to_owned(),
                },
            )
            .unwrap();

        // Act
        let result = account.handle(&ctx, deposit(1));

        // Assert
        assert_eq!(account.status(), AccountStatus::Closed);
        assert_eq!(result, Err(AccountError::Closed("acc-1".to_owned())));
    }

    #[test]
    fn test_replay_rebuilds_balance_from_history() {
        let mut account = Account::default();

        account
            .replay(vec![
                Event::with_version(
                    AccountEvent::Opened(AccountOpened {
                        account_id: "acc-1".to_owned(),
                        owner: "ada".to_owned(),
                        balance: 5,
                    }),
                    1,
                ),
                Event::with_version(
                    AccountEvent::Deposited(Deposited {
                        account_id: "acc-1".to_owned(),
                        amount: 10,
                        balance: 15,
                    }),
                    2,
                ),
                Event::with_version(
                    AccountEvent::Withdrawn(Withdrawn {
                        account_id: "acc-1".to_owned(),
                        amount: 4,
                        balance: 11,
                    }),
                    3,
                ),
            ])
            .unwrap();

        assert_eq!(account.balance(), 11);
        assert_eq!(account.version(), 3);
        assert!(account.uncommitted().is_empty());
    }

    #[test]
    fn test_replay_rejects_deposit_before_open() {
        let mut account = Account::default();

        let result = account.replay(vec![Event::with_version(
            AccountEvent::Deposited(Deposited {
                account_id: "acc-1".to_owned(),
                amount: 1,
                balance: 1,
            }),
            1,
        )]);

        assert_eq!(result, Err(AccountError::NotOpen("acc-1".to_owned())));
    }
}
