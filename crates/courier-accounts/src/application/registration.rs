//! Wires the Accounts context into a [`Client`].

use std::sync::Arc;

use courier_client::Client;
use courier_core::error::{BoxError, CourierError};
use courier_core::event::Event;
use tracing::info;

use crate::application::projections::BalanceProjection;
use crate::domain::aggregates::Account;
use crate::domain::commands::{CloseAccount, Deposit, OpenAccount, Withdraw};
use crate::domain::events::{ACCOUNT_EVENT_KINDS, AccountEvent};

/// Registers every account command and subscribes `projection` to every
/// account event kind.
///
/// # Errors
///
/// Returns `CourierError::DuplicateCommandRegistration` when called twice on
/// the same client, or the broker's error if a subscription is refused.
pub async fn register(
    client: &Client<Account>,
    projection: Arc<BalanceProjection>,
) -> Result<(), CourierError> {
    client.add_command::<OpenAccount>()?;
    client.add_command::<Deposit>()?;
    client.add_command::<Withdraw>()?;
    client.add_command::<CloseAccount>()?;

    for kind in ACCOUNT_EVENT_KINDS {
        let projection = Arc::clone(&projection);
        client
            .add_event_processor::<AccountEvent, _>(
                kind,
                move |event: Event<AccountEvent>| -> Result<(), BoxError> {
                    projection.apply(&event);
                    Ok(())
                },
            )
            .await?;
    }

    info!(
        commands = 4,
        kinds = ACCOUNT_EVENT_KINDS.len(),
        "accounts context registered"
    );
    Ok(())
}
