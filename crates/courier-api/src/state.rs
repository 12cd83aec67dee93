//! Shared application state.

use std::sync::Arc;

use courier_accounts::application::projections::BalanceProjection;
use courier_accounts::application::registration;
use courier_accounts::domain::aggregates::Account;
use courier_client::{Client, ClientConfig};
use courier_core::broker::Broker;
use courier_core::error::CourierError;
use courier_core::registry::TypeRegistry;
use courier_core::storage::Storage;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Client dispatching account commands.
    pub client: Arc<Client<Account>>,
    /// Read side fed by broker deliveries.
    pub balances: Arc<BalanceProjection>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(client: Arc<Client<Account>>, balances: Arc<BalanceProjection>) -> Self {
        Self { client, balances }
    }

    /// Builds an accounts client over the given collaborators and registers
    /// the accounts context on it. The client is returned unopened.
    ///
    /// # Errors
    ///
    /// Returns `CourierError` if registration or a broker subscription fails.
    pub async fn assemble(
        storage: Arc<dyn Storage>,
        broker: Arc<dyn Broker>,
        registry: Arc<TypeRegistry>,
        config: ClientConfig,
    ) -> Result<Self, CourierError> {
        let client = Client::<Account>::builder()
            .storage(storage)
            .broker(broker)
            .registry(registry)
            .config(config)
            .build()?;
        let balances = Arc::new(BalanceProjection::new());
        registration::register(&client, Arc::clone(&balances)).await?;
        Ok(Self::new(Arc::new(client), balances))
    }
}
