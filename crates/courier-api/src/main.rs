//! Courier API server entry point.

use std::error::Error;
use std::sync::Arc;

use courier_api::config::{ApiConfig, BrokerBackend, StorageBackend};
use courier_api::error::AppError;
use courier_api::state::AppState;
use courier_broker::{DeliveryStats, MemoryBroker, NatsBroker};
use courier_core::broker::Broker;
use courier_core::context::Context;
use courier_core::registry::TypeRegistry;
use courier_core::storage::Storage;
use courier_event_store::{MemoryStorage, PgStorage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Courier API server");

    let config = ApiConfig::from_env()?;

    let storage: Arc<dyn Storage> = match &config.storage {
        StorageBackend::Postgres {
            database_url,
            max_connections,
        } => Arc::new(PgStorage::connect(database_url, *max_connections).await?),
        StorageBackend::Memory => {
            warn!("using in-memory storage; history is lost on restart");
            Arc::new(MemoryStorage::new())
        }
    };

    let registry = Arc::new(TypeRegistry::new());
    let (broker, stats): (Arc<dyn Broker>, Arc<DeliveryStats>) = match &config.broker {
        BrokerBackend::Memory => {
            let broker = Arc::new(MemoryBroker::new(Arc::clone(&registry)));
            let stats = broker.stats();
            (broker, stats)
        }
        BrokerBackend::Nats { url } => {
            info!(%url, "using nats broker");
            let broker = Arc::new(NatsBroker::new(url.clone(), Arc::clone(&registry)));
            let stats = broker.stats();
            (broker, stats)
        }
    };
    let state = AppState::assemble(storage, broker, registry, config.client).await?;
    state.client.open(&Context::new()).await?;

    let app = courier_api::app(state.clone());

    let addr = config.addr()?;
    info!(%addr, rehydration = %config.client.rehydration, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::Server)?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    state.client.close().await?;
    info!(
        delivered = stats.delivered(),
        failed = stats.failed(),
        "Server shutdown complete"
    );

    Ok(())
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
