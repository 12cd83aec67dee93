//! Server configuration read from the environment.

use std::net::SocketAddr;

use courier_client::ClientConfig;

use crate::error::AppError;

/// Selects the storage collaborator.
pub const STORAGE_ENV: &str = "COURIER_STORAGE";
/// PostgreSQL connection string, required for `postgres` storage.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Pool size for `postgres` storage.
pub const DATABASE_MAX_CONNECTIONS_ENV: &str = "DATABASE_MAX_CONNECTIONS";
/// Selects the broker collaborator; `memory` when unset.
pub const BROKER_ENV: &str = "COURIER_BROKER";
/// NATS server address, required for the `nats` broker.
pub const NATS_URL_ENV: &str = "NATS_URL";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

/// Where committed events are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// `PgStorage` against the given database.
    Postgres {
        /// Connection string.
        database_url: String,
        /// Pool size.
        max_connections: u32,
    },
    /// `MemoryStorage`; history is lost on restart.
    Memory,
}

/// Where committed events are published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BrokerBackend {
    /// `MemoryBroker`; subscribers live in this process.
    #[default]
    Memory,
    /// `NatsBroker` against the given server.
    Nats {
        /// Server address.
        url: String,
    },
}

/// Settings for the API binary.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Storage collaborator.
    pub storage: StorageBackend,
    /// Broker collaborator.
    pub broker: BrokerBackend,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Client settings.
    pub client: ClientConfig,
}

impl ApiConfig {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ApiConfig::from_lookup`].
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    ///
    /// The storage backend has no default: `COURIER_STORAGE` must name
    /// `postgres` or `memory`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for a missing storage choice, a missing
    /// `DATABASE_URL` with `postgres`, a missing `NATS_URL` with `nats`, or
    /// any unparsable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup(STORAGE_ENV).as_deref().map(str::trim) {
            Some("postgres") => {
                let database_url = lookup(DATABASE_URL_ENV).ok_or_else(|| {
                    AppError::Config(format!(
                        "{DATABASE_URL_ENV} must be set when {STORAGE_ENV}=postgres"
                    ))
                })?;
                let max_connections = match lookup(DATABASE_MAX_CONNECTIONS_ENV) {
                    Some(value) => value.trim().parse().map_err(|e| {
                        AppError::Config(format!(
                            "{DATABASE_MAX_CONNECTIONS_ENV} must be a valid u32: {e}"
                        ))
                    })?,
                    None => DEFAULT_MAX_CONNECTIONS,
                };
                StorageBackend::Postgres {
                    database_url,
                    max_connections,
                }
            }
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "{STORAGE_ENV} must be `postgres` or `memory`, got `{other}`"
                )));
            }
            None => {
                return Err(AppError::Config(format!(
                    "{STORAGE_ENV} must be set to `postgres` or `memory`"
                )));
            }
        };

        let broker = match lookup(BROKER_ENV).as_deref().map(str::trim) {
            None | Some("memory") => BrokerBackend::Memory,
            Some("nats") => BrokerBackend::Nats {
                url: lookup(NATS_URL_ENV).ok_or_else(|| {
                    AppError::Config(format!("{NATS_URL_ENV} must be set when {BROKER_ENV}=nats"))
                })?,
            },
            Some(other) => {
                return Err(AppError::Config(format!(
                    "{BROKER_ENV} must be `memory` or `nats`, got `{other}`"
                )));
            }
        };

        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = match lookup("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => DEFAULT_PORT,
        };
        let client = ClientConfig::from_lookup(&lookup)
            .map_err(|e| AppError::Config(e.to_string()))?;

        Ok(Self {
            storage,
            broker,
            host,
            port,
            client,
        })
    }

    /// The socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if host and port do not form an address.
    pub fn addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}
