//! Configuration loading and representation.
//!
//! Values come from environment variables:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `PRODREL_STORE` | `memory` | `memory` or `postgres` |
//! | `DATABASE_URL` | none | Required when `PRODREL_STORE=postgres` |
//! | `PRODREL_DB_MAX_CONNECTIONS` | `5` | Pool size |
//! | `PRODREL_LOG_FORMAT` | `json` | `json` or `pretty` |
//!
//! [`open_store`] turns a config into the matching product relation store.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use prodrel_observability::LogFormat;
use prodrel_products::Product;
use prodrel_relations::RelationStore;

use crate::relation_store::{InMemoryRelationStore, PostgresRelationStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationsConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_format: LogFormat,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 5,
            log_format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

impl RelationsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup("PRODREL_STORE").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PRODREL_STORE",
                    value: other.to_string(),
                })
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let max_connections = match lookup("PRODREL_DB_MAX_CONNECTIONS") {
            None => defaults.max_connections,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    var: "PRODREL_DB_MAX_CONNECTIONS",
                    value: raw,
                })?,
        };

        let log_format = match lookup("PRODREL_LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PRODREL_LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            backend,
            database_url,
            max_connections,
            log_format,
        })
    }
}

impl RelationsConfig {
    /// Install the process-wide tracing subscriber in the configured format.
    pub fn init_logging(&self) {
        prodrel_observability::tracing::init_with(self.log_format);
    }
}

/// Connect a Postgres pool for the configured database.
pub async fn connect_postgres(config: &RelationsConfig) -> anyhow::Result<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .ok_or(ConfigError::Missing("DATABASE_URL"))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await?;

    tracing::info!(max_connections = config.max_connections, "connected to postgres");
    Ok(pool)
}

/// Product relation store for the configured backend.
pub async fn open_store(config: &RelationsConfig) -> anyhow::Result<Arc<dyn RelationStore<Product>>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory relation store");
            Ok(Arc::new(InMemoryRelationStore::<Product>::new()))
        }
        StoreBackend::Postgres => {
            let pool = connect_postgres(config).await?;
            Ok(Arc::new(PostgresRelationStore::new(pool)))
        }
    }
}
