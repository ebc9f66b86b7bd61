//! Infrastructure layer: relation stores and configuration.

pub mod config;
pub mod relation_store;

#[cfg(test)]
mod integration_tests;

pub use config::{connect_postgres, open_store, ConfigError, RelationsConfig, StoreBackend};
pub use relation_store::{InMemoryRelationStore, PostgresRelationStore};
