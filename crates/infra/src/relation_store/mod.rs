//! Relation store backends.
//!
//! - [`InMemoryRelationStore`]: tests/dev, generic over the record type
//! - [`PostgresRelationStore`]: products persisted in PostgreSQL

pub mod in_memory;
pub mod postgres;
pub mod sql;

pub use in_memory::InMemoryRelationStore;
pub use postgres::PostgresRelationStore;
