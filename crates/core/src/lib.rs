//! `prodrel-core`: identifiers and record references shared by every crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod record;

pub use error::{DomainError, DomainResult};
pub use id::{RecordId, RelationId, RelationTypeId};
pub use record::{Record, RecordRef};
