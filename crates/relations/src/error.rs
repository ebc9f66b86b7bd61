//! Errors surfaced by relation resolution and cascades.

use thiserror::Error;

use prodrel_core::DomainError;

use crate::store::RelationStoreError;

#[derive(Debug, Error)]
pub enum RelationError {
    #[error(transparent)]
    Store(#[from] RelationStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type RelationResult<T> = Result<T, RelationError>;
