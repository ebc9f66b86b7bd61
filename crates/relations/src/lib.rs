//! Typed relations between catalog records.
//!
//! Records (products) point at other records through positioned edges tagged
//! with a relation type ("Upsells", "Cross Sell"). Each relation type becomes
//! an accessor on the owning record type (`upsells`, `cross_sells`) returning
//! the visible targets in position order.

pub mod accessor;
pub mod cascade;
pub mod error;
pub mod filter;
pub mod model;
pub mod naming;
pub mod registry;
pub mod resolver;
pub mod store;

pub use accessor::{HasRelations, RecordRelations};
pub use cascade::CascadeDestroyer;
pub use error::{RelationError, RelationResult};
pub use filter::{
    default_condition, CompareOp, Condition, FilterAttributes, FilterLayers, Narrow,
    RelationFilter, Value, AVAILABLE_ON, DELETED_AT,
};
pub use model::{NewRelation, NewRelationType, Relation, RelationType};
pub use registry::RelationTypeRegistry;
pub use resolver::RelationResolver;
pub use store::{CascadeReport, RelationStore, RelationStoreError, SchemaState};
