//! Products: the catalog record type that owns relations.
//!
//! This crate contains the product record and its relation filters (no IO,
//! no storage).

pub mod product;

pub use product::{InStockFilter, PricingMetadata, Product, ProductId};
