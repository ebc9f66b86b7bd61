use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use prodrel_core::{DomainError, Record, RecordId};
use prodrel_relations::{
    CompareOp, Condition, FilterAttributes, HasRelations, RelationFilter, Value, AVAILABLE_ON,
    DELETED_AT,
};

/// Filterable product attributes beyond the visibility pair.
pub mod attributes {
    pub const SKU: &str = "sku";
    pub const NAME: &str = "name";
    pub const STOCK_ON_HAND: &str = "stock_on_hand";
    pub const BASE_PRICE: &str = "base_price";
    pub const CURRENCY: &str = "currency";
}

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub RecordId);

impl ProductId {
    pub fn new() -> Self {
        Self(RecordId::new())
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<RecordId> for ProductId {
    fn from(id: RecordId) -> Self {
        Self(id)
    }
}

/// Optional pricing metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingMetadata {
    pub base_price: Option<u64>, // Price in smallest currency unit (e.g., cents)
    pub currency: Option<String>, // ISO currency code (e.g., "USD", "EUR")
}

/// A catalog product.
///
/// Visibility is driven by two timestamps: `deleted_at` (soft delete) and
/// `available_on` (null or in the future means not yet on sale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    deleted_at: Option<DateTime<Utc>>,
    available_on: Option<DateTime<Utc>>,
    stock_on_hand: i64,
    pricing: PricingMetadata,
}

impl Product {
    /// Create a product that is not yet available.
    pub fn new(id: ProductId, sku: impl Into<String>, name: impl Into<String>) -> Result<Self, DomainError> {
        let sku = sku.into();
        let name = name.into();

        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }

        Ok(Self {
            id,
            sku,
            name,
            deleted_at: None,
            available_on: None,
            stock_on_hand: 0,
            pricing: PricingMetadata::default(),
        })
    }

    /// Rebuild a product from stored columns without validation.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ProductId,
        sku: String,
        name: String,
        deleted_at: Option<DateTime<Utc>>,
        available_on: Option<DateTime<Utc>>,
        stock_on_hand: i64,
        pricing: PricingMetadata,
    ) -> Self {
        Self {
            id,
            sku,
            name,
            deleted_at,
            available_on,
            stock_on_hand,
            pricing,
        }
    }

    pub fn available_from(mut self, at: DateTime<Utc>) -> Self {
        self.available_on = Some(at);
        self
    }

    pub fn with_stock(mut self, stock_on_hand: i64) -> Self {
        self.stock_on_hand = stock_on_hand;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingMetadata) -> Self {
        self.pricing = pricing;
        self
    }

    /// Mark the product deleted without removing it.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at.get_or_insert(at);
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn available_on(&self) -> Option<DateTime<Utc>> {
        self.available_on
    }

    pub fn stock_on_hand(&self) -> i64 {
        self.stock_on_hand
    }

    pub fn pricing(&self) -> &PricingMetadata {
        &self.pricing
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Not deleted and available on or before `now`.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted() && self.available_on.is_some_and(|at| at <= now)
    }
}

impl Record for Product {
    const RECORD_TYPE: &'static str = "Product";

    fn record_id(&self) -> RecordId {
        self.id.0
    }
}

impl FilterAttributes for Product {
    fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            DELETED_AT => self.deleted_at.map(Value::Timestamp),
            AVAILABLE_ON => self.available_on.map(Value::Timestamp),
            attributes::SKU => Some(Value::Text(self.sku.clone())),
            attributes::NAME => Some(Value::Text(self.name.clone())),
            attributes::STOCK_ON_HAND => Some(Value::Int(self.stock_on_hand)),
            attributes::BASE_PRICE => self
                .pricing
                .base_price
                .map(|p| Value::Int(i64::try_from(p).unwrap_or(i64::MAX))),
            attributes::CURRENCY => self.pricing.currency.clone().map(Value::Text),
            _ => None,
        }
    }
}

impl HasRelations for Product {}

/// Class-level filter: only related products that are visible and in stock.
#[derive(Debug, Copy, Clone, Default)]
pub struct InStockFilter;

impl RelationFilter for InStockFilter {
    fn condition(&self, base: Condition, _now: DateTime<Utc>) -> Condition {
        base.and(Condition::compare(attributes::STOCK_ON_HAND, CompareOp::Gt, 0_i64))
    }
}
