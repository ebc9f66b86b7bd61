//! Postgres-backed relation store for products.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RelationStoreError | Scenario |
//! |------------|----------------------|--------------------|----------|
//! | Database (unique violation) | `23505` | `Validation` | Duplicate id |
//! | Database (foreign key violation) | `23503` | `Validation` | Unknown relation type |
//! | Database (check constraint violation) | `23514` | `Validation` | Invalid column data |
//! | Database (other) | Any other | `Database` | Includes `42P01` undefined table |
//! | PoolClosed | N/A | `Database` | Connection pool was closed |
//! | Other | N/A | `Database` | Network errors, decode failures, etc. |
//!
//! ## Runtime
//!
//! The `RelationStore` trait is synchronous. Each trait call enters the
//! current tokio runtime with `block_in_place`, so callers must run on a
//! multi-threaded runtime; outside one (or on a current-thread runtime) calls
//! fail with `RelationStoreError::Runtime`. Async callers can use the
//! inherent `*_async` methods directly.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{instrument, Span};
use uuid::Uuid;

use prodrel_core::{Record, RecordId, RecordRef, RelationId, RelationTypeId};
use prodrel_products::product::attributes;
use prodrel_products::{PricingMetadata, Product, ProductId};
use prodrel_relations::{
    CascadeReport, Condition, NewRelation, NewRelationType, Relation, RelationStore,
    RelationStoreError, RelationType, SchemaState, AVAILABLE_ON, DELETED_AT,
};

use super::sql::push_condition;

const RELATION_COLUMNS: &str = r#"
    id,
    relatable_type,
    relatable_id,
    related_to_type,
    related_to_id,
    relation_type_id,
    position,
    discount_amount
"#;

/// Postgres-backed relation store whose relations join `products` rows.
///
/// ## Thread Safety
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync).
/// Multi-statement writes (cascades, repositioning, relation creation) run in
/// a single transaction.
#[derive(Debug, Clone)]
pub struct PostgresRelationStore {
    pool: Arc<PgPool>,
}

impl PostgresRelationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether both relation tables exist.
    pub async fn schema_state_async(&self) -> Result<SchemaState, RelationStoreError> {
        let ready: bool = sqlx::query_scalar(
            r#"
            SELECT to_regclass('relation_types') IS NOT NULL
               AND to_regclass('relations') IS NOT NULL
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("schema_state", e))?;

        Ok(if ready {
            SchemaState::Ready
        } else {
            SchemaState::Unprovisioned
        })
    }

    #[instrument(skip(self), err)]
    pub async fn relation_types_async(
        &self,
        applies_to: &str,
    ) -> Result<Vec<RelationType>, RelationStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, applies_to, description
            FROM relation_types
            WHERE applies_to = $1
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(applies_to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("relation_types", e))?;

        decode_rows::<RelationTypeRow, _>(&rows)
    }

    #[instrument(
        skip(self, owner),
        fields(owner = %owner, relation_type_id = %relation_type_id, edge_count = tracing::field::Empty),
        err
    )]
    pub async fn relations_for_async(
        &self,
        owner: &RecordRef,
        relation_type_id: RelationTypeId,
    ) -> Result<Vec<Relation>, RelationStoreError> {
        // UUIDv7 ids are time-ordered, so `id` keeps position ties in creation order.
        let sql = format!(
            r#"
            SELECT {RELATION_COLUMNS}
            FROM relations
            WHERE relatable_type = $1 AND relatable_id = $2 AND relation_type_id = $3
            ORDER BY position ASC, id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&owner.record_type)
            .bind(owner.id.as_uuid())
            .bind(relation_type_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("relations_for", e))?;

        let relations = decode_rows::<RelationRow, _>(&rows)?;
        Span::current().record("edge_count", relations.len());
        Ok(relations)
    }

    pub async fn relations_touching_async(
        &self,
        record: &RecordRef,
    ) -> Result<Vec<Relation>, RelationStoreError> {
        let sql = format!(
            r#"
            SELECT {RELATION_COLUMNS}
            FROM relations
            WHERE (relatable_type = $1 AND relatable_id = $2)
               OR (related_to_type = $1 AND related_to_id = $2)
            ORDER BY id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&record.record_type)
            .bind(record.id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("relations_touching", e))?;

        decode_rows::<RelationRow, _>(&rows)
    }

    /// Load products by id with `condition` compiled into the `WHERE` clause.
    #[instrument(skip(self, ids, condition), fields(id_count = ids.len()), err)]
    pub async fn load_products_async(
        &self,
        ids: &[RecordId],
        condition: &Condition,
    ) -> Result<Vec<Product>, RelationStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = products_query(ids, condition)?;
        let rows = builder
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_products", e))?;

        decode_rows::<ProductRow, _>(&rows)
    }

    /// Delete a record and every relation referencing it in one transaction.
    #[instrument(skip(self, record), fields(record = %record), err)]
    pub async fn destroy_cascading_async(
        &self,
        record: &RecordRef,
    ) -> Result<CascadeReport, RelationStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let outgoing_removed = sqlx::query(
            "DELETE FROM relations WHERE relatable_type = $1 AND relatable_id = $2",
        )
        .bind(&record.record_type)
        .bind(record.id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_outgoing_relations", e))?
        .rows_affected();

        let incoming_removed = sqlx::query(
            "DELETE FROM relations WHERE related_to_type = $1 AND related_to_id = $2",
        )
        .bind(&record.record_type)
        .bind(record.id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_incoming_relations", e))?
        .rows_affected();

        let record_deleted = if record.is_a::<Product>() {
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(record.id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_product", e))?
                .rows_affected()
                > 0
        } else {
            false
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CascadeReport {
            outgoing_removed: outgoing_removed as usize,
            incoming_removed: incoming_removed as usize,
            record_deleted,
        })
    }

    pub async fn create_relation_type_async(
        &self,
        new: NewRelationType,
    ) -> Result<RelationType, RelationStoreError> {
        new.validate()?;
        let relation_type = new.into_relation_type(RelationTypeId::new());

        sqlx::query(
            r#"
            INSERT INTO relation_types (id, name, applies_to, description)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(relation_type.id.as_uuid())
        .bind(&relation_type.name)
        .bind(&relation_type.applies_to)
        .bind(&relation_type.description)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_relation_type", e))?;

        Ok(relation_type)
    }

    #[instrument(skip(self, new), fields(owner = %new.relatable, target = %new.related_to), err)]
    pub async fn create_relation_async(
        &self,
        new: NewRelation,
    ) -> Result<Relation, RelationStoreError> {
        let discount_amount = db_amount("discount_amount", new.discount_amount)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            "SELECT id, name, applies_to, description FROM relation_types WHERE id = $1",
        )
        .bind(new.relation_type_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_relation_type", e))?;

        let Some(row) = row else {
            rollback(tx).await?;
            return Err(RelationStoreError::NotFound(format!(
                "relation type {}",
                new.relation_type_id
            )));
        };
        let relation_type: RelationType = decode_row::<RelationTypeRow>(&row)?;

        if let Err(e) = new.validate_against(&relation_type) {
            rollback(tx).await?;
            return Err(e.into());
        }

        let position = match new.position {
            Some(p) => p,
            None => next_position(&mut tx, &new.relatable, new.relation_type_id).await?,
        };
        let relation = new.into_relation(RelationId::new(), position);

        sqlx::query(
            r#"
            INSERT INTO relations (
                id,
                relatable_type,
                relatable_id,
                related_to_type,
                related_to_id,
                relation_type_id,
                position,
                discount_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(relation.id.as_uuid())
        .bind(&relation.relatable.record_type)
        .bind(relation.relatable.id.as_uuid())
        .bind(&relation.related_to.record_type)
        .bind(relation.related_to.id.as_uuid())
        .bind(relation.relation_type_id.as_uuid())
        .bind(relation.position)
        .bind(discount_amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_relation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(relation)
    }

    pub async fn reposition_async(&self, ordered: &[RelationId]) -> Result<(), RelationStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for (position, id) in (0_i32..).zip(ordered) {
            let updated = sqlx::query("UPDATE relations SET position = $1 WHERE id = $2")
                .bind(position)
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_position", e))?
                .rows_affected();

            if updated == 0 {
                rollback(tx).await?;
                return Err(RelationStoreError::NotFound(format!("relation {id}")));
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    /// Insert or update a product row.
    pub async fn upsert_product(&self, product: &Product) -> Result<(), RelationStoreError> {
        let base_price = db_amount("base_price", product.pricing().base_price)?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id,
                sku,
                name,
                deleted_at,
                available_on,
                stock_on_hand,
                base_price,
                currency
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                sku = EXCLUDED.sku,
                name = EXCLUDED.name,
                deleted_at = EXCLUDED.deleted_at,
                available_on = EXCLUDED.available_on,
                stock_on_hand = EXCLUDED.stock_on_hand,
                base_price = EXCLUDED.base_price,
                currency = EXCLUDED.currency
            "#,
        )
        .bind(product.record_id().as_uuid())
        .bind(product.sku())
        .bind(product.name())
        .bind(product.deleted_at())
        .bind(product.available_on())
        .bind(product.stock_on_hand())
        .bind(base_price)
        .bind(&product.pricing().currency)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }
}

/// Column for a product filter attribute.
pub fn product_column(attribute: &str) -> Option<&'static str> {
    match attribute {
        DELETED_AT => Some("deleted_at"),
        AVAILABLE_ON => Some("available_on"),
        attributes::SKU => Some("sku"),
        attributes::NAME => Some("name"),
        attributes::STOCK_ON_HAND => Some("stock_on_hand"),
        attributes::BASE_PRICE => Some("base_price"),
        attributes::CURRENCY => Some("currency"),
        _ => None,
    }
}

fn products_query<'args>(
    ids: &[RecordId],
    condition: &Condition,
) -> Result<QueryBuilder<'args, Postgres>, RelationStoreError> {
    let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

    let mut builder = QueryBuilder::new(
        "SELECT id, sku, name, deleted_at, available_on, stock_on_hand, base_price, currency \
         FROM products WHERE id = ANY(",
    );
    builder.push_bind(uuids).push(") AND ");
    push_condition(&mut builder, condition, &product_column)?;
    Ok(builder)
}

async fn next_position(
    tx: &mut Transaction<'_, Postgres>,
    owner: &RecordRef,
    relation_type_id: RelationTypeId,
) -> Result<i32, RelationStoreError> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(position) + 1, 0)
        FROM relations
        WHERE relatable_type = $1 AND relatable_id = $2 AND relation_type_id = $3
        "#,
    )
    .bind(&owner.record_type)
    .bind(owner.id.as_uuid())
    .bind(relation_type_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("next_position", e))
}

async fn rollback(tx: Transaction<'_, Postgres>) -> Result<(), RelationStoreError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))
}

fn block_on<F: Future>(fut: F) -> Result<F::Output, RelationStoreError> {
    let handle = Handle::try_current().map_err(|_| {
        RelationStoreError::Runtime(
            "PostgresRelationStore requires a tokio runtime. Call it from within a multi-threaded runtime."
                .to_string(),
        )
    })?;
    // block_in_place panics on a current-thread runtime.
    if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
        return Err(RelationStoreError::Runtime(
            "PostgresRelationStore cannot block a current-thread runtime. Use a multi-threaded runtime or the *_async methods."
                .to_string(),
        ));
    }
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

impl RelationStore<Product> for PostgresRelationStore {
    fn schema_state(&self) -> Result<SchemaState, RelationStoreError> {
        block_on(self.schema_state_async())?
    }

    fn relation_types(&self, applies_to: &str) -> Result<Vec<RelationType>, RelationStoreError> {
        block_on(self.relation_types_async(applies_to))?
    }

    fn relations_for(
        &self,
        owner: &RecordRef,
        relation_type_id: RelationTypeId,
    ) -> Result<Vec<Relation>, RelationStoreError> {
        block_on(self.relations_for_async(owner, relation_type_id))?
    }

    fn relations_touching(&self, record: &RecordRef) -> Result<Vec<Relation>, RelationStoreError> {
        block_on(self.relations_touching_async(record))?
    }

    fn load_records(
        &self,
        ids: &[RecordId],
        condition: &Condition,
    ) -> Result<Vec<Product>, RelationStoreError> {
        block_on(self.load_products_async(ids, condition))?
    }

    fn destroy_cascading(&self, record: &RecordRef) -> Result<CascadeReport, RelationStoreError> {
        block_on(self.destroy_cascading_async(record))?
    }

    fn create_relation_type(
        &self,
        new: NewRelationType,
    ) -> Result<RelationType, RelationStoreError> {
        block_on(self.create_relation_type_async(new))?
    }

    fn create_relation(&self, new: NewRelation) -> Result<Relation, RelationStoreError> {
        block_on(self.create_relation_async(new))?
    }

    fn reposition(&self, ordered: &[RelationId]) -> Result<(), RelationStoreError> {
        block_on(self.reposition_async(ordered))?
    }
}

/// Amounts are unsigned in the domain and `BIGINT` in the schema.
fn db_amount(column: &str, amount: Option<u64>) -> Result<Option<i64>, RelationStoreError> {
    amount
        .map(|a| {
            i64::try_from(a).map_err(|_| {
                RelationStoreError::Validation(format!("{column} {a} exceeds the BIGINT range"))
            })
        })
        .transpose()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RelationStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // Unique, foreign key and check constraint violations
                Some("23505") | Some("23503") | Some("23514") => RelationStoreError::Validation(msg),
                _ => RelationStoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            RelationStoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => RelationStoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_row<T>(row: &PgRow) -> Result<T::Output, RelationStoreError>
where
    T: for<'r> FromRow<'r, PgRow> + IntoDomain,
{
    T::from_row(row)
        .map(IntoDomain::into_domain)
        .map_err(|e| RelationStoreError::Database(format!("failed to decode row: {}", e)))
}

fn decode_rows<T, O>(rows: &[PgRow]) -> Result<Vec<O>, RelationStoreError>
where
    T: for<'r> FromRow<'r, PgRow> + IntoDomain<Output = O>,
{
    rows.iter().map(decode_row::<T>).collect()
}

// SQLx row types

trait IntoDomain {
    type Output;

    fn into_domain(self) -> Self::Output;
}

#[derive(Debug)]
struct RelationTypeRow {
    id: Uuid,
    name: String,
    applies_to: String,
    description: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for RelationTypeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RelationTypeRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            applies_to: row.try_get("applies_to")?,
            description: row.try_get("description")?,
        })
    }
}

impl IntoDomain for RelationTypeRow {
    type Output = RelationType;

    fn into_domain(self) -> RelationType {
        RelationType {
            id: RelationTypeId::from_uuid(self.id),
            name: self.name,
            applies_to: self.applies_to,
            description: self.description,
        }
    }
}

#[derive(Debug)]
struct RelationRow {
    id: Uuid,
    relatable_type: String,
    relatable_id: Uuid,
    related_to_type: String,
    related_to_id: Uuid,
    relation_type_id: Uuid,
    position: i32,
    discount_amount: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for RelationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RelationRow {
            id: row.try_get("id")?,
            relatable_type: row.try_get("relatable_type")?,
            relatable_id: row.try_get("relatable_id")?,
            related_to_type: row.try_get("related_to_type")?,
            related_to_id: row.try_get("related_to_id")?,
            relation_type_id: row.try_get("relation_type_id")?,
            position: row.try_get("position")?,
            discount_amount: row.try_get("discount_amount")?,
        })
    }
}

impl IntoDomain for RelationRow {
    type Output = Relation;

    fn into_domain(self) -> Relation {
        Relation {
            id: RelationId::from_uuid(self.id),
            relatable: RecordRef::new(self.relatable_type, RecordId::from_uuid(self.relatable_id)),
            related_to: RecordRef::new(self.related_to_type, RecordId::from_uuid(self.related_to_id)),
            relation_type_id: RelationTypeId::from_uuid(self.relation_type_id),
            position: self.position,
            discount_amount: self.discount_amount.map(|d| d.max(0) as u64),
        }
    }
}

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    deleted_at: Option<DateTime<Utc>>,
    available_on: Option<DateTime<Utc>>,
    stock_on_hand: i64,
    base_price: Option<i64>,
    currency: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            deleted_at: row.try_get("deleted_at")?,
            available_on: row.try_get("available_on")?,
            stock_on_hand: row.try_get("stock_on_hand")?,
            base_price: row.try_get("base_price")?,
            currency: row.try_get("currency")?,
        })
    }
}

impl IntoDomain for ProductRow {
    type Output = Product;

    fn into_domain(self) -> Product {
        Product::from_parts(
            ProductId(RecordId::from_uuid(self.id)),
            self.sku,
            self.name,
            self.deleted_at,
            self.available_on,
            self.stock_on_hand,
            PricingMetadata {
                base_price: self.base_price.map(|p| p.max(0) as u64),
                currency: self.currency,
            },
        )
    }
}
