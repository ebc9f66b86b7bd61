//! Compilation of filter [`Condition`]s into SQL `WHERE` fragments.

use sqlx::{Postgres, QueryBuilder};

use prodrel_relations::{Condition, RelationStoreError, Value};

/// Maps filter attribute names to table columns.
pub trait ColumnMap {
    fn column(&self, attribute: &str) -> Option<&'static str>;
}

impl<F> ColumnMap for F
where
    F: Fn(&str) -> Option<&'static str>,
{
    fn column(&self, attribute: &str) -> Option<&'static str> {
        self(attribute)
    }
}

/// Append `condition` to `builder`, binding every value.
///
/// Attributes without a column are rejected rather than silently ignored.
pub fn push_condition<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    condition: &Condition,
    columns: &dyn ColumnMap,
) -> Result<(), RelationStoreError> {
    match condition {
        Condition::True => {
            builder.push("TRUE");
        }
        Condition::IsNull(attr) => {
            builder.push(resolve(columns, attr)?).push(" IS NULL");
        }
        Condition::IsNotNull(attr) => {
            builder.push(resolve(columns, attr)?).push(" IS NOT NULL");
        }
        Condition::Compare { attribute, op, value } => {
            builder
                .push(resolve(columns, attribute)?)
                .push(" ")
                .push(op.as_sql())
                .push(" ");
            push_value(builder, value);
        }
        Condition::And(parts) => push_joined(builder, parts, " AND ", "TRUE", columns)?,
        Condition::Or(parts) => push_joined(builder, parts, " OR ", "FALSE", columns)?,
        Condition::Not(inner) => {
            builder.push("NOT (");
            push_condition(builder, inner, columns)?;
            builder.push(")");
        }
    }
    Ok(())
}

fn push_joined<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    parts: &[Condition],
    separator: &str,
    empty: &str,
    columns: &dyn ColumnMap,
) -> Result<(), RelationStoreError> {
    if parts.is_empty() {
        builder.push(empty);
        return Ok(());
    }
    builder.push("(");
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            builder.push(separator);
        }
        push_condition(builder, part, columns)?;
    }
    builder.push(")");
    Ok(())
}

fn push_value<'args>(builder: &mut QueryBuilder<'args, Postgres>, value: &Value) {
    match value {
        Value::Bool(v) => builder.push_bind(*v),
        Value::Int(v) => builder.push_bind(*v),
        Value::Text(v) => builder.push_bind(v.clone()),
        Value::Timestamp(v) => builder.push_bind(*v),
    };
}

fn resolve(columns: &dyn ColumnMap, attribute: &str) -> Result<&'static str, RelationStoreError> {
    columns
        .column(attribute)
        .ok_or_else(|| RelationStoreError::UnsupportedCondition(format!("no column for attribute '{attribute}'")))
}
