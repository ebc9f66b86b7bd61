//! Visibility filtering of related records.
//!
//! A [`Condition`] is a small predicate tree over named record attributes. The
//! in-memory store evaluates it directly; SQL stores compile it into a `WHERE`
//! clause, so the filter narrows the candidate query instead of running after
//! records are loaded. Evaluation follows SQL three-valued logic: comparisons
//! involving NULL are unknown, and only rows that evaluate to true are kept.
//!
//! [`RelationFilter`] strategies build the active condition in layers:
//! the default visibility rule, then the owner type's class-level filter, then
//! the owner instance's own filter. Each layer receives the condition of the
//! layer below and may narrow or replace it.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Soft-delete marker attribute.
pub const DELETED_AT: &str = "deleted_at";
/// Availability timestamp attribute.
pub const AVAILABLE_ON: &str = "available_on";

/// An attribute value. NULL is represented by absence (`None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Predicate over record attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Matches every record.
    True,
    IsNull(String),
    IsNotNull(String),
    Compare {
        attribute: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn is_null(attribute: impl Into<String>) -> Self {
        Condition::IsNull(attribute.into())
    }

    pub fn is_not_null(attribute: impl Into<String>) -> Self {
        Condition::IsNotNull(attribute.into())
    }

    pub fn compare(attribute: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    /// Conjunction, flattening nested `And`s and dropping `True`.
    pub fn and(self, other: Condition) -> Self {
        let mut parts = Vec::new();
        for c in [self, other] {
            match c {
                Condition::True => {}
                Condition::And(inner) => parts.extend(inner),
                c => parts.push(c),
            }
        }
        match parts.len() {
            0 => Condition::True,
            1 => parts.remove(0),
            _ => Condition::And(parts),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        let mut parts = Vec::new();
        for c in [self, other] {
            match c {
                Condition::Or(inner) => parts.extend(inner),
                c => parts.push(c),
            }
        }
        Condition::Or(parts)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Three-valued evaluation: `None` means unknown (SQL NULL).
    pub fn evaluate<R: FilterAttributes + ?Sized>(&self, record: &R) -> Option<bool> {
        match self {
            Condition::True => Some(true),
            Condition::IsNull(attr) => Some(record.attribute(attr).is_none()),
            Condition::IsNotNull(attr) => Some(record.attribute(attr).is_some()),
            Condition::Compare { attribute, op, value } => {
                let current = record.attribute(attribute)?;
                current.compare(value).map(|o| op.holds(o))
            }
            Condition::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(record) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Condition::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(record) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Condition::Not(inner) => inner.evaluate(record).map(|b| !b),
        }
    }

    /// Whether the record passes the filter (evaluates to true).
    pub fn matches<R: FilterAttributes + ?Sized>(&self, record: &R) -> bool {
        self.evaluate(record) == Some(true)
    }

    /// Names of every attribute referenced by this condition.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::True => {}
            Condition::IsNull(a) | Condition::IsNotNull(a) => out.push(a),
            Condition::Compare { attribute, .. } => out.push(attribute),
            Condition::And(parts) | Condition::Or(parts) => {
                for p in parts {
                    p.collect_attributes(out);
                }
            }
            Condition::Not(inner) => inner.collect_attributes(out),
        }
    }
}

/// Read access to the attributes a [`Condition`] can reference.
///
/// Return `None` for NULL values and for attributes the record does not have.
pub trait FilterAttributes {
    fn attribute(&self, name: &str) -> Option<Value>;
}

/// The default visibility rule: not soft-deleted and already available.
pub fn default_condition(now: DateTime<Utc>) -> Condition {
    Condition::is_null(DELETED_AT)
        .and(Condition::is_not_null(AVAILABLE_ON))
        .and(Condition::compare(AVAILABLE_ON, CompareOp::LtEq, now))
}

/// Strategy producing the visibility condition for related records.
///
/// `base` is the condition of the layer below (the default rule for a
/// class-level filter, the class-level result for an instance-level filter).
/// Narrow it with `base.and(..)`, or ignore it to replace it.
pub trait RelationFilter: Send + Sync {
    fn condition(&self, base: Condition, now: DateTime<Utc>) -> Condition;
}

impl<F> RelationFilter for F
where
    F: Fn(Condition, DateTime<Utc>) -> Condition + Send + Sync,
{
    fn condition(&self, base: Condition, now: DateTime<Utc>) -> Condition {
        self(base, now)
    }
}

/// Narrows the layer below with an extra condition.
#[derive(Debug, Clone)]
pub struct Narrow(pub Condition);

impl RelationFilter for Narrow {
    fn condition(&self, base: Condition, _now: DateTime<Utc>) -> Condition {
        base.and(self.0.clone())
    }
}

/// Layered filter configuration: instance > class > default.
#[derive(Clone, Default)]
pub struct FilterLayers {
    class: Option<Arc<dyn RelationFilter>>,
}

impl FilterLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_filter(filter: Arc<dyn RelationFilter>) -> Self {
        Self {
            class: Some(filter),
        }
    }

    pub fn has_class_filter(&self) -> bool {
        self.class.is_some()
    }

    /// Build the effective condition for one resolution.
    pub fn effective(&self, instance: Option<&dyn RelationFilter>, now: DateTime<Utc>) -> Condition {
        let mut condition = default_condition(now);
        if let Some(class) = &self.class {
            condition = class.condition(condition, now);
        }
        if let Some(instance) = instance {
            condition = instance.condition(condition, now);
        }
        condition
    }
}

impl core::fmt::Debug for FilterLayers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilterLayers")
            .field("class", &self.class.is_some())
            .finish()
    }
}
