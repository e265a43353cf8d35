//! The persistence capability the engine drives.
//!
//! A [`Table`] is anything that can read a filtered snapshot of records and
//! apply bulk inserts, deletes, upserts and keyed partial updates. The engine
//! never looks behind this trait.

use crate::{error::Result, values_equal, FieldName, Key, Record, TableSchema};
use async_trait::async_trait;
use serde_json::Value;

/// One condition of a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The field is present and equal to the value.
    Equals(Value),
    /// The field is absent.
    Missing,
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Equals(expected) => values_equal(value, Some(expected)),
            Condition::Missing => value.is_none(),
        }
    }
}

/// A conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(FieldName, Condition)>,
}

impl Filter {
    /// A filter matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn eq(mut self, field: impl Into<FieldName>, value: impl Into<Value>) -> Self {
        self.conditions
            .push((field.into(), Condition::Equals(value.into())));
        self
    }

    /// Require `field` to be absent.
    pub fn missing(mut self, field: impl Into<FieldName>) -> Self {
        self.conditions.push((field.into(), Condition::Missing));
        self
    }

    /// Intersect with another filter.
    ///
    /// Conditions on the same field are all kept, so contradicting filters
    /// match nothing.
    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// Check a record against every condition.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(record.get(field)))
    }

    /// The conditions, in insertion order.
    pub fn conditions(&self) -> &[(FieldName, Condition)] {
        &self.conditions
    }

    /// Whether the filter matches everything.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A keyed record store.
///
/// Implementations own uniqueness of primary keys and key generation for
/// records inserted without one.
#[async_trait]
pub trait Table: Send + Sync {
    /// Schema of this table.
    fn schema(&self) -> &TableSchema;

    /// Table name.
    fn name(&self) -> &str {
        &self.schema().name
    }

    /// Primary-key field name. Fails for compound keys.
    fn primary_key(&self) -> Result<&str> {
        self.schema().primary_key_field()
    }

    /// Snapshot read, optionally filtered.
    async fn read_all(&self, filter: Option<&Filter>) -> Result<Vec<Record>>;

    /// Insert new records, returning their keys in input order.
    async fn bulk_insert(&self, records: Vec<Record>) -> Result<Vec<Key>>;

    /// Delete records by key.
    async fn bulk_delete(&self, keys: &[Key]) -> Result<()>;

    /// Write full records keyed by primary key, inserting or replacing.
    async fn bulk_upsert(&self, records: Vec<Record>) -> Result<()>;

    /// Merge `partial` into the record stored under `key`.
    ///
    /// When `partial` carries a different primary key the record moves.
    async fn update_fields(&self, key: &Key, partial: Record) -> Result<()>;
}
