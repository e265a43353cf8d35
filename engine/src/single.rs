//! Single-record sync: reconcile the one record matching a desired record's
//! identity, leaving every other record in the table alone.

use crate::{error::Result, BulkSync, FieldName, Filter, Record, Settings, Table};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A table narrowed by a filter. Reading a scope yields the current records
/// a reconciliation runs against.
#[derive(Clone)]
pub struct Scope {
    table: Arc<dyn Table>,
    filter: Filter,
}

impl Scope {
    /// Every record of `table`.
    pub fn all(table: Arc<dyn Table>) -> Self {
        Self {
            table,
            filter: Filter::new(),
        }
    }

    /// Records of `table` matching `filter`.
    pub fn filtered(table: Arc<dyn Table>, filter: Filter) -> Self {
        Self { table, filter }
    }

    /// Narrow the scope further.
    pub fn and(mut self, filter: Filter) -> Self {
        self.filter = self.filter.and(filter);
        self
    }

    pub fn where_eq(self, field: impl Into<FieldName>, value: impl Into<Value>) -> Self {
        self.and(Filter::new().eq(field, value))
    }

    pub fn table(&self) -> &Arc<dyn Table> {
        &self.table
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Current records in scope.
    pub async fn read(&self) -> Result<Vec<Record>> {
        let filter = (!self.filter.is_empty()).then_some(&self.filter);
        self.table.read_all(filter).await
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("table", &self.table.name())
            .field("filter", &self.filter)
            .finish()
    }
}

/// Equality filter over `identity` taking values from `record`.
///
/// An identity field the record lacks only matches records that lack it too.
pub fn identity_filter(record: &Record, identity: &[FieldName]) -> Filter {
    identity
        .iter()
        .fold(Filter::new(), |filter, field| match record.get(field) {
            Some(value) => filter.eq(field.clone(), value.clone()),
            None => filter.missing(field.clone()),
        })
}

impl BulkSync {
    /// Reconcile the records of `scope` sharing `record`'s identity so that
    /// exactly `record` remains.
    ///
    /// Matching existing records are updated, a missing one is added, and
    /// records outside the identity are never touched.
    pub async fn single_sync(
        &self,
        scope: &Scope,
        record: Record,
        overrides: Option<&Settings>,
    ) -> Result<()> {
        let settings = self.resolve_settings(overrides)?;
        let narrowed = scope.clone().and(identity_filter(&record, settings.identity()));
        let current = narrowed.read().await?;
        debug!(
            table = %self.table().name(),
            matched = current.len(),
            "single sync"
        );

        self.execute(&current, std::slice::from_ref(&record), Some(&settings))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{records_from_value, Key, KeyPath, MemoryTable, Mutation, TableSchema};
    use serde_json::json;

    async fn books() -> Arc<MemoryTable> {
        let table = Arc::new(
            MemoryTable::new(TableSchema::new("books", KeyPath::single("id")).auto_increment())
                .unwrap(),
        );
        table
            .seed(
                records_from_value(json!([
                    {"id": 1, "title": "Book 1", "isbn": "b1", "genre_id": 1},
                    {"id": 2, "title": "Book 2", "isbn": "b2", "genre_id": 1},
                    {"id": 3, "title": "Book 3", "isbn": "b3", "genre_id": 2},
                ]))
                .unwrap(),
            )
            .await
            .unwrap();
        table
    }

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn identity_filter_uses_record_values() {
        let filter = identity_filter(
            &record(json!({"isbn": "b1", "genre_id": 1, "title": "x"})),
            &["isbn".to_string(), "genre_id".to_string(), "id".to_string()],
        );

        assert!(filter.matches(&record(json!({"isbn": "b1", "genre_id": 1.0}))));
        assert!(!filter.matches(&record(json!({"id": 1, "isbn": "b1", "genre_id": 1}))));
        assert!(!filter.matches(&record(json!({"isbn": "b1", "genre_id": 2}))));
    }

    #[tokio::test]
    async fn scope_reads_filtered_records() {
        let table = books().await;
        let scope = Scope::all(table.clone()).where_eq("genre_id", 1);

        let records = scope.read().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(Scope::all(table).read().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn updates_matching_record_only() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();
        let settings = Settings::new().with_identity_fields(["isbn"]);

        engine
            .single_sync(
                &Scope::all(table.clone()),
                record(json!({"isbn": "b2", "title": "Book 2 (2nd ed.)"})),
                Some(&settings),
            )
            .await
            .unwrap();

        assert_eq!(
            table.mutations().await,
            vec![Mutation::Updated { key: Key::Int(2) }]
        );
        assert_eq!(
            table.get(&Key::Int(2)).await.unwrap(),
            record(json!({"id": 2, "title": "Book 2 (2nd ed.)", "isbn": "b2", "genre_id": 1}))
        );
        assert_eq!(table.len().await, 3);
    }

    #[tokio::test]
    async fn adds_when_nothing_matches() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();

        engine
            .single_sync(
                &Scope::all(table.clone()),
                record(json!({"title": "Book 4", "isbn": "b4", "genre_id": 2})),
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            table.mutations().await,
            vec![Mutation::Inserted {
                key: Key::Int(4),
                generated: true
            }]
        );
        assert_eq!(table.len().await, 4);
    }

    #[tokio::test]
    async fn unchanged_record_writes_nothing() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();

        engine
            .single_sync(
                &Scope::all(table.clone()),
                record(json!({"id": 3, "title": "Book 3", "isbn": "b3", "genre_id": 2})),
                None,
            )
            .await
            .unwrap();

        assert!(table.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn scope_limits_candidates() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();
        let settings = Settings::new().with_identity_fields(["isbn"]);

        // b1 lives in genre 1, so the genre 2 scope sees no match and adds
        engine
            .single_sync(
                &Scope::all(table.clone()).where_eq("genre_id", 2),
                record(json!({"isbn": "b1", "title": "Book 1", "genre_id": 2})),
                Some(&settings),
            )
            .await
            .unwrap();

        assert_eq!(table.len().await, 4);
        assert!(table.get(&Key::Int(1)).await.is_some());
    }

    #[tokio::test]
    async fn duplicates_collapse_to_one() {
        let table = books().await;
        table
            .seed(vec![record(
                json!({"id": 9, "title": "Book 2 copy", "isbn": "b2", "genre_id": 1}),
            )])
            .await
            .unwrap();
        let engine = BulkSync::new(table.clone()).unwrap();
        let settings = Settings::new().with_identity_fields(["isbn"]);

        engine
            .single_sync(
                &Scope::all(table.clone()),
                record(json!({"isbn": "b2", "title": "Book 2"})),
                Some(&settings),
            )
            .await
            .unwrap();

        assert_eq!(
            table.mutations().await,
            vec![Mutation::Deleted { key: Key::Int(9) }]
        );
    }
}
