//! BulkSync - reconciles one table against desired snapshots.

use crate::{
    error::Result, records_from_value, Error, FieldName, Pipeline, Plan, Planner, Record, Request,
    Settings, Table,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Reconciliation engine bound to one table.
///
/// Holds the default settings for that table and carries no per-call state,
/// so one instance can serve every call against the table.
#[derive(Clone)]
pub struct BulkSync {
    table: Arc<dyn Table>,
    primary_key: FieldName,
    defaults: Settings,
}

impl BulkSync {
    /// Create an engine for `table`.
    ///
    /// Fails if the table's primary key is not a single field.
    pub fn new(table: Arc<dyn Table>) -> Result<Self> {
        let primary_key = table.primary_key()?.to_string();
        Ok(Self {
            table,
            primary_key,
            defaults: Settings::default(),
        })
    }

    /// Builder-style method to set instance-level defaults.
    pub fn with_settings(mut self, defaults: Settings) -> Self {
        self.defaults = defaults;
        self
    }

    /// The table this engine writes to.
    pub fn table(&self) -> &Arc<dyn Table> {
        &self.table
    }

    /// Primary-key field name.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Instance-level defaults, as configured.
    pub fn settings(&self) -> &Settings {
        &self.defaults
    }

    /// Effective settings for one call.
    ///
    /// Fills in the identity and pipeline defaults, then applies `overrides`.
    pub fn resolve_settings(&self, overrides: Option<&Settings>) -> Result<Settings> {
        let mut base = self.defaults.clone();
        if base.identity_fields.is_none() {
            base.identity_fields = Some(vec![self.primary_key.clone()]);
        }
        if base.pipeline.is_none() {
            base.pipeline = Some(Pipeline::default());
        }

        let settings = base.merge_with(overrides);
        if settings.identity().is_empty() {
            return Err(Error::InvalidSettings(
                "identity fields must not be empty".into(),
            ));
        }

        Ok(settings)
    }

    /// Compute the plan for a call without writing anything.
    pub fn plan(
        &self,
        current: &[Record],
        new: &[Record],
        overrides: Option<&Settings>,
    ) -> Result<Plan> {
        let settings = self.resolve_settings(overrides)?;
        Planner::new(current, new, &settings, &self.primary_key).plan()
    }

    /// Make the table hold `new` where it now holds `current`.
    ///
    /// The plan is computed up front so malformed input is rejected before any
    /// handler runs. Handlers then run in order; a failure stops the pipeline
    /// and leaves earlier stages applied.
    pub async fn execute(
        &self,
        current: &[Record],
        new: &[Record],
        overrides: Option<&Settings>,
    ) -> Result<()> {
        let settings = self.resolve_settings(overrides)?;
        let plan = Planner::new(current, new, &settings, &self.primary_key).plan()?;
        let summary = plan.summary();
        debug!(
            table = %self.table.name(),
            additions = summary.additions,
            deletions = summary.deletions,
            updates = summary.updates,
            key_changes = summary.key_changes,
            "planned reconciliation"
        );

        let request = Request {
            current_records: current,
            new_records: new,
            settings: &settings,
            table: self.table.as_ref(),
            primary_key: &self.primary_key,
        };

        match &settings.pipeline {
            Some(pipeline) => pipeline.run(&request).await,
            None => Ok(()),
        }
    }

    /// Like [`execute`](Self::execute), for desired records that arrive as
    /// untyped JSON. Anything but an array of objects is rejected.
    pub async fn execute_value(
        &self,
        current: &[Record],
        new: Value,
        overrides: Option<&Settings>,
    ) -> Result<()> {
        let new = records_from_value(new)?;
        self.execute(current, &new, overrides).await
    }
}

impl fmt::Debug for BulkSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkSync")
            .field("table", &self.table.name())
            .field("primary_key", &self.primary_key)
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, KeyPath, MemoryTable, Mutation, TableSchema};
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        records_from_value(value).unwrap()
    }

    async fn books() -> Arc<MemoryTable> {
        let table = Arc::new(
            MemoryTable::new(TableSchema::new("books", KeyPath::single("id")).auto_increment())
                .unwrap(),
        );
        table
            .seed(records(json!([
                {"id": 1, "name": "A"},
                {"id": 2, "name": "B"},
            ])))
            .await
            .unwrap();
        table
    }

    #[test]
    fn compound_keys_are_rejected_at_configuration() {
        struct Loans(TableSchema);

        #[async_trait::async_trait]
        impl Table for Loans {
            fn schema(&self) -> &TableSchema {
                &self.0
            }
            async fn read_all(&self, _: Option<&crate::Filter>) -> Result<Vec<Record>> {
                Ok(vec![])
            }
            async fn bulk_insert(&self, _: Vec<Record>) -> Result<Vec<Key>> {
                Ok(vec![])
            }
            async fn bulk_delete(&self, _: &[Key]) -> Result<()> {
                Ok(())
            }
            async fn bulk_upsert(&self, _: Vec<Record>) -> Result<()> {
                Ok(())
            }
            async fn update_fields(&self, _: &Key, _: Record) -> Result<()> {
                Ok(())
            }
        }

        let table = Arc::new(Loans(TableSchema::new(
            "loans",
            KeyPath::compound(["book_id", "member_id"]),
        )));
        let result = BulkSync::new(table);
        assert!(matches!(result, Err(Error::CompositePrimaryKey(t)) if t == "loans"));
    }

    #[tokio::test]
    async fn resolve_defaults() {
        let engine = BulkSync::new(books().await).unwrap();
        let settings = engine.resolve_settings(None).unwrap();

        assert_eq!(settings.identity(), ["id".to_string()]);
        assert_eq!(settings.change_fields, None);
        assert_eq!(settings.update_fields, None);
        assert_eq!(
            settings.pipeline.unwrap().names(),
            vec!["delete", "add", "update"]
        );
    }

    #[tokio::test]
    async fn instance_defaults_and_overrides() {
        let engine = BulkSync::new(books().await)
            .unwrap()
            .with_settings(Settings::new().with_update_fields(["title"]));

        let settings = engine.resolve_settings(None).unwrap();
        assert_eq!(settings.update_fields, Some(vec!["title".to_string()]));

        let overrides = Settings::new().with_update_fields(["isbn"]);
        let settings = engine.resolve_settings(Some(&overrides)).unwrap();
        assert_eq!(settings.update_fields, Some(vec!["isbn".to_string()]));
        assert_eq!(settings.identity(), ["id".to_string()]);
    }

    #[tokio::test]
    async fn empty_identity_is_rejected() {
        let engine = BulkSync::new(books().await).unwrap();
        let overrides = Settings::new().with_identity_fields(Vec::<String>::new());

        let result = engine.resolve_settings(Some(&overrides));
        assert!(matches!(result, Err(Error::InvalidSettings(_))));
    }

    #[tokio::test]
    async fn execute_applies_the_plan() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();
        let current = table.records().await;
        let new = records(json!([{"id": 1, "name": "A"}, {"id": 3, "name": "C"}]));

        engine.execute(&current, &new, None).await.unwrap();

        assert_eq!(
            table.mutations().await,
            vec![
                Mutation::Deleted { key: Key::Int(2) },
                Mutation::Inserted {
                    key: Key::Int(3),
                    generated: false
                },
            ]
        );
        assert_eq!(table.records().await, new);
    }

    #[tokio::test]
    async fn plan_is_a_dry_run() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();
        let current = table.records().await;

        let plan = engine.plan(&current, &[], None).unwrap();

        assert_eq!(plan.deletions, vec![Key::Int(1), Key::Int(2)]);
        assert!(table.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_write() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();
        let current = table.records().await;

        let result = engine
            .execute_value(&current, json!({"title": "Book 6", "genre_id": 1}), None)
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        // Record 2 would be deleted, but the key remap of record 1 is invalid
        let new = records(json!([{"id": null, "name": "A"}]));
        let overrides = Settings::new().with_identity_fields(["name"]);
        let result = engine.execute(&current, &new, Some(&overrides)).await;
        assert!(matches!(result, Err(Error::InvalidKey { .. })));

        assert!(table.mutations().await.is_empty());
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn empty_pipeline_writes_nothing() {
        let table = books().await;
        let engine = BulkSync::new(table.clone()).unwrap();
        let current = table.records().await;
        let overrides = Settings::new().with_pipeline(Pipeline::empty());

        engine.execute(&current, &[], Some(&overrides)).await.unwrap();
        assert!(table.mutations().await.is_empty());
    }
}
