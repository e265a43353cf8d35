//! Store handle.
//!
//! A [`Database`] owns named tables and the engine [`Registry`]. Collections
//! borrowed from it expose sync as methods, using the collection's own
//! records as the current side.

use crate::{
    error::Result, BulkSync, Error, Filter, Plan, Record, Registry, Scope, Settings, Table,
    TableName, TableSchema,
};
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Named tables sharing one engine registry.
#[derive(Default)]
pub struct Database {
    tables: DashMap<TableName, Arc<dyn Table>>,
    registry: Registry,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database whose engines come from `registry`.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            tables: DashMap::new(),
            registry,
        }
    }

    /// Add or replace a table.
    ///
    /// Replacing a table drops its cached engine so the next sync builds one
    /// for the new table.
    pub fn add_table(&self, table: Arc<dyn Table>) {
        let name = table.name().to_string();
        if self.tables.insert(name.clone(), table).is_some() {
            self.registry.invalidate(&name);
        }
    }

    /// Handle to the table called `name`.
    pub fn table(&self, name: &str) -> Result<Collection> {
        let table = self
            .tables
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        let engine = self.registry.get_or_create(table.clone())?;
        Ok(Collection {
            scope: Scope::all(table),
            engine,
        })
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> Vec<TableName> {
        let mut names: Vec<TableName> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Schemas of every table, sorted by name.
    pub fn schemas(&self) -> Vec<TableSchema> {
        let mut schemas: Vec<TableSchema> =
            self.tables.iter().map(|e| e.value().schema().clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.table_names())
            .field("registry", &self.registry)
            .finish()
    }
}

/// A table, optionally narrowed by a filter, with sync methods.
#[derive(Debug, Clone)]
pub struct Collection {
    scope: Scope,
    engine: Arc<BulkSync>,
}

impl Collection {
    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.scope = self.scope.where_eq(field, value);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.scope = self.scope.and(filter);
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn engine(&self) -> &Arc<BulkSync> {
        &self.engine
    }

    /// Records currently in the collection.
    pub async fn to_vec(&self) -> Result<Vec<Record>> {
        self.scope.read().await
    }

    /// What [`bulk_sync`](Self::bulk_sync) would do, without doing it.
    pub async fn plan(&self, records: &[Record], overrides: Option<&Settings>) -> Result<Plan> {
        let current = self.to_vec().await?;
        self.engine.plan(&current, records, overrides)
    }

    /// Make the collection hold exactly `records`.
    pub async fn bulk_sync(&self, records: &[Record], overrides: Option<&Settings>) -> Result<()> {
        let current = self.to_vec().await?;
        self.engine.execute(&current, records, overrides).await
    }

    /// Reconcile one record against the collection by identity.
    pub async fn single_sync(&self, record: Record, overrides: Option<&Settings>) -> Result<()> {
        self.engine.single_sync(&self.scope, record, overrides).await
    }
}
