//! [`Table`] over the shared `records` relation.
//!
//! Every declared table lives in one relation keyed by `(table_name, pk)`.
//! The whole record, primary key included, is stored as JSONB in `data`, so
//! filters are evaluated against the same document the engine sees.

use async_trait::async_trait;
use resync_engine::{Condition, Error, FieldName, Filter, Key, Record, Result, Table, TableSchema};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashSet;
use tracing::debug;

/// Rows per INSERT statement. Three bind parameters each, under the
/// 65535 parameter limit.
const INSERT_CHUNK: usize = 1000;

/// A table stored in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgTable {
    pool: PgPool,
    schema: TableSchema,
    primary_key: FieldName,
}

impl PgTable {
    /// Bind `schema` to the pool. Fails for compound keys.
    pub fn new(pool: PgPool, schema: TableSchema) -> Result<Self> {
        let primary_key = schema.primary_key_field()?.to_string();
        Ok(Self {
            pool,
            schema,
            primary_key,
        })
    }

    /// Serialize key generation for this table until the transaction ends.
    async fn lock(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&self.schema.name)
            .execute(&mut **tx)
            .await
            .map_err(Error::backend)?;
        Ok(())
    }

    /// Largest integer key stored, or 0.
    async fn last_int_key(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i64> {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(CASE WHEN jsonb_typeof(pk) = 'number' THEN pk::bigint END) \
             FROM records WHERE table_name = $1",
        )
        .bind(&self.schema.name)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::backend)?;
        Ok(last.unwrap_or(0))
    }

    /// Which of `keys` are already stored.
    async fn existing_keys(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        keys: &[Key],
    ) -> Result<HashSet<Key>> {
        let rows = sqlx::query("SELECT pk FROM records WHERE table_name = $1 AND pk = ANY($2)")
            .bind(&self.schema.name)
            .bind(keys.iter().map(Key::to_value).collect::<Vec<Value>>())
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::backend)?;

        let mut existing = HashSet::with_capacity(rows.len());
        for row in rows {
            let pk: Value = row.try_get("pk").map_err(Error::backend)?;
            if let Some(key) = Key::from_value(&pk) {
                existing.insert(key);
            }
        }
        Ok(existing)
    }

    /// Key of `record`, generating one past `last` when allowed.
    fn key_for(&self, record: &mut Record, last: &mut i64) -> Result<Key> {
        let key = match record.key(&self.primary_key)? {
            Some(key) => key,
            None if self.schema.auto_increment => {
                let key = Key::Int(*last + 1);
                record.set(self.primary_key.clone(), key.to_value());
                key
            }
            None => return Err(Error::MissingKey(self.primary_key.clone())),
        };
        if let Some(i) = key.as_int() {
            *last = (*last).max(i);
        }
        Ok(key)
    }

    fn select(&self, filter: Option<&Filter>) -> QueryBuilder<'static, Postgres> {
        let mut query = QueryBuilder::new("SELECT data FROM records WHERE table_name = ");
        query.push_bind(self.schema.name.clone());
        if let Some(filter) = filter {
            push_filter(&mut query, filter);
        }
        // jsonb sorts strings before numbers, Key order is the reverse
        query.push(" ORDER BY jsonb_typeof(pk) = 'string', pk");
        query
    }
}

/// Append `filter` as `AND` clauses.
///
/// Equality compares JSONB values, so numbers match by value and an absent
/// field never equals anything.
fn push_filter(query: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    for (field, condition) in filter.conditions() {
        match condition {
            Condition::Equals(value) => {
                query
                    .push(" AND data -> ")
                    .push_bind(field.clone())
                    .push(" = ")
                    .push_bind(value.clone());
            }
            Condition::Missing => {
                query
                    .push(" AND NOT (data ? ")
                    .push_bind(field.clone())
                    .push(")");
            }
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map_or(false, |e| e.is_unique_violation())
}

#[async_trait]
impl Table for PgTable {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn read_all(&self, filter: Option<&Filter>) -> Result<Vec<Record>> {
        let documents: Vec<Value> = self
            .select(filter)
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::backend)?;

        documents.into_iter().map(Record::try_from).collect()
    }

    async fn bulk_insert(&self, records: Vec<Record>) -> Result<Vec<Key>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(Error::backend)?;
        self.lock(&mut tx).await?;
        let mut last = self.last_int_key(&mut tx).await?;

        let mut keys = Vec::with_capacity(records.len());
        let mut prepared = Vec::with_capacity(records.len());
        let mut batch_keys = HashSet::with_capacity(records.len());
        for mut record in records {
            let key = self.key_for(&mut record, &mut last)?;
            if !batch_keys.insert(key.clone()) {
                return Err(Error::DuplicateKey(key));
            }
            keys.push(key.clone());
            prepared.push((key, record));
        }

        let existing = self.existing_keys(&mut tx, &keys).await?;
        if let Some(key) = keys.iter().find(|k| existing.contains(k)) {
            return Err(Error::DuplicateKey(key.clone()));
        }

        for chunk in prepared.chunks(INSERT_CHUNK) {
            let mut insert =
                QueryBuilder::<Postgres>::new("INSERT INTO records (table_name, pk, data) ");
            insert.push_values(chunk, |mut row, (key, record)| {
                row.push_bind(self.schema.name.clone())
                    .push_bind(key.to_value())
                    .push_bind(record.clone().into_value());
            });
            insert
                .build()
                .execute(&mut *tx)
                .await
                .map_err(Error::backend)?;
        }

        tx.commit().await.map_err(Error::backend)?;
        debug!(table = %self.schema.name, inserted = keys.len(), "bulk insert");
        Ok(keys)
    }

    async fn bulk_delete(&self, keys: &[Key]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let result = sqlx::query("DELETE FROM records WHERE table_name = $1 AND pk = ANY($2)")
            .bind(&self.schema.name)
            .bind(keys.iter().map(Key::to_value).collect::<Vec<Value>>())
            .execute(&self.pool)
            .await
            .map_err(Error::backend)?;

        debug!(table = %self.schema.name, deleted = result.rows_affected(), "bulk delete");
        Ok(())
    }

    async fn bulk_upsert(&self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(Error::backend)?;
        self.lock(&mut tx).await?;
        let mut last = self.last_int_key(&mut tx).await?;

        let count = records.len();
        for mut record in records {
            let key = self.key_for(&mut record, &mut last)?;
            sqlx::query(
                "INSERT INTO records (table_name, pk, data) VALUES ($1, $2, $3) \
                 ON CONFLICT (table_name, pk) DO UPDATE SET data = EXCLUDED.data",
            )
            .bind(&self.schema.name)
            .bind(key.to_value())
            .bind(record.into_value())
            .execute(&mut *tx)
            .await
            .map_err(Error::backend)?;
        }

        tx.commit().await.map_err(Error::backend)?;
        debug!(table = %self.schema.name, upserted = count, "bulk upsert");
        Ok(())
    }

    async fn update_fields(&self, key: &Key, partial: Record) -> Result<()> {
        let new_key = partial.key(&self.primary_key)?;

        let mut tx = self.pool.begin().await.map_err(Error::backend)?;
        let stored: Option<Value> = sqlx::query_scalar(
            "SELECT data FROM records WHERE table_name = $1 AND pk = $2 FOR UPDATE",
        )
        .bind(&self.schema.name)
        .bind(key.to_value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::backend)?;

        let stored = stored.ok_or_else(|| Error::KeyNotFound(key.clone()))?;
        let mut merged = Record::try_from(stored)?;
        for (field, value) in partial.as_map() {
            merged.set(field.clone(), value.clone());
        }

        let target = match new_key {
            Some(new_key) if &new_key != key => {
                let taken = self
                    .existing_keys(&mut tx, std::slice::from_ref(&new_key))
                    .await?;
                if !taken.is_empty() {
                    return Err(Error::DuplicateKey(new_key));
                }
                new_key
            }
            _ => key.clone(),
        };

        sqlx::query("UPDATE records SET pk = $3, data = $4 WHERE table_name = $1 AND pk = $2")
            .bind(&self.schema.name)
            .bind(key.to_value())
            .bind(target.to_value())
            .bind(merged.into_value())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateKey(target.clone())
                } else {
                    Error::backend(e)
                }
            })?;

        tx.commit().await.map_err(Error::backend)?;
        if &target != key {
            debug!(table = %self.schema.name, from = %key, to = %target, "key changed");
        }
        Ok(())
    }
}
