//! MemoryTable - the in-memory table implementation.
//!
//! Holds records keyed by primary key and journals every effective write, so
//! callers can see exactly which mutations a reconciliation issued.

use crate::{error::Result, Error, FieldName, Filter, Key, Record, Table, TableSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// One effective write against a [`MemoryTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum Mutation {
    /// A record was inserted. `generated` is set when the table assigned the key.
    Inserted { key: Key, generated: bool },
    /// A record was deleted.
    Deleted { key: Key },
    /// An existing record was rewritten in place.
    Updated { key: Key },
    /// A record moved from one primary key to another.
    KeyChanged { from: Key, to: Key },
}

/// Mutable state behind the lock.
#[derive(Debug, Default)]
struct TableState {
    records: BTreeMap<Key, Record>,
    /// Highest integer key ever stored, for auto-increment
    last_int_key: i64,
    journal: Vec<Mutation>,
}

impl TableState {
    fn observe_key(&mut self, key: &Key) {
        if let Some(i) = key.as_int() {
            self.last_int_key = self.last_int_key.max(i);
        }
    }

    fn next_key(&mut self) -> Key {
        self.last_int_key += 1;
        Key::Int(self.last_int_key)
    }
}

/// An in-memory [`Table`].
#[derive(Debug)]
pub struct MemoryTable {
    schema: TableSchema,
    primary_key: FieldName,
    state: RwLock<TableState>,
}

impl MemoryTable {
    /// Create an empty table.
    ///
    /// The in-memory table only supports single-field primary keys.
    pub fn new(schema: TableSchema) -> Result<Self> {
        let primary_key = schema.primary_key_field()?.to_string();
        Ok(Self {
            schema,
            primary_key,
            state: RwLock::new(TableState::default()),
        })
    }

    /// Load records without journaling them.
    pub async fn seed(&self, records: Vec<Record>) -> Result<()> {
        let mut state = self.state.write().await;
        for mut record in records {
            let (key, _) = self.key_for(&mut state, &mut record)?;
            state.observe_key(&key);
            state.records.insert(key, record);
        }
        Ok(())
    }

    /// All records in key order.
    pub async fn records(&self) -> Vec<Record> {
        self.state.read().await.records.values().cloned().collect()
    }

    /// Get a record by key.
    pub async fn get(&self, key: &Key) -> Option<Record> {
        self.state.read().await.records.get(key).cloned()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Whether the table holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Journal of writes since creation or the last [`clear_mutations`](Self::clear_mutations).
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.read().await.journal.clone()
    }

    /// Reset the journal.
    pub async fn clear_mutations(&self) {
        self.state.write().await.journal.clear();
    }

    /// Resolve the key a record will be stored under, assigning one if allowed.
    fn key_for(&self, state: &mut TableState, record: &mut Record) -> Result<(Key, bool)> {
        match record.key(&self.primary_key)? {
            Some(key) => Ok((key, false)),
            None if self.schema.auto_increment => {
                let key = state.next_key();
                record.set(self.primary_key.clone(), key.to_value());
                Ok((key, true))
            }
            None => Err(Error::MissingKey(self.primary_key.clone())),
        }
    }
}

#[async_trait]
impl Table for MemoryTable {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn read_all(&self, filter: Option<&Filter>) -> Result<Vec<Record>> {
        let state = self.state.read().await;
        let records = state
            .records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(r)))
            .cloned()
            .collect();
        Ok(records)
    }

    async fn bulk_insert(&self, records: Vec<Record>) -> Result<Vec<Key>> {
        let mut state = self.state.write().await;

        // Validate the whole batch before writing anything
        let last_int_key = state.last_int_key;
        let mut prepared = Vec::with_capacity(records.len());
        let mut batch_keys = HashSet::with_capacity(records.len());
        for mut record in records {
            let prepared_key = self.key_for(&mut state, &mut record);
            let (key, generated) = match prepared_key {
                Ok(k) => k,
                Err(e) => {
                    state.last_int_key = last_int_key;
                    return Err(e);
                }
            };
            if state.records.contains_key(&key) || !batch_keys.insert(key.clone()) {
                state.last_int_key = last_int_key;
                return Err(Error::DuplicateKey(key));
            }
            state.observe_key(&key);
            prepared.push((key, generated, record));
        }

        let mut keys = Vec::with_capacity(prepared.len());
        for (key, generated, record) in prepared {
            state.records.insert(key.clone(), record);
            state.journal.push(Mutation::Inserted {
                key: key.clone(),
                generated,
            });
            keys.push(key);
        }

        Ok(keys)
    }

    async fn bulk_delete(&self, keys: &[Key]) -> Result<()> {
        let mut state = self.state.write().await;
        for key in keys {
            if state.records.remove(key).is_some() {
                state.journal.push(Mutation::Deleted { key: key.clone() });
            }
        }
        Ok(())
    }

    async fn bulk_upsert(&self, records: Vec<Record>) -> Result<()> {
        let mut state = self.state.write().await;
        for mut record in records {
            let (key, generated) = self.key_for(&mut state, &mut record)?;
            state.observe_key(&key);
            let mutation = if state.records.insert(key.clone(), record).is_some() {
                Mutation::Updated { key }
            } else {
                Mutation::Inserted { key, generated }
            };
            state.journal.push(mutation);
        }
        Ok(())
    }

    async fn update_fields(&self, key: &Key, partial: Record) -> Result<()> {
        let mut state = self.state.write().await;

        let new_key = partial.key(&self.primary_key)?;
        let existing = state
            .records
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(key.clone()))?;

        let mut merged = existing.clone();
        for (field, value) in partial.as_map() {
            merged.set(field.clone(), value.clone());
        }

        match new_key {
            Some(new_key) if &new_key != key => {
                if state.records.contains_key(&new_key) {
                    return Err(Error::DuplicateKey(new_key));
                }
                state.records.remove(key);
                state.observe_key(&new_key);
                state.records.insert(new_key.clone(), merged);
                state.journal.push(Mutation::KeyChanged {
                    from: key.clone(),
                    to: new_key,
                });
            }
            _ => {
                state.records.insert(key.clone(), merged);
                state.journal.push(Mutation::Updated { key: key.clone() });
            }
        }

        Ok(())
    }
}
