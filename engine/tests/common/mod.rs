//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use resync_engine::{
    records_from_value, Database, Key, KeyPath, MemoryTable, Mutation, Record, TableSchema,
};
use serde_json::Value;
use std::sync::Arc;

pub fn rows(value: Value) -> Vec<Record> {
    records_from_value(value).unwrap()
}

pub fn row(value: Value) -> Record {
    Record::try_from(value).unwrap()
}

/// An auto-increment `books` table keyed by `id`.
pub async fn books(seed: Value) -> Arc<MemoryTable> {
    let books = Arc::new(
        MemoryTable::new(TableSchema::new("books", KeyPath::single("id")).auto_increment())
            .unwrap(),
    );
    books.seed(rows(seed)).await.unwrap();
    books
}

/// [`books`], registered in a fresh database.
pub async fn library(seed: Value) -> (Database, Arc<MemoryTable>) {
    let books = books(seed).await;
    let db = Database::new();
    db.add_table(books.clone());
    (db, books)
}

pub fn added(key: impl Into<Key>) -> Mutation {
    Mutation::Inserted {
        key: key.into(),
        generated: false,
    }
}

pub fn generated(key: impl Into<Key>) -> Mutation {
    Mutation::Inserted {
        key: key.into(),
        generated: true,
    }
}

pub fn deleted(key: impl Into<Key>) -> Mutation {
    Mutation::Deleted { key: key.into() }
}

pub fn updated(key: impl Into<Key>) -> Mutation {
    Mutation::Updated { key: key.into() }
}

pub fn key_changed(from: impl Into<Key>, to: impl Into<Key>) -> Mutation {
    Mutation::KeyChanged {
        from: from.into(),
        to: to.into(),
    }
}
