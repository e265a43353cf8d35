//! # Resync Engine
//!
//! Declarative record reconciliation for keyed tables.
//!
//! Give the engine the records a table holds now and the records it should
//! hold, and it works out the minimal set of deletions, additions and updates
//! that gets from one to the other, then applies them through a pluggable
//! pipeline of handlers.
//!
//! ## Design Principles
//!
//! - **Storage-agnostic**: the engine only talks to the [`Table`] trait
//! - **Planned before applied**: the full [`Plan`] is computed, and validated,
//!   before the first write
//! - **Minimal writes**: unchanged records are never written
//!
//! ## Core Concepts
//!
//! ### Identity
//!
//! Two records are the same entity when every configured identity field is
//! equal. Identity defaults to the primary key but can be any field set, such
//! as a natural key like `isbn`.
//!
//! ### Planning
//!
//! The [`Planner`] pairs current and desired records one to one. Unpaired
//! current records are deleted, unpaired desired records are added, and pairs
//! whose change fields differ are projected and updated. A pair whose primary
//! key differs yields a [`KeyChange`] that is applied before the update.
//!
//! ### Pipeline
//!
//! A [`Pipeline`] runs [`Handler`]s in order. The default is
//! [`DeleteHandler`], [`AddHandler`], [`UpdateHandler`]; callers may reorder,
//! drop or add handlers per call through [`Settings`].
//!
//! ## Quick Start
//!
//! ```rust
//! use resync_engine::{BulkSync, KeyPath, MemoryTable, Record, Settings, TableSchema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> resync_engine::Result<()> {
//! // 1. A table keyed by `id`
//! let books = Arc::new(MemoryTable::new(
//!     TableSchema::new("books", KeyPath::single("id")).auto_increment(),
//! )?);
//! books
//!     .seed(vec![
//!         Record::try_from(json!({"id": 1, "isbn": "b1", "title": "Book 1"}))?,
//!         Record::try_from(json!({"id": 2, "isbn": "b2", "title": "Book 2"}))?,
//!     ])
//!     .await?;
//!
//! // 2. An engine matching by ISBN
//! let engine = BulkSync::new(books.clone())?
//!     .with_settings(Settings::new().with_identity_fields(["isbn"]));
//!
//! // 3. Sync to the desired state
//! let current = books.records().await;
//! let desired = vec![
//!     Record::try_from(json!({"isbn": "b1", "title": "Book 1 (revised)"}))?,
//!     Record::try_from(json!({"isbn": "b3", "title": "Book 3"}))?,
//! ];
//! engine.execute(&current, &desired, None).await?;
//!
//! assert_eq!(books.len().await, 2);
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod single;
pub mod store;
pub mod table;

// Re-export main types at crate root
pub use db::{Collection, Database};
pub use engine::BulkSync;
pub use error::{BackendError, Error, Result};
pub use pipeline::{
    AddHandler, DeleteHandler, Handler, Pipeline, Request, TraceHandler, UpdateHandler,
};
pub use reconcile::{
    find_match, has_changed, is_same_record, project, resolve_key_change, KeyChange, Matching,
    Plan, PlanSummary, Planner, Update,
};
pub use record::{records_from_value, values_equal, Key, Record};
pub use registry::{EngineFactory, Registry};
pub use schema::{KeyPath, TableSchema};
pub use settings::Settings;
pub use single::{identity_filter, Scope};
pub use store::{MemoryTable, Mutation};
pub use table::{Condition, Filter, Table};

/// Type aliases for clarity
pub type FieldName = String;
pub type TableName = String;
