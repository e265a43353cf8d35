//! Per-table engine registry.
//!
//! Engines are created lazily, one per table name, and shared by every caller
//! that syncs that table. The registry is thread-safe and can be shared across
//! tasks via `Arc`.

use crate::{error::Result, BulkSync, Table};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Builds the engine for a table the first time it is requested.
pub type EngineFactory = Arc<dyn Fn(Arc<dyn Table>) -> Result<BulkSync> + Send + Sync>;

/// Lazily-populated map from table name to its engine.
pub struct Registry {
    engines: DashMap<String, Arc<BulkSync>>,
    factory: EngineFactory,
}

impl Registry {
    /// Registry building engines with default settings.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(BulkSync::new))
    }

    /// Registry building engines with `factory`.
    pub fn with_factory(factory: EngineFactory) -> Self {
        Self {
            engines: DashMap::new(),
            factory,
        }
    }

    /// The engine for `table`, created on first use.
    ///
    /// A cached engine bound to a different table of the same name is stale
    /// and gets rebuilt. The factory runs without any map lock held, so it
    /// may use the registry. A factory failure leaves nothing cached, so a
    /// later call retries.
    pub fn get_or_create(&self, table: Arc<dyn Table>) -> Result<Arc<BulkSync>> {
        let name = table.name().to_string();
        if let Some(engine) = self.engines.get(&name) {
            if same_table(engine.table(), &table) {
                return Ok(engine.value().clone());
            }
        }

        let built = Arc::new((self.factory)(table.clone())?);
        match self.engines.entry(name) {
            Entry::Occupied(mut entry) => {
                if same_table(entry.get().table(), &table) {
                    // Another caller built it first
                    return Ok(entry.get().clone());
                }
                tracing::debug!(table = %table.name(), "stale engine replaced");
                entry.insert(built.clone());
                Ok(built)
            }
            Entry::Vacant(entry) => {
                tracing::debug!(table = %table.name(), "engine created");
                Ok(entry.insert(built).clone())
            }
        }
    }

    /// Install an engine, replacing any existing one for the same table.
    pub fn register(&self, engine: BulkSync) -> Arc<BulkSync> {
        let engine = Arc::new(engine);
        self.engines
            .insert(engine.table().name().to_string(), engine.clone());
        engine
    }

    /// The cached engine for `name`, if one exists.
    pub fn get(&self, name: &str) -> Option<Arc<BulkSync>> {
        self.engines.get(name).map(|entry| entry.value().clone())
    }

    /// Drop the cached engine for `name`. Returns whether one was cached.
    pub fn invalidate(&self, name: &str) -> bool {
        self.engines.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Whether both handles point at the same table instance.
fn same_table(a: &Arc<dyn Table>, b: &Arc<dyn Table>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("Registry").field("engines", &names).finish()
    }
}
