//! The ordered list of handlers that turns a reconciliation into writes.
//!
//! Every handler receives the same [`Request`] and derives only the slice of
//! the plan it is responsible for. The default pipeline deletes first, so a
//! freed primary key can be reused by an addition or a key remap in the same
//! call, then adds, then updates.

use crate::{error::Result, Planner, Record, Settings, Table};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a handler needs to act on one reconciliation.
#[derive(Clone, Copy)]
pub struct Request<'a> {
    /// Records currently stored in the scope being reconciled
    pub current_records: &'a [Record],
    /// Records the scope should hold afterwards
    pub new_records: &'a [Record],
    /// Resolved settings for this call
    pub settings: &'a Settings,
    /// Table receiving the writes
    pub table: &'a dyn Table,
    /// Primary-key field of `table`
    pub primary_key: &'a str,
}

impl<'a> Request<'a> {
    /// A planner over this request's snapshots.
    pub fn planner(&self) -> Planner<'a> {
        Planner::new(
            self.current_records,
            self.new_records,
            self.settings,
            self.primary_key,
        )
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("table", &self.table.name())
            .field("current_records", &self.current_records.len())
            .field("new_records", &self.new_records.len())
            .field("settings", self.settings)
            .finish()
    }
}

/// One step of a [`Pipeline`].
#[async_trait]
pub trait Handler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Act on the request.
    async fn handle(&self, request: &Request<'_>) -> Result<()>;
}

/// Deletes current records that have no desired counterpart.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteHandler;

#[async_trait]
impl Handler for DeleteHandler {
    fn name(&self) -> &'static str {
        "delete"
    }

    async fn handle(&self, request: &Request<'_>) -> Result<()> {
        let keys = request.planner().deletions()?;
        if keys.is_empty() {
            return Ok(());
        }

        debug!(table = %request.table.name(), count = keys.len(), "deleting records");
        request.table.bulk_delete(&keys).await
    }
}

/// Inserts desired records that have no current counterpart.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddHandler;

#[async_trait]
impl Handler for AddHandler {
    fn name(&self) -> &'static str {
        "add"
    }

    async fn handle(&self, request: &Request<'_>) -> Result<()> {
        let records: Vec<Record> = request.planner().additions().into_iter().cloned().collect();
        if records.is_empty() {
            return Ok(());
        }

        debug!(table = %request.table.name(), count = records.len(), "adding records");
        let keys = request.table.bulk_insert(records).await?;
        debug!(table = %request.table.name(), ?keys, "records added");
        Ok(())
    }
}

/// Writes matched records whose change fields differ.
///
/// Primary-key moves are applied first, one at a time and keyed by the old
/// key, so the final upsert lands on the new keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateHandler;

#[async_trait]
impl Handler for UpdateHandler {
    fn name(&self) -> &'static str {
        "update"
    }

    async fn handle(&self, request: &Request<'_>) -> Result<()> {
        let updates = request.planner().updates()?;
        if updates.is_empty() {
            return Ok(());
        }

        for change in updates.iter().filter_map(|u| u.key_change.as_ref()) {
            debug!(
                table = %request.table.name(),
                from = %change.from,
                to = %change.to,
                "remapping primary key"
            );
            let partial = Record::new().with(request.primary_key, change.to.to_value());
            request.table.update_fields(&change.from, partial).await?;
        }

        debug!(table = %request.table.name(), count = updates.len(), "updating records");
        let records = updates.into_iter().map(|u| u.updated).collect();
        request.table.bulk_upsert(records).await
    }
}

/// Emits a structured event describing each request. Writes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceHandler;

#[async_trait]
impl Handler for TraceHandler {
    fn name(&self) -> &'static str {
        "trace"
    }

    async fn handle(&self, request: &Request<'_>) -> Result<()> {
        info!(
            table = %request.table.name(),
            current = request.current_records.len(),
            desired = request.new_records.len(),
            identity = ?request.settings.identity(),
            "reconciling"
        );
        Ok(())
    }
}

/// Ordered handlers run for every reconciliation.
#[derive(Clone)]
pub struct Pipeline {
    handlers: Vec<Arc<dyn Handler>>,
}

impl Pipeline {
    /// Pipeline from an explicit handler list.
    pub fn new(handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self { handlers }
    }

    /// Pipeline with no handlers.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Append a handler.
    pub fn push(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Builder-style append.
    pub fn then(mut self, handler: Arc<dyn Handler>) -> Self {
        self.push(handler);
        self
    }

    /// Builder-style insert at the front.
    pub fn prepend(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(0, handler);
        self
    }

    /// The handlers, in run order.
    pub fn handlers(&self) -> &[Arc<dyn Handler>] {
        &self.handlers
    }

    /// Handler names, in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler in order, each to completion before the next.
    ///
    /// Stops at the first failure; earlier handlers' writes stay applied.
    pub async fn run(&self, request: &Request<'_>) -> Result<()> {
        for handler in &self.handlers {
            debug!(table = %request.table.name(), handler = handler.name(), "running handler");
            if let Err(e) = handler.handle(request).await {
                warn!(
                    table = %request.table.name(),
                    handler = handler.name(),
                    error = %e,
                    "handler failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(DeleteHandler),
            Arc::new(AddHandler),
            Arc::new(UpdateHandler),
        ])
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
