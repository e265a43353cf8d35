//! Sync handlers: reconcile a table against records sent by a client.

use crate::error::Result;
use resync_engine::{
    identity_filter, records_from_value, Collection, Database, Filter, Plan, PlanSummary, Record,
    Settings, TableSchema,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Request body for bulk sync and plan.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Desired records; must be an array
    pub records: Value,
    /// Equality filter narrowing the collection
    #[serde(default)]
    pub filter: Map<String, Value>,
    /// Per-call settings
    #[serde(default)]
    pub settings: Option<Settings>,
}

/// Request body for single-record sync.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOneRequest {
    pub record: Value,
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub settings: Option<Settings>,
}

/// Response for bulk sync.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub table: String,
    /// What was applied
    pub summary: PlanSummary,
}

/// Response for single-record sync.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOneResponse {
    pub table: String,
    /// Stored records sharing the record's identity after the sync
    pub records: Vec<Record>,
}

/// Response for plan.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub table: String,
    pub summary: PlanSummary,
    pub plan: Plan,
}

/// Response for listing records.
#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub table: String,
    pub records: Vec<Record>,
}

fn collection(db: &Database, table: &str, filter: Map<String, Value>) -> Result<Collection> {
    let filter = filter
        .into_iter()
        .fold(Filter::new(), |filter, (field, value)| filter.eq(field, value));
    Ok(db.table(table)?.filter(filter))
}

/// Make the filtered collection hold exactly the requested records.
pub async fn handle_sync(db: &Database, table: &str, request: SyncRequest) -> Result<SyncResponse> {
    let records = records_from_value(request.records)?;
    let collection = collection(db, table, request.filter)?;
    let settings = request.settings.as_ref();

    let current = collection.to_vec().await?;
    let summary = collection.engine().plan(&current, &records, settings)?.summary();
    collection
        .engine()
        .execute(&current, &records, settings)
        .await?;

    info!(
        table,
        additions = summary.additions,
        deletions = summary.deletions,
        updates = summary.updates,
        key_changes = summary.key_changes,
        "Synced records"
    );

    Ok(SyncResponse {
        table: table.to_string(),
        summary,
    })
}

/// Reconcile one record against the filtered collection.
pub async fn handle_sync_one(
    db: &Database,
    table: &str,
    request: SyncOneRequest,
) -> Result<SyncOneResponse> {
    let record = Record::try_from(request.record)?;
    let collection = collection(db, table, request.filter)?;
    let settings = request.settings.as_ref();

    let identity = collection.engine().resolve_settings(settings)?;
    let matches = collection
        .scope()
        .clone()
        .and(identity_filter(&record, identity.identity()));

    collection.single_sync(record, settings).await?;
    let records = matches.read().await?;

    info!(table, matching = records.len(), "Synced single record");

    Ok(SyncOneResponse {
        table: table.to_string(),
        records,
    })
}

/// Compute what a bulk sync would do, without writing.
pub async fn handle_plan(db: &Database, table: &str, request: SyncRequest) -> Result<PlanResponse> {
    let records = records_from_value(request.records)?;
    let collection = collection(db, table, request.filter)?;

    let plan = collection.plan(&records, request.settings.as_ref()).await?;

    Ok(PlanResponse {
        table: table.to_string(),
        summary: plan.summary(),
        plan,
    })
}

/// Records of a table matching string-valued query parameters.
pub async fn handle_list_records(
    db: &Database,
    table: &str,
    query: BTreeMap<String, String>,
) -> Result<RecordsResponse> {
    let filter = query
        .into_iter()
        .map(|(field, value)| (field, Value::String(value)))
        .collect();
    let records = collection(db, table, filter)?.to_vec().await?;

    Ok(RecordsResponse {
        table: table.to_string(),
        records,
    })
}

/// Schemas of the served tables.
pub fn handle_list_tables(db: &Database) -> Vec<TableSchema> {
    db.schemas()
}
