//! Table endpoints: listing, sync and plan.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use resync_engine::TableSchema;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::handlers::{
    handle_list_records, handle_list_tables, handle_plan, handle_sync, handle_sync_one,
    PlanResponse, RecordsResponse, SyncOneRequest, SyncOneResponse, SyncRequest, SyncResponse,
};
use crate::AppState;

/// Create table routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tables", get(list_tables_handler))
        .route("/tables/{name}/records", get(list_records_handler))
        .route("/tables/{name}/sync", post(sync_handler))
        .route("/tables/{name}/sync-one", post(sync_one_handler))
        .route("/tables/{name}/plan", post(plan_handler))
}

/// GET /tables - Declared tables.
async fn list_tables_handler(State(state): State<AppState>) -> Json<Vec<TableSchema>> {
    Json(handle_list_tables(&state.database))
}

/// GET /tables/{name}/records - Records matching the query string.
async fn list_records_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<RecordsResponse>> {
    let response = handle_list_records(&state.database, &name, query).await?;
    Ok(Json(response))
}

/// POST /tables/{name}/sync - Reconcile the table with the given records.
async fn sync_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    let response = handle_sync(&state.database, &name, request).await?;
    Ok(Json(response))
}

/// POST /tables/{name}/sync-one - Reconcile one record by identity.
async fn sync_one_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SyncOneRequest>,
) -> Result<Json<SyncOneResponse>> {
    let response = handle_sync_one(&state.database, &name, request).await?;
    Ok(Json(response))
}

/// POST /tables/{name}/plan - What a sync would do.
async fn plan_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<PlanResponse>> {
    let response = handle_plan(&state.database, &name, request).await?;
    Ok(Json(response))
}
