//! Audit log browsing

use axum::extract::State;
use rvw_common::db::AuditEntry;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::{Json, Query};
use crate::listing::{fetch_page, parse_time_bound, Filters, ListParams};
use crate::pagination::Page;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub admin_id: Option<i64>,
    pub entity: Option<String>,
    pub entity_id: Option<i64>,
    pub action: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// GET /api/audit
pub async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<Page<AuditEntry>>> {
    let filters = Filters::new()
        .eq("admin_id", filter.admin_id)
        .eq("entity", filter.entity.filter(|e| !e.trim().is_empty()))
        .eq("entity_id", filter.entity_id)
        .eq("action", filter.action.filter(|a| !a.trim().is_empty()))
        .since("created_at", parse_time_bound(filter.from.as_deref(), false)?)
        .until("created_at", parse_time_bound(filter.to.as_deref(), true)?)
        .search(&["details"], params.q.as_deref());
    let page = fetch_page(&state.db, "audit_log", &filters, &params, &["created_at", "id"]).await?;
    Ok(Json(page))
}
