//! Tasks and proof verification

use axum::{extract::State, Extension};
use rvw_common::db::{Task, TaskStatus};
use serde::Deserialize;
use serde_json::json;

use crate::db::audit;
use crate::db::sessions::CurrentAdmin;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::services::proof_verification::{
    self, ApprovalOutcome, AutoVerifyReport, DEFAULT_AUTO_VERIFY_BATCH,
};
use crate::AppState;

pub const TASK_SORTABLE: &[&str] = &["created_at", "id", "submitted_at", "reviewed_at", "ai_confidence"];

#[derive(Debug, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub review_request_id: Option<i64>,
    pub user_id: Option<i64>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub auto_verified: Option<bool>,
}

pub fn task_filters(params: &ListParams, filter: &TaskFilter) -> Filters {
    Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("review_request_id", filter.review_request_id)
        .eq("user_id", filter.user_id)
        .at_least("ai_confidence", filter.min_confidence)
        .at_most("ai_confidence", filter.max_confidence)
        .eq("auto_verified", filter.auto_verified)
        .search(&["proof_text", "proof_url", "rejection_reason"], params.q.as_deref())
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Json<Page<Task>>> {
    let filters = task_filters(&params, &filter);
    let page = fetch_page(&state.db, "tasks", &filters, &params, TASK_SORTABLE).await?;
    Ok(Json(page))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task {} not found", task_id)))?;
    Ok(Json(task))
}

/// POST /api/tasks/:id/approve
pub async fn approve_task(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<ApprovalOutcome>> {
    require(admin.role, Permission::ModerateContent)?;
    let outcome = proof_verification::approve_task(&state.db, task_id, admin.id, false).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct RejectTaskRequest {
    pub reason: String,
}

/// POST /api/tasks/:id/reject
pub async fn reject_task(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(task_id): Path<i64>,
    Json(body): Json<RejectTaskRequest>,
) -> ApiResult<Json<Task>> {
    require(admin.role, Permission::ModerateContent)?;
    let task =
        proof_verification::reject_task(&state.db, task_id, admin.id, &body.reason, false).await?;
    Ok(Json(task))
}

/// POST /api/tasks/:id/rescore
pub async fn rescore_task(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<Task>> {
    require(admin.role, Permission::ModerateContent)?;
    let scorer = state
        .scorer
        .as_deref()
        .ok_or_else(|| ApiError::Conflict("No proof scorer is configured".to_string()))?;

    let task = proof_verification::rescore_task(&state.db, scorer, task_id).await?;
    audit::record(
        &state.db,
        admin.id,
        "task.rescore",
        "task",
        Some(task_id),
        json!({ "ai_confidence": task.ai_confidence }),
    )
    .await?;
    tracing::info!(admin_id = admin.id, task_id, confidence = ?task.ai_confidence, "Task rescored");
    Ok(Json(task))
}

#[derive(Debug, Default, Deserialize)]
pub struct AutoVerifyRequest {
    #[serde(default)]
    pub dry_run: bool,
    pub limit: Option<i64>,
}

/// POST /api/tasks/auto-verify
pub async fn auto_verify(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    body: Option<Json<AutoVerifyRequest>>,
) -> ApiResult<Json<AutoVerifyReport>> {
    require(admin.role, Permission::ModerateContent)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let report = proof_verification::auto_verify(
        &state.db,
        state.scorer.as_deref(),
        admin.id,
        body.limit.unwrap_or(DEFAULT_AUTO_VERIFY_BATCH),
        body.dry_run,
    )
    .await?;
    Ok(Json(report))
}
