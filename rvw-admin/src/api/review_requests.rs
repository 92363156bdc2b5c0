//! Review request moderation

use std::collections::HashMap;

use axum::{extract::State, Extension};
use rvw_common::db::{ReviewRequest, ReviewRequestStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::db::audit;
use crate::db::sessions::CurrentAdmin;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::services::review_requests::{self, RequestAction, RequestEdit};
use crate::AppState;

const REQUEST_SORTABLE: &[&str] = &[
    "created_at",
    "id",
    "updated_at",
    "reward_paise",
    "total_slots",
    "filled_slots",
];

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequestFilter {
    pub status: Option<ReviewRequestStatus>,
    pub seller_id: Option<i64>,
    pub platform: Option<String>,
}

/// GET /api/review-requests
pub async fn list_review_requests(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<ReviewRequestFilter>,
) -> ApiResult<Json<Page<ReviewRequest>>> {
    let filters = Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("seller_id", filter.seller_id)
        .eq("platform", filter.platform.filter(|p| !p.trim().is_empty()))
        .search(&["title", "description", "product_url"], params.q.as_deref());
    let page = fetch_page(&state.db, "review_requests", &filters, &params, REQUEST_SORTABLE).await?;
    Ok(Json(page))
}

#[derive(Debug, Serialize)]
pub struct ReviewRequestDetail {
    #[serde(flatten)]
    pub request: ReviewRequest,
    pub task_counts: HashMap<String, i64>,
}

/// GET /api/review-requests/:id
pub async fn get_review_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<ReviewRequestDetail>> {
    let request = review_requests::load(&state.db, request_id).await?;
    let counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM tasks WHERE review_request_id = ? GROUP BY status",
    )
    .bind(request_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ReviewRequestDetail {
        request,
        task_counts: counts.into_iter().collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub reward_paise: i64,
    pub total_slots: i64,
}

/// PUT /api/review-requests/:id
pub async fn update_review_request(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(request_id): Path<i64>,
    Json(body): Json<UpdateReviewRequest>,
) -> ApiResult<Json<ReviewRequest>> {
    require(admin.role, Permission::ModerateContent)?;
    let updated = review_requests::update(
        &state.db,
        request_id,
        admin.id,
        RequestEdit {
            title: body.title,
            description: body.description,
            reward_paise: body.reward_paise,
            total_slots: body.total_slots,
        },
    )
    .await?;
    Ok(Json(updated))
}

/// DELETE /api/review-requests/:id
///
/// Refused once any task references the request.
pub async fn delete_review_request(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    require(admin.role, Permission::ModerateContent)?;
    let request = review_requests::load(&state.db, request_id).await?;

    let mut tx = state.db.begin().await?;
    let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE review_request_id = ?")
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;
    if tasks > 0 {
        return Err(ApiError::Conflict(format!(
            "Review request {} has {} task(s) and cannot be deleted",
            request_id, tasks
        )));
    }

    sqlx::query("DELETE FROM review_requests WHERE id = ?")
        .bind(request_id)
        .execute(&mut *tx)
        .await?;
    audit::record(
        &mut *tx,
        admin.id,
        "review_request.delete",
        "review_request",
        Some(request_id),
        json!({ "title": request.title, "seller_id": request.seller_id }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, request_id, "Review request deleted");
    Ok(Json(json!({ "deleted": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

async fn act(
    state: &AppState,
    admin: &CurrentAdmin,
    request_id: i64,
    action: RequestAction,
    reason: Option<&str>,
) -> ApiResult<Json<ReviewRequest>> {
    require(admin.role, Permission::ModerateContent)?;
    let updated =
        review_requests::apply_action(&state.db, request_id, admin.id, action, reason).await?;
    Ok(Json(updated))
}

/// POST /api/review-requests/:id/approve
pub async fn approve(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<ReviewRequest>> {
    act(&state, &admin, request_id, RequestAction::Approve, None).await
}

/// POST /api/review-requests/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(request_id): Path<i64>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<Json<ReviewRequest>> {
    act(&state, &admin, request_id, RequestAction::Reject, body.reason.as_deref()).await
}

/// POST /api/review-requests/:id/pause
pub async fn pause(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<ReviewRequest>> {
    act(&state, &admin, request_id, RequestAction::Pause, None).await
}

/// POST /api/review-requests/:id/resume
pub async fn resume(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<ReviewRequest>> {
    act(&state, &admin, request_id, RequestAction::Resume, None).await
}
