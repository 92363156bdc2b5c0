//! Review request lifecycle
//!
//! ```text
//! pending --approve--> approved --pause--> paused
//!    |                    ^  |               |
//!    +--reject--> rejected |  +--(full)--> completed
//!                          +----resume------+
//! ```

use chrono::Utc;
use rvw_common::db::{ReviewRequest, ReviewRequestStatus, SellerStatus};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::audit;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Approve,
    Reject,
    Pause,
    Resume,
}

impl RequestAction {
    pub fn name(&self) -> &'static str {
        match self {
            RequestAction::Approve => "approve",
            RequestAction::Reject => "reject",
            RequestAction::Pause => "pause",
            RequestAction::Resume => "resume",
        }
    }
}

/// Target status for `action` from `from`, or Conflict
pub fn transition(from: ReviewRequestStatus, action: RequestAction) -> ApiResult<ReviewRequestStatus> {
    use ReviewRequestStatus::*;

    match (from, action) {
        (Pending, RequestAction::Approve) => Ok(Approved),
        (Pending, RequestAction::Reject) => Ok(Rejected),
        (Approved, RequestAction::Pause) => Ok(Paused),
        (Paused, RequestAction::Resume) => Ok(Approved),
        (from, action) => Err(ApiError::Conflict(format!(
            "Cannot {} a review request that is {}",
            action.name(),
            from
        ))),
    }
}

pub async fn load(db: &SqlitePool, request_id: i64) -> ApiResult<ReviewRequest> {
    sqlx::query_as::<_, ReviewRequest>("SELECT * FROM review_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Review request {} not found", request_id)))
}

/// Apply a moderation action
///
/// Approving or resuming needs an active seller; rejecting needs a reason.
pub async fn apply_action(
    db: &SqlitePool,
    request_id: i64,
    admin_id: i64,
    action: RequestAction,
    reason: Option<&str>,
) -> ApiResult<ReviewRequest> {
    let current = load(db, request_id).await?;
    let target = transition(current.status, action)?;

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if action == RequestAction::Reject && reason.is_none() {
        return Err(ApiError::BadRequest(
            "A rejection reason is required".to_string(),
        ));
    }

    if matches!(action, RequestAction::Approve | RequestAction::Resume) {
        let seller_status: SellerStatus =
            sqlx::query_scalar("SELECT status FROM sellers WHERE id = ?")
                .bind(current.seller_id)
                .fetch_one(db)
                .await?;
        if seller_status != SellerStatus::Active {
            return Err(ApiError::Conflict(format!(
                "Seller {} is {}; their review requests cannot go live",
                current.seller_id, seller_status
            )));
        }
    }

    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, ReviewRequest>(
        "UPDATE review_requests
         SET status = ?, rejection_reason = CASE WHEN ? = 'rejected' THEN ? ELSE rejection_reason END,
             updated_at = ?
         WHERE id = ? AND status = ?
         RETURNING *",
    )
    .bind(target)
    .bind(target)
    .bind(reason)
    .bind(Utc::now())
    .bind(request_id)
    .bind(current.status)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        ApiError::Conflict(format!(
            "Review request {} changed while it was being updated",
            request_id
        ))
    })?;

    audit::record(
        &mut *tx,
        admin_id,
        &format!("review_request.{}", action.name()),
        "review_request",
        Some(request_id),
        json!({ "from": current.status, "to": target, "reason": reason }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, request_id, from = %current.status, to = %target, "Review request updated");
    Ok(updated)
}

/// Editable fields of a review request
#[derive(Debug, Clone)]
pub struct RequestEdit {
    pub title: String,
    pub description: String,
    pub reward_paise: i64,
    pub total_slots: i64,
}

/// Edit a live or pending request
///
/// Shrinking `total_slots` to the filled count completes a live request.
pub async fn update(
    db: &SqlitePool,
    request_id: i64,
    admin_id: i64,
    edit: RequestEdit,
) -> ApiResult<ReviewRequest> {
    let title = edit.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title must not be empty".to_string()));
    }
    if edit.reward_paise <= 0 {
        return Err(ApiError::BadRequest(
            "reward_paise must be greater than zero".to_string(),
        ));
    }

    let current = load(db, request_id).await?;
    if matches!(
        current.status,
        ReviewRequestStatus::Rejected | ReviewRequestStatus::Completed
    ) {
        return Err(ApiError::Conflict(format!(
            "Review request {} is {} and can no longer be edited",
            request_id, current.status
        )));
    }
    if edit.total_slots < current.filled_slots || edit.total_slots <= 0 {
        return Err(ApiError::BadRequest(format!(
            "total_slots must be at least {} (slots already filled) and positive",
            current.filled_slots.max(1)
        )));
    }

    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, ReviewRequest>(
        "UPDATE review_requests
         SET title = ?, description = ?, reward_paise = ?, total_slots = ?,
             status = CASE WHEN status IN ('approved', 'paused') AND filled_slots >= ?
                           THEN 'completed' ELSE status END,
             updated_at = ?
         WHERE id = ? AND status NOT IN ('rejected', 'completed') AND filled_slots <= ?
         RETURNING *",
    )
    .bind(title)
    .bind(edit.description.trim())
    .bind(edit.reward_paise)
    .bind(edit.total_slots)
    .bind(edit.total_slots)
    .bind(Utc::now())
    .bind(request_id)
    .bind(edit.total_slots)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        ApiError::Conflict(format!(
            "Review request {} changed while it was being updated",
            request_id
        ))
    })?;

    audit::record(
        &mut *tx,
        admin_id,
        "review_request.update",
        "review_request",
        Some(request_id),
        json!({
            "title": updated.title,
            "reward_paise": updated.reward_paise,
            "total_slots": updated.total_slots,
            "status": updated.status,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, request_id, "Review request edited");
    Ok(updated)
}
