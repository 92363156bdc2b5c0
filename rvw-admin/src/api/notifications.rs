//! Notifications sent to marketplace users

use axum::{extract::State, Extension};
use rvw_common::db::Notification;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::api::required_text;
use crate::api::users::load_user;
use crate::db::sessions::CurrentAdmin;
use crate::db::{audit, notifications};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    pub user_id: Option<i64>,
    pub is_read: Option<bool>,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<NotificationFilter>,
) -> ApiResult<Json<Page<Notification>>> {
    let filters = Filters::new()
        .eq("user_id", filter.user_id)
        .eq("is_read", filter.is_read)
        .search(&["title", "message"], params.q.as_deref());
    let page = fetch_page(
        &state.db,
        "notifications",
        &filters,
        &params,
        &["created_at", "id"],
    )
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    /// Omit to broadcast to every active user
    pub user_id: Option<i64>,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendResult {
    pub sent: u64,
    pub broadcast: bool,
}

/// POST /api/notifications
pub async fn send_notification(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(body): Json<SendNotificationRequest>,
) -> ApiResult<Json<SendResult>> {
    require(admin.role, Permission::SendNotifications)?;
    let title = required_text(&body.title, "title")?;
    let message = required_text(&body.message, "message")?;

    if let Some(user_id) = body.user_id {
        load_user(&state.db, user_id).await?;
    }

    let mut tx = state.db.begin().await?;
    let sent = match body.user_id {
        Some(user_id) => {
            notifications::notify(&mut *tx, user_id, &title, &message).await?;
            1
        }
        None => notifications::broadcast(&mut *tx, &title, &message).await?,
    };

    audit::record(
        &mut *tx,
        admin.id,
        if body.user_id.is_some() { "notification.send" } else { "notification.broadcast" },
        "notification",
        None,
        json!({ "user_id": body.user_id, "title": title, "recipients": sent }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, recipients = sent, "Notification sent");
    Ok(Json(SendResult {
        sent,
        broadcast: body.user_id.is_none(),
    }))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(notification_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    require(admin.role, Permission::SendNotifications)?;

    let mut tx = state.db.begin().await?;
    let user_id: i64 =
        sqlx::query_scalar("DELETE FROM notifications WHERE id = ? RETURNING user_id")
            .bind(notification_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("Notification {} not found", notification_id))
            })?;

    audit::record(
        &mut *tx,
        admin.id,
        "notification.delete",
        "notification",
        Some(notification_id),
        json!({ "user_id": user_id }),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(json!({ "deleted": true })))
}
