//! Announcements shown to marketplace users and sellers

use axum::{extract::State, Extension};
use chrono::{DateTime, Utc};
use rvw_common::db::{Announcement, Audience};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::required_text;
use crate::db::audit;
use crate::db::sessions::CurrentAdmin;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::AppState;

/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 200;

/// Most announcements returned by the public endpoint
const PUBLIC_LIMIT: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct AnnouncementFilter {
    pub audience: Option<Audience>,
    pub is_active: Option<bool>,
}

/// GET /api/announcements
pub async fn list_announcements(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<AnnouncementFilter>,
) -> ApiResult<Json<Page<Announcement>>> {
    let filters = Filters::new()
        .eq("audience", filter.audience.map(|a| a.as_str()))
        .eq("is_active", filter.is_active)
        .search(&["title", "body"], params.q.as_deref());
    let page = fetch_page(
        &state.db,
        "announcements",
        &filters,
        &params,
        &["created_at", "id", "starts_at", "ends_at", "title"],
    )
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementInput {
    pub title: String,
    pub body: String,
    #[serde(default = "default_audience")]
    pub audience: Audience,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_audience() -> Audience {
    Audience::All
}

fn default_active() -> bool {
    true
}

#[derive(Debug, PartialEq)]
struct AnnouncementFields {
    title: String,
    body: String,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
}

impl AnnouncementInput {
    fn validate(&self, now: DateTime<Utc>) -> ApiResult<AnnouncementFields> {
        let title = required_text(&self.title, "title")?;
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ApiError::BadRequest(format!(
                "title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
        let body = required_text(&self.body, "body")?;
        let starts_at = self.starts_at.unwrap_or(now);
        if let Some(ends_at) = self.ends_at {
            if ends_at <= starts_at {
                return Err(ApiError::BadRequest(
                    "ends_at must be later than starts_at".to_string(),
                ));
            }
        }
        Ok(AnnouncementFields {
            title,
            body,
            starts_at,
            ends_at: self.ends_at,
        })
    }
}

/// POST /api/announcements
pub async fn create_announcement(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(body): Json<AnnouncementInput>,
) -> ApiResult<Json<Announcement>> {
    require(admin.role, Permission::ModerateContent)?;
    let now = Utc::now();
    let fields = body.validate(now)?;

    let mut tx = state.db.begin().await?;
    let announcement = sqlx::query_as::<_, Announcement>(
        "INSERT INTO announcements
             (title, body, audience, is_active, starts_at, ends_at, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&fields.title)
    .bind(&fields.body)
    .bind(body.audience)
    .bind(body.is_active)
    .bind(fields.starts_at)
    .bind(fields.ends_at)
    .bind(admin.id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        admin.id,
        "announcement.create",
        "announcement",
        Some(announcement.id),
        json!({ "title": announcement.title, "audience": announcement.audience }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, announcement_id = announcement.id, "Announcement created");
    Ok(Json(announcement))
}

/// PUT /api/announcements/:id
pub async fn update_announcement(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(announcement_id): Path<i64>,
    Json(body): Json<AnnouncementInput>,
) -> ApiResult<Json<Announcement>> {
    require(admin.role, Permission::ModerateContent)?;
    let now = Utc::now();
    let fields = body.validate(now)?;

    let mut tx = state.db.begin().await?;
    let announcement = sqlx::query_as::<_, Announcement>(
        "UPDATE announcements
         SET title = ?, body = ?, audience = ?, is_active = ?, starts_at = ?, ends_at = ?, updated_at = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(&fields.title)
    .bind(&fields.body)
    .bind(body.audience)
    .bind(body.is_active)
    .bind(fields.starts_at)
    .bind(fields.ends_at)
    .bind(now)
    .bind(announcement_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Announcement {} not found", announcement_id)))?;

    audit::record(
        &mut *tx,
        admin.id,
        "announcement.update",
        "announcement",
        Some(announcement_id),
        json!({ "title": announcement.title, "is_active": announcement.is_active }),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(announcement))
}

/// DELETE /api/announcements/:id
pub async fn delete_announcement(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(announcement_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    require(admin.role, Permission::ModerateContent)?;

    let mut tx = state.db.begin().await?;
    let title: String =
        sqlx::query_scalar("DELETE FROM announcements WHERE id = ? RETURNING title")
            .bind(announcement_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("Announcement {} not found", announcement_id))
            })?;

    audit::record(
        &mut *tx,
        admin.id,
        "announcement.delete",
        "announcement",
        Some(announcement_id),
        json!({ "title": title }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, announcement_id, "Announcement deleted");
    Ok(Json(json!({ "deleted": true })))
}

/// POST /api/announcements/:id/toggle
pub async fn toggle_announcement(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(announcement_id): Path<i64>,
) -> ApiResult<Json<Announcement>> {
    require(admin.role, Permission::ModerateContent)?;

    let mut tx = state.db.begin().await?;
    let announcement = sqlx::query_as::<_, Announcement>(
        "UPDATE announcements SET is_active = NOT is_active, updated_at = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(Utc::now())
    .bind(announcement_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Announcement {} not found", announcement_id)))?;

    audit::record(
        &mut *tx,
        admin.id,
        if announcement.is_active { "announcement.activate" } else { "announcement.deactivate" },
        "announcement",
        Some(announcement_id),
        serde_json::Value::Null,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(announcement))
}

#[derive(Debug, Deserialize)]
pub struct PublicQuery {
    pub audience: Option<Audience>,
}

/// GET /api/public/announcements?audience=users|sellers
///
/// Active announcements whose window contains now, newest first. Without
/// an audience only `all` announcements are returned.
pub async fn public_announcements(
    State(state): State<AppState>,
    Query(query): Query<PublicQuery>,
) -> ApiResult<Json<Vec<Announcement>>> {
    let audience = query.audience.unwrap_or(Audience::All);
    let now = Utc::now();

    let announcements = sqlx::query_as::<_, Announcement>(
        "SELECT * FROM announcements
         WHERE is_active = 1
           AND audience IN ('all', ?)
           AND datetime(starts_at) <= datetime(?)
           AND (ends_at IS NULL OR datetime(ends_at) > datetime(?))
         ORDER BY datetime(starts_at) DESC, id DESC
         LIMIT ?",
    )
    .bind(audience)
    .bind(now)
    .bind(now)
    .bind(PUBLIC_LIMIT)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(announcements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input(title: &str, ends_in: Option<i64>) -> AnnouncementInput {
        AnnouncementInput {
            title: title.to_string(),
            body: "Payouts are delayed until Monday".to_string(),
            audience: Audience::Users,
            starts_at: None,
            ends_at: ends_in.map(|h| Utc::now() + Duration::hours(h)),
            is_active: true,
        }
    }

    #[test]
    fn test_starts_at_defaults_to_now() {
        let now = Utc::now();
        let fields = input("  Holiday notice ", None).validate(now).unwrap();
        assert_eq!(fields.title, "Holiday notice");
        assert_eq!(fields.starts_at, now);
        assert_eq!(fields.ends_at, None);
    }

    #[test]
    fn test_title_length_is_counted_in_chars() {
        let now = Utc::now();
        let exact = "₹".repeat(MAX_TITLE_CHARS);
        assert!(input(&exact, None).validate(now).is_ok());

        let long = "a".repeat(MAX_TITLE_CHARS + 1);
        assert!(input(&long, None).validate(now).is_err());
        assert!(input("   ", None).validate(now).is_err());
    }

    #[test]
    fn test_window_must_end_after_start() {
        let now = Utc::now();
        assert!(input("Sale", Some(-1)).validate(now).is_err());
        assert!(input("Sale", Some(24)).validate(now).is_ok());
    }
}
