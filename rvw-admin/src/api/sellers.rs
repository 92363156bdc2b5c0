//! Seller accounts

use axum::{extract::State, Extension};
use chrono::Utc;
use rvw_common::db::{Seller, SellerStatus};
use rvw_common::validation::{is_valid_email, validate_gstin};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::{optional_text, required_text};
use crate::db::audit;
use crate::db::sessions::CurrentAdmin;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::AppState;

pub const SELLER_SORTABLE: &[&str] = &["created_at", "id", "name", "company_name", "updated_at"];

#[derive(Debug, Default, Deserialize)]
pub struct SellerFilter {
    pub status: Option<SellerStatus>,
    pub is_verified: Option<bool>,
}

pub fn seller_filters(params: &ListParams, filter: &SellerFilter) -> Filters {
    Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("is_verified", filter.is_verified)
        .search(
            &["name", "email", "company_name", "gst_number"],
            params.q.as_deref(),
        )
}

async fn load_seller(state: &AppState, seller_id: i64) -> ApiResult<Seller> {
    sqlx::query_as::<_, Seller>("SELECT * FROM sellers WHERE id = ?")
        .bind(seller_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Seller {} not found", seller_id)))
}

/// GET /api/sellers
pub async fn list_sellers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<SellerFilter>,
) -> ApiResult<Json<Page<Seller>>> {
    let filters = seller_filters(&params, &filter);
    let page = fetch_page(&state.db, "sellers", &filters, &params, SELLER_SORTABLE).await?;
    Ok(Json(page))
}

/// GET /api/sellers/:id
pub async fn get_seller(
    State(state): State<AppState>,
    Path(seller_id): Path<i64>,
) -> ApiResult<Json<Seller>> {
    Ok(Json(load_seller(&state, seller_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SellerInput {
    pub name: String,
    pub email: String,
    pub company_name: String,
    pub gst_number: Option<String>,
}

/// Validated, normalized seller fields
struct SellerFields {
    name: String,
    email: String,
    company_name: String,
    gst_number: Option<String>,
}

impl SellerInput {
    fn validate(&self) -> ApiResult<SellerFields> {
        let name = required_text(&self.name, "name")?;
        let company_name = required_text(&self.company_name, "company_name")?;
        let email = self.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ApiError::BadRequest(format!(
                "'{}' is not a valid email address",
                self.email.trim()
            )));
        }
        let gst_number = match optional_text(self.gst_number.as_deref()) {
            Some(raw) => Some(validate_gstin(&raw)?),
            None => None,
        };
        Ok(SellerFields {
            name,
            email,
            company_name,
            gst_number,
        })
    }
}

fn email_conflict(err: sqlx::Error, email: &str) -> ApiError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::Conflict(format!("A seller with email {} already exists", email))
        }
        _ => err.into(),
    }
}

/// POST /api/sellers
pub async fn create_seller(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(body): Json<SellerInput>,
) -> ApiResult<Json<Seller>> {
    require(admin.role, Permission::ModerateContent)?;
    let fields = body.validate()?;
    let now = Utc::now();

    let mut tx = state.db.begin().await?;

    let seller = sqlx::query_as::<_, Seller>(
        "INSERT INTO sellers (name, email, company_name, gst_number, is_verified, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, 0, 'active', ?, ?)
         RETURNING *",
    )
    .bind(&fields.name)
    .bind(&fields.email)
    .bind(&fields.company_name)
    .bind(&fields.gst_number)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| email_conflict(e, &fields.email))?;

    audit::record(
        &mut *tx,
        admin.id,
        "seller.create",
        "seller",
        Some(seller.id),
        json!({ "email": seller.email, "company_name": seller.company_name }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, seller_id = seller.id, "Seller created");
    Ok(Json(seller))
}

/// PUT /api/sellers/:id
///
/// Changing the GSTIN clears verification.
pub async fn update_seller(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(seller_id): Path<i64>,
    Json(body): Json<SellerInput>,
) -> ApiResult<Json<Seller>> {
    require(admin.role, Permission::ModerateContent)?;
    let fields = body.validate()?;
    let current = load_seller(&state, seller_id).await?;
    let gst_changed = current.gst_number != fields.gst_number;

    let mut tx = state.db.begin().await?;

    let seller = sqlx::query_as::<_, Seller>(
        "UPDATE sellers
         SET name = ?, email = ?, company_name = ?, gst_number = ?,
             is_verified = CASE WHEN ? THEN 0 ELSE is_verified END,
             updated_at = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(&fields.name)
    .bind(&fields.email)
    .bind(&fields.company_name)
    .bind(&fields.gst_number)
    .bind(gst_changed)
    .bind(Utc::now())
    .bind(seller_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| email_conflict(e, &fields.email))?
    .ok_or_else(|| ApiError::NotFound(format!("Seller {} not found", seller_id)))?;

    audit::record(
        &mut *tx,
        admin.id,
        "seller.update",
        "seller",
        Some(seller_id),
        json!({
            "email": seller.email,
            "gst_number": seller.gst_number,
            "verification_cleared": gst_changed && current.is_verified,
        }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, seller_id, "Seller updated");
    Ok(Json(seller))
}

/// DELETE /api/sellers/:id
///
/// Only sellers that never posted a review request can be deleted.
pub async fn delete_seller(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(seller_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    require(admin.role, Permission::ModerateContent)?;
    let seller = load_seller(&state, seller_id).await?;

    let mut tx = state.db.begin().await?;

    let requests: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM review_requests WHERE seller_id = ?")
            .bind(seller_id)
            .fetch_one(&mut *tx)
            .await?;
    if requests > 0 {
        return Err(ApiError::Conflict(format!(
            "Seller {} has {} review request(s); suspend the seller instead",
            seller_id, requests
        )));
    }

    sqlx::query("DELETE FROM sellers WHERE id = ?")
        .bind(seller_id)
        .execute(&mut *tx)
        .await?;

    audit::record(
        &mut *tx,
        admin.id,
        "seller.delete",
        "seller",
        Some(seller_id),
        json!({ "email": seller.email, "company_name": seller.company_name }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, seller_id, "Seller deleted");
    Ok(Json(json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub verified: bool,
}

/// POST /api/sellers/:id/verify
pub async fn set_verified(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(seller_id): Path<i64>,
    Json(body): Json<VerifyRequest>,
) -> ApiResult<Json<Seller>> {
    require(admin.role, Permission::ModerateContent)?;
    let current = load_seller(&state, seller_id).await?;

    if body.verified {
        let gst = current.gst_number.as_deref().ok_or_else(|| {
            ApiError::Conflict(format!(
                "Seller {} has no GSTIN on file and cannot be verified",
                seller_id
            ))
        })?;
        validate_gstin(gst).map_err(|e| {
            ApiError::Conflict(format!(
                "Seller {} cannot be verified: {}",
                seller_id,
                e
            ))
        })?;
    }

    let mut tx = state.db.begin().await?;
    let seller = sqlx::query_as::<_, Seller>(
        "UPDATE sellers SET is_verified = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(body.verified)
    .bind(Utc::now())
    .bind(seller_id)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        admin.id,
        if body.verified { "seller.verify" } else { "seller.unverify" },
        "seller",
        Some(seller_id),
        json!({ "gst_number": seller.gst_number }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, seller_id, verified = body.verified, "Seller verification changed");
    Ok(Json(seller))
}

#[derive(Debug, Deserialize)]
pub struct SellerStatusRequest {
    pub status: SellerStatus,
}

/// POST /api/sellers/:id/status
///
/// Suspending pauses the seller's approved review requests in the same
/// transaction. Reactivating leaves them paused.
pub async fn set_status(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(seller_id): Path<i64>,
    Json(body): Json<SellerStatusRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require(admin.role, Permission::ModerateContent)?;
    let now = Utc::now();

    let mut tx = state.db.begin().await?;

    let seller = sqlx::query_as::<_, Seller>(
        "UPDATE sellers SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(body.status)
    .bind(now)
    .bind(seller_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Seller {} not found", seller_id)))?;

    let paused = if body.status == SellerStatus::Suspended {
        sqlx::query(
            "UPDATE review_requests SET status = 'paused', updated_at = ?
             WHERE seller_id = ? AND status = 'approved'",
        )
        .bind(now)
        .bind(seller_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
    } else {
        0
    };

    audit::record(
        &mut *tx,
        admin.id,
        match body.status {
            SellerStatus::Suspended => "seller.suspend",
            SellerStatus::Active => "seller.activate",
        },
        "seller",
        Some(seller_id),
        json!({ "paused_requests": paused }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, seller_id, status = %body.status, paused, "Seller status changed");
    Ok(Json(json!({ "seller": seller, "paused_requests": paused })))
}
