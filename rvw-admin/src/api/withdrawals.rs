//! Withdrawal requests

use axum::{extract::State, Extension};
use rvw_common::db::{PayoutMethod, WithdrawalRequest, WithdrawalStatus};
use serde::Deserialize;

use crate::db::sessions::CurrentAdmin;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::services::withdrawals;
use crate::AppState;

pub const WITHDRAWAL_SORTABLE: &[&str] = &["requested_at", "id", "amount_paise", "processed_at"];

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawalFilter {
    pub status: Option<WithdrawalStatus>,
    pub user_id: Option<i64>,
    pub method: Option<PayoutMethod>,
}

pub fn withdrawal_filters(params: &ListParams, filter: &WithdrawalFilter) -> Filters {
    Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("user_id", filter.user_id)
        .eq("method", filter.method.map(|m| m.as_str()))
        .search(&["account_details", "payout_reference"], params.q.as_deref())
}

/// GET /api/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<WithdrawalFilter>,
) -> ApiResult<Json<Page<WithdrawalRequest>>> {
    let filters = withdrawal_filters(&params, &filter);
    let page = fetch_page(
        &state.db,
        "withdrawal_requests",
        &filters,
        &params,
        WITHDRAWAL_SORTABLE,
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/withdrawals/:id
pub async fn get_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<i64>,
) -> ApiResult<Json<WithdrawalRequest>> {
    let request =
        sqlx::query_as::<_, WithdrawalRequest>("SELECT * FROM withdrawal_requests WHERE id = ?")
            .bind(withdrawal_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Withdrawal {} not found", withdrawal_id)))?;
    Ok(Json(request))
}

/// POST /api/withdrawals/:id/approve
pub async fn approve(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(withdrawal_id): Path<i64>,
) -> ApiResult<Json<WithdrawalRequest>> {
    require(admin.role, Permission::ManageFinance)?;
    Ok(Json(withdrawals::approve(&state.db, withdrawal_id, admin.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RejectWithdrawalRequest {
    pub reason: String,
}

/// POST /api/withdrawals/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(withdrawal_id): Path<i64>,
    Json(body): Json<RejectWithdrawalRequest>,
) -> ApiResult<Json<WithdrawalRequest>> {
    require(admin.role, Permission::ManageFinance)?;
    Ok(Json(
        withdrawals::reject(&state.db, withdrawal_id, admin.id, &body.reason).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub payout_reference: String,
}

/// POST /api/withdrawals/:id/mark-paid
pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(withdrawal_id): Path<i64>,
    Json(body): Json<MarkPaidRequest>,
) -> ApiResult<Json<WithdrawalRequest>> {
    require(admin.role, Permission::ManageFinance)?;
    Ok(Json(
        withdrawals::mark_paid(&state.db, withdrawal_id, admin.id, &body.payout_reference).await?,
    ))
}
