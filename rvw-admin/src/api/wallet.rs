//! Wallet ledger browsing

use axum::extract::State;
use rvw_common::db::{TransactionSource, WalletTransaction};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extract::{Json, Query};
use crate::listing::{fetch_page, parse_time_bound, Filters, ListParams};
use crate::pagination::Page;
use crate::AppState;

pub const TRANSACTION_SORTABLE: &[&str] = &["created_at", "id", "amount_paise"];

#[derive(Debug, Default, Deserialize)]
pub struct TransactionFilter {
    pub user_id: Option<i64>,
    pub source: Option<TransactionSource>,
    /// RFC 3339 or `YYYY-MM-DD`
    pub from: Option<String>,
    pub to: Option<String>,
}

pub fn transaction_filters(params: &ListParams, filter: &TransactionFilter) -> ApiResult<Filters> {
    let from = parse_time_bound(filter.from.as_deref(), false)?;
    let to = parse_time_bound(filter.to.as_deref(), true)?;

    Ok(Filters::new()
        .eq("user_id", filter.user_id)
        .eq("source", filter.source.map(|s| s.as_str()))
        .since("created_at", from)
        .until("created_at", to)
        .search(&["reference", "note"], params.q.as_deref()))
}

/// GET /api/wallet/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<TransactionFilter>,
) -> ApiResult<Json<Page<WalletTransaction>>> {
    let filters = transaction_filters(&params, &filter)?;
    let page = fetch_page(
        &state.db,
        "wallet_transactions",
        &filters,
        &params,
        TRANSACTION_SORTABLE,
    )
    .await?;
    Ok(Json(page))
}
