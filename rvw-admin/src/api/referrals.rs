//! Referral commission tiers and payouts

use axum::{extract::State, Extension};
use rvw_common::db::settings::load_runtime_settings;
use rvw_common::db::{ReferralCommission, ReferralTier};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::db::audit;
use crate::db::sessions::CurrentAdmin;
use crate::error::ApiResult;
use crate::extract::{Json, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::services::referrals::{load_tiers, validate_tiers};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TierTable {
    pub tiers: Vec<ReferralTier>,
    pub total_bps: i64,
    pub max_levels: i64,
}

async fn tier_table(state: &AppState) -> ApiResult<TierTable> {
    let mut conn = state.db.acquire().await?;
    let tiers = load_tiers(&mut conn).await?;
    let settings = load_runtime_settings(&mut *conn).await?;
    Ok(TierTable {
        total_bps: tiers.iter().map(|t| t.commission_bps).sum(),
        tiers,
        max_levels: settings.max_referral_levels,
    })
}

/// GET /api/referrals/tiers
pub async fn list_tiers(State(state): State<AppState>) -> ApiResult<Json<TierTable>> {
    Ok(Json(tier_table(&state).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReplaceTiersRequest {
    pub tiers: Vec<ReferralTier>,
}

/// PUT /api/referrals/tiers
///
/// Replaces the whole table. Commissions already paid are not touched.
pub async fn replace_tiers(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(body): Json<ReplaceTiersRequest>,
) -> ApiResult<Json<TierTable>> {
    require(admin.role, Permission::ManageFinance)?;
    let settings = load_runtime_settings(&state.db).await?;
    validate_tiers(&body.tiers, settings.max_referral_levels)?;

    let mut tx = state.db.begin().await?;
    let previous = load_tiers(&mut tx).await?;

    sqlx::query("DELETE FROM referral_tiers")
        .execute(&mut *tx)
        .await?;
    for tier in &body.tiers {
        sqlx::query("INSERT INTO referral_tiers (level, commission_bps) VALUES (?, ?)")
            .bind(tier.level)
            .bind(tier.commission_bps)
            .execute(&mut *tx)
            .await?;
    }

    audit::record(
        &mut *tx,
        admin.id,
        "referral_tiers.replace",
        "referral_tier",
        None,
        json!({ "previous": previous, "current": body.tiers }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, levels = body.tiers.len(), "Referral tiers replaced");
    Ok(Json(tier_table(&state).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CommissionFilter {
    pub beneficiary_id: Option<i64>,
    pub source_user_id: Option<i64>,
    pub task_id: Option<i64>,
    pub level: Option<i64>,
}

/// GET /api/referrals/commissions
pub async fn list_commissions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<CommissionFilter>,
) -> ApiResult<Json<Page<ReferralCommission>>> {
    let filters = Filters::new()
        .eq("beneficiary_id", filter.beneficiary_id)
        .eq("source_user_id", filter.source_user_id)
        .eq("task_id", filter.task_id)
        .eq("level", filter.level);
    let page = fetch_page(
        &state.db,
        "referral_commissions",
        &filters,
        &params,
        &["created_at", "id", "amount_paise", "level"],
    )
    .await?;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rvw_common::db::init_database;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    use super::*;
    use crate::ServiceConfig;

    #[tokio::test]
    async fn test_tier_table_fits_in_a_single_connection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reviewdesk.db");
        init_database(&path).await.unwrap().close().await;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(2))
            .connect_with(SqliteConnectOptions::new().filename(&path))
            .await
            .unwrap();
        let state = AppState::new(pool, ServiceConfig::default());

        let table = tier_table(&state).await.unwrap();
        assert_eq!(table.tiers.len(), 3);
        assert_eq!(table.total_bps, 1700);
        assert_eq!(table.max_levels, 5);
    }
}
