//! Dashboard counters and activity series

use std::collections::HashMap;

use axum::extract::State;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub users_total: i64,
    pub users_blocked: i64,
    pub sellers_total: i64,
    pub sellers_unverified: i64,
    pub review_requests_pending: i64,
    pub tasks_submitted: i64,
    pub kyc_pending: i64,
    pub withdrawals_pending: i64,
    pub withdrawals_pending_paise: i64,
    /// Sum of all wallet balances
    pub wallet_liability_paise: i64,
    pub rewards_paid_today_paise: i64,
}

async fn scalar(db: &SqlitePool, sql: &str) -> ApiResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(db).await?)
}

/// GET /api/dashboard/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    let db = &state.db;

    Ok(Json(DashboardStats {
        users_total: scalar(db, "SELECT COUNT(*) FROM users").await?,
        users_blocked: scalar(db, "SELECT COUNT(*) FROM users WHERE status = 'blocked'").await?,
        sellers_total: scalar(db, "SELECT COUNT(*) FROM sellers").await?,
        sellers_unverified: scalar(db, "SELECT COUNT(*) FROM sellers WHERE is_verified = 0").await?,
        review_requests_pending: scalar(
            db,
            "SELECT COUNT(*) FROM review_requests WHERE status = 'pending'",
        )
        .await?,
        tasks_submitted: scalar(db, "SELECT COUNT(*) FROM tasks WHERE status = 'submitted'").await?,
        kyc_pending: scalar(db, "SELECT COUNT(*) FROM kyc_documents WHERE status = 'pending'")
            .await?,
        withdrawals_pending: scalar(
            db,
            "SELECT COUNT(*) FROM withdrawal_requests WHERE status = 'pending'",
        )
        .await?,
        withdrawals_pending_paise: scalar(
            db,
            "SELECT COALESCE(SUM(amount_paise), 0) FROM withdrawal_requests WHERE status = 'pending'",
        )
        .await?,
        wallet_liability_paise: scalar(db, "SELECT COALESCE(SUM(wallet_balance_paise), 0) FROM users")
            .await?,
        rewards_paid_today_paise: scalar(
            db,
            "SELECT COALESCE(SUM(amount_paise), 0) FROM wallet_transactions
             WHERE source = 'task_reward' AND date(created_at) = date('now')",
        )
        .await?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub new_users: i64,
    pub approved_tasks: i64,
    pub rewards_paid_paise: i64,
}

/// Daily buckets from `start` through `end`, missing days filled with zero
fn fill_days(
    start: NaiveDate,
    end: NaiveDate,
    users: &HashMap<NaiveDate, i64>,
    tasks: &HashMap<NaiveDate, i64>,
    rewards: &HashMap<NaiveDate, i64>,
) -> Vec<ChartPoint> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| ChartPoint {
            date,
            new_users: users.get(&date).copied().unwrap_or(0),
            approved_tasks: tasks.get(&date).copied().unwrap_or(0),
            rewards_paid_paise: rewards.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

async fn daily(db: &SqlitePool, sql: &str, start: NaiveDate) -> ApiResult<HashMap<NaiveDate, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql)
        .bind(start.format("%Y-%m-%d").to_string())
        .fetch_all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(day, value)| {
            NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .ok()
                .map(|d| (d, value))
        })
        .collect())
}

/// GET /api/dashboard/chart?days=N
///
/// One entry per UTC day, oldest first, `N` in 1..=90 (default 7).
pub async fn chart(
    State(state): State<AppState>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<Vec<ChartPoint>>> {
    let days = query.days.unwrap_or(7);
    if !(1..=90).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and 90, got {}",
            days
        )));
    }

    let end = Utc::now().date_naive();
    let start = end - Duration::days(days - 1);

    let users = daily(
        &state.db,
        "SELECT date(created_at) AS day, COUNT(*) FROM users
         WHERE date(created_at) >= ? GROUP BY day",
        start,
    )
    .await?;
    let tasks = daily(
        &state.db,
        "SELECT date(reviewed_at) AS day, COUNT(*) FROM tasks
         WHERE status = 'approved' AND date(reviewed_at) >= ? GROUP BY day",
        start,
    )
    .await?;
    let rewards = daily(
        &state.db,
        "SELECT date(created_at) AS day, SUM(amount_paise) FROM wallet_transactions
         WHERE source = 'task_reward' AND date(created_at) >= ? GROUP BY day",
        start,
    )
    .await?;

    Ok(Json(fill_days(start, end, &users, &tasks, &rewards)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_days_includes_empty_days() {
        let start = NaiveDate::from_ymd_opt(2026, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let users = HashMap::from([(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), 4)]);
        let rewards = HashMap::from([(start, 2500)]);

        let points = fill_days(start, end, &users, &HashMap::new(), &rewards);

        // 2026 is not a leap year: Feb 27, Feb 28, Mar 1, Mar 2
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].rewards_paid_paise, 2500);
        assert_eq!(points[1].new_users, 0);
        assert_eq!(points[2].date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(points[2].new_users, 4);
        assert_eq!(points[3].approved_tasks, 0);
    }
}
