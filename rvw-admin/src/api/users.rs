//! Marketplace users: listing, blocking, wallet adjustments and downlines

use std::collections::{HashMap, HashSet};

use axum::{extract::State, Extension};
use chrono::{DateTime, Utc};
use rvw_common::db::{KycStatus, TransactionSource, User, UserStatus, WalletTransaction};
use rvw_common::money::format_paise;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::api::{optional_text, required_text};
use crate::db::sessions::CurrentAdmin;
use crate::db::{audit, notifications};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::services::ledger::{self, LedgerEntry};
use crate::AppState;

pub const USER_SORTABLE: &[&str] = &["created_at", "id", "name", "email", "wallet_balance_paise"];

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    pub kyc_status: Option<KycStatus>,
}

pub fn user_filters(params: &ListParams, filter: &UserFilter) -> Filters {
    Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("kyc_status", filter.kyc_status.map(|s| s.as_str()))
        .search(&["name", "email", "phone", "referral_code"], params.q.as_deref())
}

pub(crate) async fn load_user(db: &SqlitePool, user_id: i64) -> ApiResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Json<Page<User>>> {
    let filters = user_filters(&params, &filter);
    let page = fetch_page(&state.db, "users", &filters, &params, USER_SORTABLE).await?;
    Ok(Json(page))
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub task_counts: HashMap<String, i64>,
    pub direct_referrals: i64,
    pub commission_earned_paise: i64,
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserDetail>> {
    let user = load_user(&state.db, user_id).await?;

    let counts: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM tasks WHERE user_id = ? GROUP BY status")
            .bind(user_id)
            .fetch_all(&state.db)
            .await?;

    let direct_referrals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE referred_by = ?")
        .bind(user_id)
        .fetch_one(&state.db)
        .await?;

    let commission_earned_paise: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_paise), 0) FROM referral_commissions WHERE beneficiary_id = ?",
    )
    .bind(user_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(UserDetail {
        user,
        task_counts: counts.into_iter().collect(),
        direct_referrals,
        commission_earned_paise,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: UserStatus,
    pub reason: Option<String>,
}

/// POST /api/users/:id/status
///
/// Blocking needs a reason; unblocking clears it.
pub async fn set_status(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(user_id): Path<i64>,
    Json(body): Json<SetStatusRequest>,
) -> ApiResult<Json<User>> {
    require(admin.role, Permission::ManageUsers)?;

    let reason = optional_text(body.reason.as_deref());
    if body.status == UserStatus::Blocked && reason.is_none() {
        return Err(ApiError::BadRequest(
            "A reason is required to block a user".to_string(),
        ));
    }
    let reason = if body.status == UserStatus::Blocked { reason } else { None };

    let mut tx = state.db.begin().await?;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET status = ?, blocked_reason = ? WHERE id = ? RETURNING *",
    )
    .bind(body.status)
    .bind(&reason)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))?;

    audit::record(
        &mut *tx,
        admin.id,
        if body.status == UserStatus::Blocked { "user.block" } else { "user.unblock" },
        "user",
        Some(user_id),
        json!({ "reason": reason }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id = admin.id, user_id, status = %body.status, "User status changed");
    Ok(Json(user))
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Deserialize)]
pub struct AdjustWalletRequest {
    pub direction: Direction,
    pub amount_paise: i64,
    pub note: String,
}

/// POST /api/users/:id/wallet
///
/// Manual credit or debit, applied as one ledger entry.
pub async fn adjust_wallet(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(user_id): Path<i64>,
    Json(body): Json<AdjustWalletRequest>,
) -> ApiResult<Json<WalletTransaction>> {
    require(admin.role, Permission::ManageFinance)?;

    if body.amount_paise <= 0 {
        return Err(ApiError::BadRequest(
            "amount_paise must be greater than zero".to_string(),
        ));
    }
    let note = required_text(&body.note, "note")?;
    let reference = format!("admin:{}", admin.id);

    let mut tx = state.db.begin().await?;

    let entry = LedgerEntry {
        user_id,
        amount_paise: body.amount_paise,
        source: TransactionSource::AdminAdjustment,
        reference: Some(&reference),
        note: Some(&note),
        created_by: Some(admin.id),
    };
    let transaction = match body.direction {
        Direction::Credit => ledger::credit(&mut tx, entry).await?,
        Direction::Debit => ledger::debit(&mut tx, entry).await?,
    };

    let verb = match body.direction {
        Direction::Credit => "credited to",
        Direction::Debit => "debited from",
    };
    notifications::notify(
        &mut *tx,
        user_id,
        "Wallet adjusted",
        &format!(
            "₹{} was {} your wallet: {}",
            format_paise(body.amount_paise),
            verb,
            note
        ),
    )
    .await?;

    audit::record(
        &mut *tx,
        admin.id,
        match body.direction {
            Direction::Credit => "wallet.credit",
            Direction::Debit => "wallet.debit",
        },
        "user",
        Some(user_id),
        json!({
            "amount_paise": body.amount_paise,
            "balance_after_paise": transaction.balance_after_paise,
            "note": note,
            "transaction_id": transaction.id,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(
        admin_id = admin.id,
        user_id,
        amount_paise = transaction.amount_paise,
        "Wallet adjusted"
    );
    Ok(Json(transaction))
}

/// GET /api/users/:id/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<WalletTransaction>>> {
    load_user(&state.db, user_id).await?;
    let filters = Filters::new().eq("user_id", Some(user_id));
    let page = fetch_page(
        &state.db,
        "wallet_transactions",
        &filters,
        &params,
        &["created_at", "id", "amount_paise"],
    )
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct ReferralQuery {
    pub depth: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DownlineUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub status: UserStatus,
    pub referred_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReferralNode {
    #[serde(flatten)]
    pub user: DownlineUser,
    pub level: i64,
    pub children: Vec<ReferralNode>,
}

#[derive(Debug, Serialize)]
pub struct ReferralTree {
    pub user_id: i64,
    pub depth: i64,
    pub total: usize,
    pub per_level: Vec<usize>,
    pub referrals: Vec<ReferralNode>,
}

fn build_nodes(
    parent: i64,
    level: i64,
    by_parent: &mut HashMap<i64, Vec<DownlineUser>>,
) -> Vec<ReferralNode> {
    let children = by_parent.remove(&parent).unwrap_or_default();
    children
        .into_iter()
        .map(|user| {
            let id = user.id;
            ReferralNode {
                user,
                level,
                children: build_nodes(id, level + 1, by_parent),
            }
        })
        .collect()
}

/// GET /api/users/:id/referrals?depth=N
///
/// Downline of the user, `N` levels deep (1..=5, default 3).
pub async fn referral_tree(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<ReferralQuery>,
) -> ApiResult<Json<ReferralTree>> {
    let depth = query.depth.unwrap_or(3);
    if !(1..=5).contains(&depth) {
        return Err(ApiError::BadRequest(format!(
            "depth must be between 1 and 5, got {}",
            depth
        )));
    }
    load_user(&state.db, user_id).await?;

    let mut seen = HashSet::from([user_id]);
    let mut frontier = vec![user_id];
    let mut by_parent: HashMap<i64, Vec<DownlineUser>> = HashMap::new();
    let mut per_level = Vec::new();

    for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, email, status, referred_by, created_at FROM users WHERE referred_by IN (",
        );
        let mut ids = query.separated(", ");
        for id in &frontier {
            ids.push_bind(*id);
        }
        query.push(") ORDER BY id");
        let rows: Vec<DownlineUser> = query.build_query_as().fetch_all(&state.db).await?;

        let mut next = Vec::new();
        for row in rows {
            if !seen.insert(row.id) {
                continue;
            }
            next.push(row.id);
            if let Some(parent) = row.referred_by {
                by_parent.entry(parent).or_default().push(row);
            }
        }
        per_level.push(next.len());
        frontier = next;
    }

    let total = per_level.iter().sum();
    let referrals = build_nodes(user_id, 1, &mut by_parent);

    Ok(Json(ReferralTree {
        user_id,
        depth,
        total,
        per_level,
        referrals,
    }))
}
