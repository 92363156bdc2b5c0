//! Wallet ledger
//!
//! Every balance change is one `wallet_transactions` row plus the matching
//! `users.wallet_balance_paise` update, made on the caller's transaction.
//! For each user the balance equals the sum of their ledger amounts and
//! never goes negative. Dropping the transaction without commit undoes both.

use chrono::Utc;
use rvw_common::db::{TransactionSource, WalletTransaction};
use rvw_common::money::format_paise;
use sqlx::SqliteConnection;

use crate::error::{ApiError, ApiResult};

/// One ledger movement; `amount_paise` is always positive here
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub user_id: i64,
    pub amount_paise: i64,
    pub source: TransactionSource,
    pub reference: Option<&'a str>,
    pub note: Option<&'a str>,
    pub created_by: Option<i64>,
}

/// Add `entry.amount_paise` to the user's wallet
pub async fn credit(conn: &mut SqliteConnection, entry: LedgerEntry<'_>) -> ApiResult<WalletTransaction> {
    apply(conn, entry, 1).await
}

/// Remove `entry.amount_paise` from the user's wallet
///
/// Fails with Conflict when the balance would go negative.
pub async fn debit(conn: &mut SqliteConnection, entry: LedgerEntry<'_>) -> ApiResult<WalletTransaction> {
    apply(conn, entry, -1).await
}

async fn apply(
    conn: &mut SqliteConnection,
    entry: LedgerEntry<'_>,
    sign: i64,
) -> ApiResult<WalletTransaction> {
    if entry.amount_paise <= 0 {
        return Err(ApiError::BadRequest(
            "Amount must be greater than zero".to_string(),
        ));
    }
    let delta = entry
        .amount_paise
        .checked_mul(sign)
        .ok_or_else(|| ApiError::BadRequest("Amount is too large".to_string()))?;

    // Write first so the transaction holds the write lock before anything
    // else reads the balance.
    let balance_after: Option<i64> = sqlx::query_scalar(
        "UPDATE users SET wallet_balance_paise = wallet_balance_paise + ?
         WHERE id = ? AND wallet_balance_paise + ? >= 0
         RETURNING wallet_balance_paise",
    )
    .bind(delta)
    .bind(entry.user_id)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;

    let balance_after = match balance_after {
        Some(balance) => balance,
        None => {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT wallet_balance_paise FROM users WHERE id = ?")
                    .bind(entry.user_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            return Err(match current {
                None => ApiError::NotFound(format!("User {} not found", entry.user_id)),
                Some(balance) => ApiError::Conflict(format!(
                    "Insufficient balance: wallet holds ₹{}, debit of ₹{} requested",
                    format_paise(balance),
                    format_paise(entry.amount_paise)
                )),
            });
        }
    };

    let transaction = sqlx::query_as::<_, WalletTransaction>(
        "INSERT INTO wallet_transactions
            (user_id, amount_paise, balance_after_paise, source, reference, note, created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(entry.user_id)
    .bind(delta)
    .bind(balance_after)
    .bind(entry.source)
    .bind(entry.reference)
    .bind(entry.note)
    .bind(entry.created_by)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(
        user_id = entry.user_id,
        amount_paise = delta,
        balance_after_paise = balance_after,
        source = %entry.source,
        "Wallet ledger entry written"
    );

    Ok(transaction)
}
