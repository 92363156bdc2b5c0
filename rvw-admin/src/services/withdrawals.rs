//! Withdrawal processing
//!
//! pending -> approved -> paid, or pending -> rejected. The wallet is debited
//! when the request is approved.

use chrono::Utc;
use rvw_common::db::settings::load_runtime_settings;
use rvw_common::db::{KycStatus, TransactionSource, WithdrawalRequest, WithdrawalStatus};
use rvw_common::money::format_paise;
use rvw_common::validation::validate_payout_account;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::db::{audit, notifications};
use crate::error::{ApiError, ApiResult};
use crate::services::ledger::{self, LedgerEntry};

async fn state_error(
    conn: &mut SqliteConnection,
    withdrawal_id: i64,
    expected: WithdrawalStatus,
    action: &str,
) -> ApiError {
    let status: Result<Option<WithdrawalStatus>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM withdrawal_requests WHERE id = ?")
            .bind(withdrawal_id)
            .fetch_optional(&mut *conn)
            .await;

    match status {
        Ok(None) => ApiError::NotFound(format!("Withdrawal {} not found", withdrawal_id)),
        Ok(Some(status)) => ApiError::Conflict(format!(
            "Withdrawal {} is {}; only {} requests can be {}",
            withdrawal_id, status, expected, action
        )),
        Err(e) => e.into(),
    }
}

/// Approve a pending withdrawal and debit the wallet
pub async fn approve(db: &SqlitePool, withdrawal_id: i64, admin_id: i64) -> ApiResult<WithdrawalRequest> {
    let settings = load_runtime_settings(db).await?;

    let mut tx = db.begin().await?;

    let request = sqlx::query_as::<_, WithdrawalRequest>(
        "UPDATE withdrawal_requests
         SET status = 'approved', processed_by = ?, processed_at = ?
         WHERE id = ? AND status = 'pending'
         RETURNING *",
    )
    .bind(admin_id)
    .bind(Utc::now())
    .bind(withdrawal_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(request) = request else {
        return Err(state_error(&mut tx, withdrawal_id, WithdrawalStatus::Pending, "approved").await);
    };

    if request.amount_paise < settings.withdrawal_min_paise {
        return Err(ApiError::Conflict(format!(
            "Withdrawal of ₹{} is below the minimum of ₹{}",
            format_paise(request.amount_paise),
            format_paise(settings.withdrawal_min_paise)
        )));
    }

    validate_payout_account(request.method, &request.account_details).map_err(|_| {
        ApiError::BadRequest(format!(
            "Withdrawal {} has invalid {} account details; reject it instead",
            withdrawal_id, request.method
        ))
    })?;

    if settings.withdrawal_requires_kyc {
        let kyc_status: KycStatus = sqlx::query_scalar("SELECT kyc_status FROM users WHERE id = ?")
            .bind(request.user_id)
            .fetch_one(&mut *tx)
            .await?;
        if kyc_status != KycStatus::Verified {
            return Err(ApiError::Conflict(format!(
                "User {} has KYC status '{}'; withdrawals require verified KYC",
                request.user_id, kyc_status
            )));
        }
    }

    let reference = format!("withdrawal:{}", withdrawal_id);
    let note = format!("Withdrawal via {}", request.method);
    let debit = ledger::debit(
        &mut tx,
        LedgerEntry {
            user_id: request.user_id,
            amount_paise: request.amount_paise,
            source: TransactionSource::Withdrawal,
            reference: Some(&reference),
            note: Some(&note),
            created_by: Some(admin_id),
        },
    )
    .await?;

    notifications::notify(
        &mut *tx,
        request.user_id,
        "Withdrawal approved",
        &format!(
            "Your withdrawal of ₹{} was approved and will be paid out shortly.",
            format_paise(request.amount_paise)
        ),
    )
    .await?;

    audit::record(
        &mut *tx,
        admin_id,
        "withdrawal.approve",
        "withdrawal",
        Some(withdrawal_id),
        json!({
            "user_id": request.user_id,
            "amount_paise": request.amount_paise,
            "balance_after_paise": debit.balance_after_paise,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, withdrawal_id, amount_paise = request.amount_paise, "Withdrawal approved");
    Ok(request)
}

/// Reject a pending withdrawal; the wallet is untouched
pub async fn reject(
    db: &SqlitePool,
    withdrawal_id: i64,
    admin_id: i64,
    reason: &str,
) -> ApiResult<WithdrawalRequest> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApiError::BadRequest(
            "A rejection reason is required".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    let request = sqlx::query_as::<_, WithdrawalRequest>(
        "UPDATE withdrawal_requests
         SET status = 'rejected', rejection_reason = ?, processed_by = ?, processed_at = ?
         WHERE id = ? AND status = 'pending'
         RETURNING *",
    )
    .bind(reason)
    .bind(admin_id)
    .bind(Utc::now())
    .bind(withdrawal_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(request) = request else {
        return Err(state_error(&mut tx, withdrawal_id, WithdrawalStatus::Pending, "rejected").await);
    };

    notifications::notify(
        &mut *tx,
        request.user_id,
        "Withdrawal rejected",
        &format!(
            "Your withdrawal of ₹{} was rejected: {}",
            format_paise(request.amount_paise),
            reason
        ),
    )
    .await?;

    audit::record(
        &mut *tx,
        admin_id,
        "withdrawal.reject",
        "withdrawal",
        Some(withdrawal_id),
        json!({ "user_id": request.user_id, "reason": reason }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, withdrawal_id, "Withdrawal rejected");
    Ok(request)
}

/// Record the payout of an approved withdrawal
pub async fn mark_paid(
    db: &SqlitePool,
    withdrawal_id: i64,
    admin_id: i64,
    payout_reference: &str,
) -> ApiResult<WithdrawalRequest> {
    let payout_reference = payout_reference.trim();
    if payout_reference.is_empty() {
        return Err(ApiError::BadRequest(
            "A payout reference is required".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    let request = sqlx::query_as::<_, WithdrawalRequest>(
        "UPDATE withdrawal_requests
         SET status = 'paid', payout_reference = ?, processed_by = ?, processed_at = ?
         WHERE id = ? AND status = 'approved'
         RETURNING *",
    )
    .bind(payout_reference)
    .bind(admin_id)
    .bind(Utc::now())
    .bind(withdrawal_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(request) = request else {
        return Err(
            state_error(&mut tx, withdrawal_id, WithdrawalStatus::Approved, "marked paid").await,
        );
    };

    notifications::notify(
        &mut *tx,
        request.user_id,
        "Withdrawal paid",
        &format!(
            "₹{} has been sent to you (reference {}).",
            format_paise(request.amount_paise),
            payout_reference
        ),
    )
    .await?;

    audit::record(
        &mut *tx,
        admin_id,
        "withdrawal.mark_paid",
        "withdrawal",
        Some(withdrawal_id),
        json!({ "user_id": request.user_id, "payout_reference": payout_reference }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, withdrawal_id, "Withdrawal marked paid");
    Ok(request)
}
