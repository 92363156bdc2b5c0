//! Referral commissions
//!
//! When a task is approved, each referrer up the worker's `referred_by`
//! chain earns `reward * bps / 10000` (floored) of the reward for their tier
//! level. The chain is followed for as many levels as there are tiers.

use std::collections::HashSet;

use chrono::Utc;
use rvw_common::db::{ReferralTier, TransactionSource, UserStatus};
use rvw_common::money::{apply_bps, BPS_DENOMINATOR};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::services::ledger::{self, LedgerEntry};

/// A referrer above the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Referrer {
    pub user_id: i64,
    /// 1 = direct referrer of the worker
    pub level: i64,
    pub status: UserStatus,
}

/// One commission credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionShare {
    pub beneficiary_id: i64,
    pub level: i64,
    pub amount_paise: i64,
}

/// Compute credits for `chain`; blocked referrers and zero amounts get nothing
pub fn plan_commissions(
    reward_paise: i64,
    chain: &[Referrer],
    tiers: &[ReferralTier],
) -> Vec<CommissionShare> {
    chain
        .iter()
        .filter(|r| r.status == UserStatus::Active)
        .filter_map(|r| {
            let tier = tiers.iter().find(|t| t.level == r.level)?;
            let amount_paise = apply_bps(reward_paise, tier.commission_bps);
            (amount_paise > 0).then_some(CommissionShare {
                beneficiary_id: r.user_id,
                level: r.level,
                amount_paise,
            })
        })
        .collect()
}

/// Check a replacement tier table
///
/// Levels must run 1..=n with no gaps, n ≤ `max_levels`, each rate within
/// `0..=10000` bps and the rates summing to at most 10000 bps.
pub fn validate_tiers(tiers: &[ReferralTier], max_levels: i64) -> ApiResult<()> {
    if tiers.len() as i64 > max_levels {
        return Err(ApiError::BadRequest(format!(
            "At most {} referral levels are allowed, got {}",
            max_levels,
            tiers.len()
        )));
    }

    let mut sorted: Vec<&ReferralTier> = tiers.iter().collect();
    sorted.sort_by_key(|t| t.level);

    for (i, tier) in sorted.iter().enumerate() {
        let expected = i as i64 + 1;
        if tier.level != expected {
            return Err(ApiError::BadRequest(format!(
                "Referral levels must be contiguous from 1: expected level {}, found {}",
                expected, tier.level
            )));
        }
        if !(0..=BPS_DENOMINATOR).contains(&tier.commission_bps) {
            return Err(ApiError::BadRequest(format!(
                "Level {} commission {} bps is outside 0..={}",
                tier.level, tier.commission_bps, BPS_DENOMINATOR
            )));
        }
    }

    let total: i64 = tiers.iter().map(|t| t.commission_bps).sum();
    if total > BPS_DENOMINATOR {
        return Err(ApiError::BadRequest(format!(
            "Commission rates total {} bps, more than the whole reward ({} bps)",
            total, BPS_DENOMINATOR
        )));
    }

    Ok(())
}

/// Current tier table, lowest level first
pub async fn load_tiers(conn: &mut SqliteConnection) -> ApiResult<Vec<ReferralTier>> {
    let tiers = sqlx::query_as::<_, ReferralTier>(
        "SELECT level, commission_bps FROM referral_tiers ORDER BY level",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(tiers)
}

/// Walk `referred_by` upward from `user_id`, at most `max_levels` steps
///
/// Stops at the top of the chain or when a user repeats.
pub async fn load_upline(
    conn: &mut SqliteConnection,
    user_id: i64,
    max_levels: usize,
) -> ApiResult<Vec<Referrer>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([user_id]);

    let mut next = sqlx::query_scalar::<_, Option<i64>>("SELECT referred_by FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .flatten();

    while let Some(referrer_id) = next {
        if chain.len() >= max_levels {
            break;
        }
        if !seen.insert(referrer_id) {
            warn!(
                "Referral cycle at user {} while walking upline of user {}",
                referrer_id, user_id
            );
            break;
        }

        let row: Option<(UserStatus, Option<i64>)> =
            sqlx::query_as("SELECT status, referred_by FROM users WHERE id = ?")
                .bind(referrer_id)
                .fetch_optional(&mut *conn)
                .await?;
        let Some((status, referred_by)) = row else {
            break;
        };

        chain.push(Referrer {
            user_id: referrer_id,
            level: chain.len() as i64 + 1,
            status,
        });
        next = referred_by;
    }

    Ok(chain)
}

/// Credit commissions for an approved task on the caller's transaction
pub async fn distribute(
    conn: &mut SqliteConnection,
    worker_id: i64,
    task_id: i64,
    reward_paise: i64,
) -> ApiResult<Vec<CommissionShare>> {
    let tiers = load_tiers(conn).await?;
    if tiers.is_empty() {
        return Ok(Vec::new());
    }

    let chain = load_upline(conn, worker_id, tiers.len()).await?;
    let shares = plan_commissions(reward_paise, &chain, &tiers);

    let reference = format!("task:{}", task_id);
    for share in &shares {
        let note = format!("Level {} referral commission", share.level);
        ledger::credit(
            conn,
            LedgerEntry {
                user_id: share.beneficiary_id,
                amount_paise: share.amount_paise,
                source: TransactionSource::ReferralCommission,
                reference: Some(&reference),
                note: Some(&note),
                created_by: None,
            },
        )
        .await?;

        sqlx::query(
            "INSERT INTO referral_commissions
                (beneficiary_id, source_user_id, task_id, level, amount_paise, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(share.beneficiary_id)
        .bind(worker_id)
        .bind(task_id)
        .bind(share.level)
        .bind(share.amount_paise)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    }

    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> Vec<ReferralTier> {
        vec![
            ReferralTier { level: 1, commission_bps: 1000 },
            ReferralTier { level: 2, commission_bps: 500 },
            ReferralTier { level: 3, commission_bps: 200 },
        ]
    }

    fn referrer(user_id: i64, level: i64, status: UserStatus) -> Referrer {
        Referrer { user_id, level, status }
    }

    #[test]
    fn test_plan_floors_each_level() {
        let chain = [
            referrer(10, 1, UserStatus::Active),
            referrer(11, 2, UserStatus::Active),
            referrer(12, 3, UserStatus::Active),
        ];
        // 5 rupees 55 paise: 10% = 55.5 -> 55, 5% = 27.75 -> 27, 2% = 11.1 -> 11
        let shares = plan_commissions(555, &chain, &tiers());
        let amounts: Vec<i64> = shares.iter().map(|s| s.amount_paise).collect();
        assert_eq!(amounts, vec![55, 27, 11]);
    }

    #[test]
    fn test_plan_skips_blocked_but_pays_higher_levels() {
        let chain = [
            referrer(10, 1, UserStatus::Blocked),
            referrer(11, 2, UserStatus::Active),
        ];
        let shares = plan_commissions(10_000, &chain, &tiers());
        assert_eq!(
            shares,
            vec![CommissionShare { beneficiary_id: 11, level: 2, amount_paise: 500 }]
        );
    }

    #[test]
    fn test_plan_drops_zero_amounts() {
        let chain = [referrer(10, 1, UserStatus::Active), referrer(11, 2, UserStatus::Active)];
        // 9 paise: 10% = 0.9 -> 0, 5% -> 0
        assert!(plan_commissions(9, &chain, &tiers()).is_empty());
    }

    #[test]
    fn test_validate_tiers() {
        assert!(validate_tiers(&tiers(), 5).is_ok());
        assert!(validate_tiers(&[], 5).is_ok());
        assert!(validate_tiers(&tiers(), 2).is_err());

        let gap = [
            ReferralTier { level: 1, commission_bps: 100 },
            ReferralTier { level: 3, commission_bps: 100 },
        ];
        assert!(validate_tiers(&gap, 5).is_err());

        let too_much = [
            ReferralTier { level: 1, commission_bps: 6000 },
            ReferralTier { level: 2, commission_bps: 5000 },
        ];
        assert!(validate_tiers(&too_much, 5).is_err());

        let negative = [ReferralTier { level: 1, commission_bps: -1 }];
        assert!(validate_tiers(&negative, 5).is_err());
    }

    #[test]
    fn test_validate_tiers_accepts_unsorted_input() {
        let unsorted = [
            ReferralTier { level: 2, commission_bps: 500 },
            ReferralTier { level: 1, commission_bps: 1000 },
        ];
        assert!(validate_tiers(&unsorted, 5).is_ok());
    }
}
