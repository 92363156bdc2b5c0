//! Task proof verification
//!
//! Manual approve/reject and the automated pass share one code path; the
//! automated pass only differs in setting `auto_verified` and choosing the
//! action from the proof's AI confidence.

use chrono::Utc;
use rvw_common::db::settings::{load_runtime_settings, RuntimeSettings};
use rvw_common::db::{Task, TaskStatus, TransactionSource, UserStatus};
use rvw_common::money::format_paise;
use serde::Serialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::db::{audit, notifications};
use crate::error::{ApiError, ApiResult};
use crate::services::ledger::{self, LedgerEntry};
use crate::services::proof_scorer::{ProofScorer, TaskProof};
use crate::services::referrals::{self, CommissionShare};

/// Largest batch one auto-verify call may examine
pub const MAX_AUTO_VERIFY_BATCH: i64 = 500;

/// Default batch size for auto-verify
pub const DEFAULT_AUTO_VERIFY_BATCH: i64 = 100;

/// Confidence cut-offs, from runtime settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub approve: f64,
    pub reject: f64,
}

impl From<&RuntimeSettings> for Thresholds {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            approve: settings.proof_auto_approve_threshold,
            reject: settings.proof_auto_reject_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofDecision {
    AutoApprove,
    AutoReject,
    ManualReview,
}

/// Classify a proof by its confidence
///
/// `confidence >= approve` approves, `confidence < reject` rejects, anything
/// else (including no score) is left for a human.
pub fn decide(confidence: Option<f64>, thresholds: &Thresholds) -> ProofDecision {
    match confidence {
        Some(c) if c >= thresholds.approve => ProofDecision::AutoApprove,
        Some(c) if c < thresholds.reject => ProofDecision::AutoReject,
        _ => ProofDecision::ManualReview,
    }
}

/// Rejection reason recorded for automated rejections
pub fn auto_reject_reason(confidence: f64) -> String {
    format!(
        "Proof failed automated verification (confidence {:.2})",
        confidence
    )
}

/// Result of approving one task
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub task_id: i64,
    pub user_id: i64,
    pub review_request_id: i64,
    pub reward_paise: i64,
    pub balance_after_paise: i64,
    pub request_completed: bool,
    pub commissions: Vec<CommissionShare>,
}

/// Explain why a task could not move out of `submitted`
async fn task_state_error(conn: &mut SqliteConnection, task_id: i64, action: &str) -> ApiError {
    let status: Result<Option<TaskStatus>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&mut *conn)
            .await;

    match status {
        Ok(None) => ApiError::NotFound(format!("Task {} not found", task_id)),
        Ok(Some(status)) => ApiError::Conflict(format!(
            "Task {} is {}; only submitted tasks can be {}",
            task_id, status, action
        )),
        Err(e) => e.into(),
    }
}

/// Approve a submitted task and pay it out
///
/// In one transaction: mark the task approved, take a slot on the review
/// request (completing it when full), credit the reward, pay referral
/// commissions, notify the worker and write the audit entry.
pub async fn approve_task(
    db: &SqlitePool,
    task_id: i64,
    admin_id: i64,
    auto: bool,
) -> ApiResult<ApprovalOutcome> {
    let mut tx = db.begin().await?;
    let now = Utc::now();

    let claimed: Option<(i64, i64)> = sqlx::query_as(
        "UPDATE tasks
         SET status = 'approved', reviewed_by = ?, reviewed_at = ?, auto_verified = ?,
             rejection_reason = NULL
         WHERE id = ? AND status = 'submitted'
         RETURNING review_request_id, user_id",
    )
    .bind(admin_id)
    .bind(now)
    .bind(auto)
    .bind(task_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((review_request_id, user_id)) = claimed else {
        return Err(task_state_error(&mut tx, task_id, "approved").await);
    };

    let slot: Option<(i64, String)> = sqlx::query_as(
        "UPDATE review_requests
         SET filled_slots = filled_slots + 1,
             status = CASE WHEN filled_slots + 1 >= total_slots THEN 'completed' ELSE status END,
             updated_at = ?
         WHERE id = ? AND status IN ('approved', 'paused') AND filled_slots < total_slots
         RETURNING reward_paise, status",
    )
    .bind(now)
    .bind(review_request_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((reward_paise, request_status)) = slot else {
        let current: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT status, filled_slots, total_slots FROM review_requests WHERE id = ?",
        )
        .bind(review_request_id)
        .fetch_optional(&mut *tx)
        .await?;
        return Err(match current {
            None => ApiError::NotFound(format!("Review request {} not found", review_request_id)),
            Some((_, filled, total)) if filled >= total => ApiError::Conflict(format!(
                "Review request {} has no open slots ({}/{})",
                review_request_id, filled, total
            )),
            Some((status, _, _)) => ApiError::Conflict(format!(
                "Review request {} is {}; tasks can only be approved while it is approved or paused",
                review_request_id, status
            )),
        });
    };
    let request_completed = request_status == "completed";

    let worker_status: Option<UserStatus> =
        sqlx::query_scalar("SELECT status FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    match worker_status {
        None => return Err(ApiError::NotFound(format!("User {} not found", user_id))),
        Some(UserStatus::Blocked) => {
            return Err(ApiError::Conflict(format!(
                "User {} is blocked; their tasks cannot be approved",
                user_id
            )))
        }
        Some(UserStatus::Active) => {}
    }

    let reference = format!("task:{}", task_id);
    let note = format!("Reward for review request #{}", review_request_id);
    let reward = ledger::credit(
        &mut tx,
        LedgerEntry {
            user_id,
            amount_paise: reward_paise,
            source: TransactionSource::TaskReward,
            reference: Some(&reference),
            note: Some(&note),
            created_by: Some(admin_id),
        },
    )
    .await?;

    let commissions = referrals::distribute(&mut tx, user_id, task_id, reward_paise).await?;

    notifications::notify(
        &mut *tx,
        user_id,
        "Task approved",
        &format!(
            "Your task #{} was approved. ₹{} has been added to your wallet.",
            task_id,
            format_paise(reward_paise)
        ),
    )
    .await?;

    audit::record(
        &mut *tx,
        admin_id,
        if auto { "task.auto_approve" } else { "task.approve" },
        "task",
        Some(task_id),
        json!({
            "reward_paise": reward_paise,
            "review_request_id": review_request_id,
            "request_completed": request_completed,
            "commissions": &commissions,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(
        admin_id,
        task_id,
        user_id,
        reward_paise,
        auto,
        commissions = commissions.len(),
        "Task approved"
    );

    Ok(ApprovalOutcome {
        task_id,
        user_id,
        review_request_id,
        reward_paise,
        balance_after_paise: reward.balance_after_paise,
        request_completed,
        commissions,
    })
}

/// Reject a submitted task with a reason shown to the worker
pub async fn reject_task(
    db: &SqlitePool,
    task_id: i64,
    admin_id: i64,
    reason: &str,
    auto: bool,
) -> ApiResult<Task> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApiError::BadRequest(
            "A rejection reason is required".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks
         SET status = 'rejected', rejection_reason = ?, reviewed_by = ?, reviewed_at = ?,
             auto_verified = ?
         WHERE id = ? AND status = 'submitted'
         RETURNING *",
    )
    .bind(reason)
    .bind(admin_id)
    .bind(Utc::now())
    .bind(auto)
    .bind(task_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(task) = task else {
        return Err(task_state_error(&mut tx, task_id, "rejected").await);
    };

    notifications::notify(
        &mut *tx,
        task.user_id,
        "Task rejected",
        &format!("Your task #{} was rejected: {}", task_id, reason),
    )
    .await?;

    audit::record(
        &mut *tx,
        admin_id,
        if auto { "task.auto_reject" } else { "task.reject" },
        "task",
        Some(task_id),
        json!({ "reason": reason, "ai_confidence": task.ai_confidence }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, task_id, auto, "Task rejected");
    Ok(task)
}

/// Ask `scorer` for a fresh confidence and store it on the task
pub async fn rescore_task(db: &SqlitePool, scorer: &dyn ProofScorer, task_id: i64) -> ApiResult<Task> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task {} not found", task_id)))?;

    if task.status != TaskStatus::Submitted {
        return Err(ApiError::Conflict(format!(
            "Task {} is {}; only submitted proofs can be scored",
            task_id, task.status
        )));
    }

    let confidence = scorer
        .score(&TaskProof {
            task_id,
            proof_url: task.proof_url.clone(),
            proof_text: task.proof_text.clone(),
        })
        .await
        .map_err(|e| ApiError::Upstream(format!("Proof scorer failed: {}", e)))?;

    // Decided while the scorer ran: leave the score it was decided on
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks SET ai_confidence = ? WHERE id = ? AND status = 'submitted' RETURNING *",
    )
    .bind(confidence)
    .bind(task_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| {
        ApiError::Conflict(format!(
            "Task {} was reviewed while it was being scored",
            task_id
        ))
    })?;

    Ok(task)
}

/// Per-task line of an auto-verify report
#[derive(Debug, Clone, Serialize)]
pub struct TaskDecision {
    pub task_id: i64,
    pub confidence: Option<f64>,
    pub decision: ProofDecision,
    /// Set when the decided action could not be applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one auto-verify run
#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoVerifyReport {
    pub examined: usize,
    pub approved: usize,
    pub rejected: usize,
    pub manual: usize,
    pub failed: usize,
    pub scored: usize,
    pub dry_run: bool,
    pub decisions: Vec<TaskDecision>,
}

/// Classify submitted tasks (oldest first) and apply the decisions
///
/// Unscored tasks are scored first when a scorer is available (not in a dry
/// run). A task whose approval fails is counted and the batch carries on.
pub async fn auto_verify(
    db: &SqlitePool,
    scorer: Option<&dyn ProofScorer>,
    admin_id: i64,
    limit: i64,
    dry_run: bool,
) -> ApiResult<AutoVerifyReport> {
    let settings = load_runtime_settings(db).await?;
    let thresholds = Thresholds::from(&settings);
    let limit = limit.clamp(1, MAX_AUTO_VERIFY_BATCH);

    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE status = 'submitted'
         ORDER BY submitted_at IS NULL, datetime(submitted_at), id
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(db)
    .await?;

    let mut report = AutoVerifyReport {
        dry_run,
        ..Default::default()
    };

    for task in tasks {
        report.examined += 1;
        let mut confidence = task.ai_confidence;

        if confidence.is_none() && !dry_run {
            if let Some(scorer) = scorer {
                match rescore_task(db, scorer, task.id).await {
                    Ok(scored) => {
                        confidence = scored.ai_confidence;
                        report.scored += 1;
                    }
                    Err(e) => warn!("Scoring task {} failed: {}", task.id, e),
                }
            }
        }

        let decision = decide(confidence, &thresholds);
        let applied: ApiResult<()> = match decision {
            ProofDecision::ManualReview => {
                report.manual += 1;
                Ok(())
            }
            _ if dry_run => {
                if decision == ProofDecision::AutoApprove {
                    report.approved += 1;
                } else {
                    report.rejected += 1;
                }
                Ok(())
            }
            ProofDecision::AutoApprove => approve_task(db, task.id, admin_id, true)
                .await
                .map(|_| report.approved += 1),
            ProofDecision::AutoReject => {
                let reason = auto_reject_reason(confidence.unwrap_or(0.0));
                reject_task(db, task.id, admin_id, &reason, true)
                    .await
                    .map(|_| report.rejected += 1)
            }
        };

        let error = match applied {
            Ok(()) => None,
            Err(e) => {
                warn!("Auto-verify could not apply {:?} to task {}: {}", decision, task.id, e);
                report.failed += 1;
                Some(e.to_string())
            }
        };

        report.decisions.push(TaskDecision {
            task_id: task.id,
            confidence,
            decision,
            error,
        });
    }

    if !dry_run {
        audit::record(
            db,
            admin_id,
            "task.auto_verify",
            "task",
            None,
            json!({
                "examined": report.examined,
                "approved": report.approved,
                "rejected": report.rejected,
                "manual": report.manual,
                "failed": report.failed,
                "scored": report.scored,
            }),
        )
        .await?;
    }

    info!(
        admin_id,
        examined = report.examined,
        approved = report.approved,
        rejected = report.rejected,
        manual = report.manual,
        failed = report.failed,
        dry_run,
        "Auto-verify finished"
    );

    Ok(report)
}
