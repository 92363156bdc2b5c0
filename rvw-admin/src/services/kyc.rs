//! KYC document review
//!
//! A user is `verified` once they hold an approved document of every type in
//! the `kyc_required_documents` setting.

use chrono::Utc;
use rvw_common::db::settings::load_runtime_settings;
use rvw_common::db::{DocumentStatus, DocumentType, KycDocument, KycStatus};
use rvw_common::validation::validate_document_number;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::db::{audit, notifications};
use crate::error::{ApiError, ApiResult};

/// User-level status implied by the approved document types
pub fn derive_kyc_status(approved: &[DocumentType], required: &[DocumentType]) -> KycStatus {
    if required.iter().all(|doc| approved.contains(doc)) {
        KycStatus::Verified
    } else {
        KycStatus::Pending
    }
}

async fn load_document(db: &SqlitePool, document_id: i64) -> ApiResult<KycDocument> {
    sqlx::query_as::<_, KycDocument>("SELECT * FROM kyc_documents WHERE id = ?")
        .bind(document_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("KYC document {} not found", document_id)))
}

fn require_pending(document: &KycDocument, action: &str) -> ApiResult<()> {
    if document.status != DocumentStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "KYC document {} is already {}; only pending documents can be {}",
            document.id, document.status, action
        )));
    }
    Ok(())
}

/// Claim a pending document for review; `None` if someone else got there first
async fn claim(
    conn: &mut SqliteConnection,
    document_id: i64,
    status: DocumentStatus,
    reason: Option<&str>,
    admin_id: i64,
) -> ApiResult<KycDocument> {
    sqlx::query_as::<_, KycDocument>(
        "UPDATE kyc_documents
         SET status = ?, rejection_reason = ?, reviewed_by = ?, reviewed_at = ?
         WHERE id = ? AND status = 'pending'
         RETURNING *",
    )
    .bind(status)
    .bind(reason)
    .bind(admin_id)
    .bind(Utc::now())
    .bind(document_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        ApiError::Conflict(format!(
            "KYC document {} was reviewed by someone else",
            document_id
        ))
    })
}

/// Approve a pending document and recompute the owner's KYC status
pub async fn approve_document(
    db: &SqlitePool,
    document_id: i64,
    admin_id: i64,
) -> ApiResult<(KycDocument, KycStatus)> {
    let document = load_document(db, document_id).await?;
    require_pending(&document, "approved")?;

    validate_document_number(document.document_type, &document.document_number).map_err(|_| {
        ApiError::BadRequest(format!(
            "'{}' is not a valid {}; reject the document instead",
            document.document_number,
            document.document_type.label()
        ))
    })?;

    let settings = load_runtime_settings(db).await?;

    let mut tx = db.begin().await?;
    let document = claim(&mut tx, document_id, DocumentStatus::Approved, None, admin_id).await?;

    let approved: Vec<DocumentType> = sqlx::query_scalar(
        "SELECT DISTINCT document_type FROM kyc_documents WHERE user_id = ? AND status = 'approved'",
    )
    .bind(document.user_id)
    .fetch_all(&mut *tx)
    .await?;
    let kyc_status = derive_kyc_status(&approved, &settings.kyc_required_documents);

    sqlx::query("UPDATE users SET kyc_status = ? WHERE id = ?")
        .bind(kyc_status)
        .bind(document.user_id)
        .execute(&mut *tx)
        .await?;

    let message = if kyc_status == KycStatus::Verified {
        format!(
            "Your {} was approved. Your KYC verification is complete.",
            document.document_type.label()
        )
    } else {
        format!(
            "Your {} was approved. Further documents are still required.",
            document.document_type.label()
        )
    };
    notifications::notify(&mut *tx, document.user_id, "KYC document approved", &message).await?;

    audit::record(
        &mut *tx,
        admin_id,
        "kyc.approve",
        "kyc_document",
        Some(document_id),
        json!({
            "user_id": document.user_id,
            "document_type": document.document_type,
            "kyc_status": kyc_status,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, document_id, user_id = document.user_id, %kyc_status, "KYC document approved");
    Ok((document, kyc_status))
}

/// Reject a pending document
///
/// The owner becomes `rejected` unless they are already verified.
pub async fn reject_document(
    db: &SqlitePool,
    document_id: i64,
    admin_id: i64,
    reason: &str,
) -> ApiResult<(KycDocument, KycStatus)> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApiError::BadRequest(
            "A rejection reason is required".to_string(),
        ));
    }

    let document = load_document(db, document_id).await?;
    require_pending(&document, "rejected")?;

    let mut tx = db.begin().await?;
    let document = claim(
        &mut tx,
        document_id,
        DocumentStatus::Rejected,
        Some(reason),
        admin_id,
    )
    .await?;

    let kyc_status: KycStatus = sqlx::query_scalar(
        "UPDATE users
         SET kyc_status = CASE WHEN kyc_status = 'verified' THEN kyc_status ELSE 'rejected' END
         WHERE id = ?
         RETURNING kyc_status",
    )
    .bind(document.user_id)
    .fetch_one(&mut *tx)
    .await?;

    notifications::notify(
        &mut *tx,
        document.user_id,
        "KYC document rejected",
        &format!(
            "Your {} was rejected: {}",
            document.document_type.label(),
            reason
        ),
    )
    .await?;

    audit::record(
        &mut *tx,
        admin_id,
        "kyc.reject",
        "kyc_document",
        Some(document_id),
        json!({
            "user_id": document.user_id,
            "document_type": document.document_type,
            "reason": reason,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(admin_id, document_id, user_id = document.user_id, "KYC document rejected");
    Ok((document, kyc_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verified_needs_every_required_type() {
        let required = [DocumentType::Pan, DocumentType::Aadhaar];
        assert_eq!(
            derive_kyc_status(&[DocumentType::Pan], &required),
            KycStatus::Pending
        );
        assert_eq!(
            derive_kyc_status(&[DocumentType::Aadhaar, DocumentType::Pan], &required),
            KycStatus::Verified
        );
        assert_eq!(
            derive_kyc_status(&[DocumentType::BankAccount], &required),
            KycStatus::Pending
        );
    }

    #[test]
    fn test_no_required_documents_verifies_on_first_approval() {
        assert_eq!(
            derive_kyc_status(&[DocumentType::BankAccount], &[]),
            KycStatus::Verified
        );
    }
}
