//! KYC document review

use axum::{extract::State, Extension};
use rvw_common::db::{DocumentStatus, DocumentType, KycDocument, KycStatus};
use serde::{Deserialize, Serialize};

use crate::db::sessions::CurrentAdmin;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{require, Permission};
use crate::services::kyc;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct KycFilter {
    pub status: Option<DocumentStatus>,
    pub document_type: Option<DocumentType>,
    pub user_id: Option<i64>,
}

/// GET /api/kyc
pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<KycFilter>,
) -> ApiResult<Json<Page<KycDocument>>> {
    let filters = Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("document_type", filter.document_type.map(|d| d.as_str()))
        .eq("user_id", filter.user_id)
        .search(&["document_number"], params.q.as_deref());
    let page = fetch_page(
        &state.db,
        "kyc_documents",
        &filters,
        &params,
        &["submitted_at", "id", "reviewed_at"],
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/kyc/:id
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<KycDocument>> {
    let document = sqlx::query_as::<_, KycDocument>("SELECT * FROM kyc_documents WHERE id = ?")
        .bind(document_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("KYC document {} not found", document_id)))?;
    Ok(Json(document))
}

#[derive(Debug, Serialize)]
pub struct KycDecision {
    pub document: KycDocument,
    pub user_kyc_status: KycStatus,
}

/// POST /api/kyc/:id/approve
pub async fn approve_document(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<KycDecision>> {
    require(admin.role, Permission::ReviewKyc)?;
    let (document, user_kyc_status) = kyc::approve_document(&state.db, document_id, admin.id).await?;
    Ok(Json(KycDecision {
        document,
        user_kyc_status,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RejectDocumentRequest {
    pub reason: String,
}

/// POST /api/kyc/:id/reject
pub async fn reject_document(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(document_id): Path<i64>,
    Json(body): Json<RejectDocumentRequest>,
) -> ApiResult<Json<KycDecision>> {
    require(admin.role, Permission::ReviewKyc)?;
    let (document, user_kyc_status) =
        kyc::reject_document(&state.db, document_id, admin.id, &body.reason).await?;
    Ok(Json(KycDecision {
        document,
        user_kyc_status,
    }))
}
