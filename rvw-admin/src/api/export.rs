//! CSV export of filtered lists
//!
//! Each entity accepts the same filter, search and sort parameters as its
//! list endpoint. Pagination is ignored and output stops at
//! [`MAX_EXPORT_ROWS`].

use axum::{
    extract::State,
    http::{header, Uri},
    response::{IntoResponse, Response},
    Extension,
};
use chrono::Utc;
use rvw_common::db::{Seller, Task, User, WalletTransaction, WithdrawalRequest};
use serde::de::DeserializeOwned;
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use crate::api::sellers::{seller_filters, SellerFilter, SELLER_SORTABLE};
use crate::api::tasks::{task_filters, TaskFilter, TASK_SORTABLE};
use crate::api::users::{user_filters, UserFilter, USER_SORTABLE};
use crate::api::wallet::{transaction_filters, TransactionFilter, TRANSACTION_SORTABLE};
use crate::api::withdrawals::{withdrawal_filters, WithdrawalFilter, WITHDRAWAL_SORTABLE};
use crate::csv_export::{render, CsvRow, MAX_EXPORT_ROWS};
use crate::db::audit;
use crate::db::sessions::CurrentAdmin;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Path, Query};
use crate::listing::{fetch_all, order_clause, Filters, ListParams};
use crate::security::{require, Permission};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportEntity {
    Users,
    Sellers,
    Tasks,
    Transactions,
    Withdrawals,
}

impl ExportEntity {
    pub const ALL: &'static [ExportEntity] = &[
        ExportEntity::Users,
        ExportEntity::Sellers,
        ExportEntity::Tasks,
        ExportEntity::Transactions,
        ExportEntity::Withdrawals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportEntity::Users => "users",
            ExportEntity::Sellers => "sellers",
            ExportEntity::Tasks => "tasks",
            ExportEntity::Transactions => "transactions",
            ExportEntity::Withdrawals => "withdrawals",
        }
    }

    fn parse(raw: &str) -> ApiResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == raw)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|e| e.as_str()).collect();
                ApiError::NotFound(format!(
                    "Unknown export '{}'. Available: {}",
                    raw,
                    names.join(", ")
                ))
            })
    }
}

/// Entity filter struct parsed from the same query string as [`ListParams`]
fn entity_query<T: DeserializeOwned>(uri: &Uri) -> ApiResult<T> {
    axum::extract::Query::<T>::try_from_uri(uri)
        .map(|axum::extract::Query(v)| v)
        .map_err(ApiError::from)
}

async fn rows_csv<T>(
    db: &SqlitePool,
    table: &'static str,
    filters: &Filters,
    params: &ListParams,
    sortable: &[&'static str],
) -> ApiResult<(String, usize)>
where
    T: CsvRow + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let order_by = order_clause(params.sort.as_deref(), params.order.as_deref(), sortable)?;
    let rows: Vec<T> = fetch_all(db, table, filters, &order_by, MAX_EXPORT_ROWS).await?;
    Ok((render(&rows), rows.len()))
}

/// GET /api/export/:entity
pub async fn export_csv(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(entity): Path<String>,
    Query(params): Query<ListParams>,
    uri: Uri,
) -> ApiResult<Response> {
    require(admin.role, Permission::ExportData)?;
    let entity = ExportEntity::parse(&entity)?;
    let db = &state.db;

    let (body, rows) = match entity {
        ExportEntity::Users => {
            let filter: UserFilter = entity_query(&uri)?;
            let filters = user_filters(&params, &filter);
            rows_csv::<User>(db, "users", &filters, &params, USER_SORTABLE).await?
        }
        ExportEntity::Sellers => {
            let filter: SellerFilter = entity_query(&uri)?;
            let filters = seller_filters(&params, &filter);
            rows_csv::<Seller>(db, "sellers", &filters, &params, SELLER_SORTABLE).await?
        }
        ExportEntity::Tasks => {
            let filter: TaskFilter = entity_query(&uri)?;
            let filters = task_filters(&params, &filter);
            rows_csv::<Task>(db, "tasks", &filters, &params, TASK_SORTABLE).await?
        }
        ExportEntity::Transactions => {
            let filter: TransactionFilter = entity_query(&uri)?;
            let filters = transaction_filters(&params, &filter)?;
            rows_csv::<WalletTransaction>(
                db,
                "wallet_transactions",
                &filters,
                &params,
                TRANSACTION_SORTABLE,
            )
            .await?
        }
        ExportEntity::Withdrawals => {
            let filter: WithdrawalFilter = entity_query(&uri)?;
            let filters = withdrawal_filters(&params, &filter);
            rows_csv::<WithdrawalRequest>(
                db,
                "withdrawal_requests",
                &filters,
                &params,
                WITHDRAWAL_SORTABLE,
            )
            .await?
        }
    };

    audit::record(
        db,
        admin.id,
        &format!("export.{}", entity.as_str()),
        "export",
        None,
        json!({ "rows": rows, "query": uri.query() }),
    )
    .await?;

    let filename = format!("{}-{}.csv", entity.as_str(), Utc::now().format("%Y%m%d"));
    info!(admin_id = admin.id, entity = entity.as_str(), rows, "CSV export");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_entities() {
        for entity in ExportEntity::ALL {
            assert_eq!(ExportEntity::parse(entity.as_str()).unwrap(), *entity);
        }
    }

    #[test]
    fn test_unknown_entity_lists_available() {
        match ExportEntity::parse("admins") {
            Err(ApiError::NotFound(msg)) => assert!(msg.contains("withdrawals")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_entity_query_reads_filter_fields() {
        let uri: Uri = "/api/export/users?page=2&status=blocked&kyc_status=verified"
            .parse()
            .unwrap();
        let filter: UserFilter = entity_query(&uri).unwrap();
        assert_eq!(filter.status, Some(rvw_common::db::UserStatus::Blocked));

        let bad: Uri = "/api/export/users?status=frozen".parse().unwrap();
        assert!(entity_query::<UserFilter>(&bad).is_err());
    }
}
