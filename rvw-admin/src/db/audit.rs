//! Audit log writes
//!
//! Every mutating endpoint records one entry. Callers inside a transaction
//! pass `&mut *tx` so the entry commits or rolls back with the change.

use serde_json::Value;
use sqlx::{Executor, Sqlite};

/// Append one audit entry
pub async fn record<'e, E>(
    executor: E,
    admin_id: i64,
    action: &str,
    entity: &str,
    entity_id: Option<i64>,
    details: Value,
) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let details = if details.is_null() {
        None
    } else {
        Some(details.to_string())
    };

    sqlx::query(
        "INSERT INTO audit_log (admin_id, action, entity, entity_id, details, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(admin_id)
    .bind(action)
    .bind(entity)
    .bind(entity_id)
    .bind(details)
    .bind(chrono::Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}
