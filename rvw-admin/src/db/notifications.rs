//! In-app notifications delivered to marketplace users

use sqlx::{Executor, Sqlite};

/// Queue one notification for `user_id`
pub async fn notify<'e, E>(executor: E, user_id: i64, title: &str, message: &str) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO notifications (user_id, title, message, is_read, created_at)
         VALUES (?, ?, ?, 0, ?)",
    )
    .bind(user_id)
    .bind(title)
    .bind(message)
    .bind(chrono::Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

/// Queue the same notification for every active user; returns rows created
pub async fn broadcast<'e, E>(executor: E, title: &str, message: &str) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO notifications (user_id, title, message, is_read, created_at)
         SELECT id, ?, ?, 0, ? FROM users WHERE status = 'active'",
    )
    .bind(title)
    .bind(message)
    .bind(chrono::Utc::now())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
