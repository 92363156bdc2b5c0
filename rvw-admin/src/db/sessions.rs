//! Admin session storage
//!
//! The client holds the raw token; only its SHA-256 is stored. Each session
//! carries its own CSRF token.

use chrono::{DateTime, Duration, Utc};
use rvw_common::db::AdminRole;
use serde::Serialize;
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use tracing::debug;

use crate::security::{generate_token, hash_token};

/// Session cookie name
pub const SESSION_COOKIE: &str = "rvw_session";

/// Header carrying the CSRF token on unsafe requests
pub const CSRF_HEADER: &str = "x-csrf-token";

/// The authenticated admin behind a request
#[derive(Debug, Clone, Serialize)]
pub struct CurrentAdmin {
    pub id: i64,
    pub username: String,
    pub role: AdminRole,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub token_hash: String,
}

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Raw token for the cookie; never stored
    pub token: String,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    token_hash: String,
    csrf_token: String,
    expires_at: DateTime<Utc>,
    admin_id: i64,
    username: String,
    role: AdminRole,
    is_active: bool,
}

/// Issue a session for `admin_id` valid for `ttl`
pub async fn create(db: &SqlitePool, admin_id: i64, ttl: Duration) -> sqlx::Result<NewSession> {
    let token = generate_token();
    let csrf_token = generate_token();
    let now = Utc::now();
    let expires_at = now + ttl;

    sqlx::query(
        "INSERT INTO admin_sessions (token_hash, admin_id, csrf_token, created_at, expires_at, last_seen_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(hash_token(&token))
    .bind(admin_id)
    .bind(&csrf_token)
    .bind(now)
    .bind(expires_at)
    .bind(now)
    .execute(db)
    .await?;

    Ok(NewSession {
        token,
        csrf_token,
        expires_at,
    })
}

/// Resolve a raw cookie token to its admin
///
/// Expired sessions are deleted and, like sessions of deactivated admins,
/// resolve to `None`.
pub async fn lookup(db: &SqlitePool, token: &str) -> sqlx::Result<Option<CurrentAdmin>> {
    let token_hash = hash_token(token);

    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT s.token_hash, s.csrf_token, s.expires_at, a.id AS admin_id, a.username, a.role, a.is_active
         FROM admin_sessions s
         JOIN admins a ON a.id = s.admin_id
         WHERE s.token_hash = ?",
    )
    .bind(&token_hash)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let now = Utc::now();
    if row.expires_at <= now {
        debug!("Session for admin {} expired at {}", row.admin_id, row.expires_at);
        revoke(db, &row.token_hash).await?;
        return Ok(None);
    }
    if !row.is_active {
        return Ok(None);
    }

    sqlx::query("UPDATE admin_sessions SET last_seen_at = ? WHERE token_hash = ?")
        .bind(now)
        .bind(&row.token_hash)
        .execute(db)
        .await?;

    Ok(Some(CurrentAdmin {
        id: row.admin_id,
        username: row.username,
        role: row.role,
        csrf_token: row.csrf_token,
        expires_at: row.expires_at,
        token_hash: row.token_hash,
    }))
}

/// Delete one session
pub async fn revoke<'e, E>(executor: E, token_hash: &str) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM admin_sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(executor)
        .await?;
    Ok(())
}

/// Delete every session of `admin_id` except `keep` (a token hash)
pub async fn revoke_all_for_admin<'e, E>(
    executor: E,
    admin_id: i64,
    keep: Option<&str>,
) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "DELETE FROM admin_sessions WHERE admin_id = ? AND (? IS NULL OR token_hash != ?)",
    )
    .bind(admin_id)
    .bind(keep)
    .bind(keep)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Drop sessions past their expiry; returns rows removed
pub async fn purge_expired(db: &SqlitePool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM admin_sessions WHERE datetime(expires_at) <= datetime(?)")
        .bind(Utc::now())
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
