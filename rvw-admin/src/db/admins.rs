//! Admin account bootstrap

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::ApiResult;
use crate::security::{generate_password, hash_password};

/// Username of the account created on an empty database
pub const BOOTSTRAP_USERNAME: &str = "admin";

/// Length of a generated bootstrap password
const GENERATED_PASSWORD_LENGTH: usize = 20;

/// Create a `super_admin` when no admin exists yet
///
/// Uses `password` when given, otherwise generates one and logs it once.
/// Returns `true` when an account was created.
pub async fn ensure_bootstrap_admin(db: &SqlitePool, password: Option<String>) -> ApiResult<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
        .fetch_one(db)
        .await?;
    if existing > 0 {
        return Ok(false);
    }

    let (password, generated) = match password.filter(|p| !p.is_empty()) {
        Some(p) => (p, false),
        None => (generate_password(GENERATED_PASSWORD_LENGTH), true),
    };
    let password_hash = hash_password(&password)?;

    let created = sqlx::query(
        "INSERT OR IGNORE INTO admins (username, password_hash, role, is_active, created_at)
         VALUES (?, ?, 'super_admin', 1, ?)",
    )
    .bind(BOOTSTRAP_USERNAME)
    .bind(&password_hash)
    .bind(chrono::Utc::now())
    .execute(db)
    .await?;

    if created.rows_affected() == 0 {
        return Ok(false);
    }

    if generated {
        warn!(
            "Created initial super_admin '{}' with generated password: {}  (change it after first login)",
            BOOTSTRAP_USERNAME, password
        );
    } else {
        info!("Created initial super_admin '{}' from environment", BOOTSTRAP_USERNAME);
    }
    Ok(true)
}
