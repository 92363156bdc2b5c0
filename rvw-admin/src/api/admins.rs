//! Admin account management

use axum::{extract::State, Extension};
use chrono::Utc;
use rvw_common::db::{Admin, AdminRole};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::db::sessions::{self, CurrentAdmin};
use crate::db::audit;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::listing::{fetch_page, Filters, ListParams};
use crate::pagination::Page;
use crate::security::{hash_password, require, Permission};
use crate::AppState;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;

/// Lowercased username, or an error naming the rule it breaks
fn normalize_username(raw: &str) -> ApiResult<String> {
    let username = raw.trim().to_lowercase();
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ApiError::BadRequest(format!(
            "username must be {} to {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ApiError::BadRequest(
            "username may contain only letters, digits, '_', '.' and '-'".to_string(),
        ));
    }
    Ok(username)
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminFilter {
    pub role: Option<AdminRole>,
    pub is_active: Option<bool>,
}

/// GET /api/admins
pub async fn list_admins(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Query(params): Query<ListParams>,
    Query(filter): Query<AdminFilter>,
) -> ApiResult<Json<Page<Admin>>> {
    require(admin.role, Permission::ManageAdmins)?;
    let filters = Filters::new()
        .eq("role", filter.role.map(|r| r.as_str()))
        .eq("is_active", filter.is_active)
        .search(&["username"], params.q.as_deref());
    let page = fetch_page(
        &state.db,
        "admins",
        &filters,
        &params,
        &["created_at", "id", "username", "last_login_at"],
    )
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    pub role: AdminRole,
}

/// POST /api/admins
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Json(body): Json<CreateAdminRequest>,
) -> ApiResult<Json<Admin>> {
    require(admin.role, Permission::ManageAdmins)?;
    let username = normalize_username(&body.username)?;
    let password_hash = hash_password(&body.password)?;

    let mut tx = state.db.begin().await?;
    let created = sqlx::query_as::<_, Admin>(
        "INSERT INTO admins (username, password_hash, role, is_active, created_at)
         VALUES (?, ?, ?, 1, ?)
         RETURNING *",
    )
    .bind(&username)
    .bind(&password_hash)
    .bind(body.role)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::Conflict(format!("Admin '{}' already exists", username))
        }
        _ => e.into(),
    })?;

    audit::record(
        &mut *tx,
        admin.id,
        "admin.create",
        "admin",
        Some(created.id),
        json!({ "username": created.username, "role": created.role }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, new_admin = %created.username, role = %created.role, "Admin created");
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct AdminStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct AdminStatusResult {
    pub admin: Admin,
    pub sessions_revoked: u64,
}

/// POST /api/admins/:id/status
///
/// Deactivation revokes every session of the target admin.
pub async fn set_status(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(admin_id): Path<i64>,
    Json(body): Json<AdminStatusRequest>,
) -> ApiResult<Json<AdminStatusResult>> {
    require(admin.role, Permission::ManageAdmins)?;
    if admin_id == admin.id && !body.is_active {
        return Err(ApiError::Conflict(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;
    let target = sqlx::query_as::<_, Admin>(
        "UPDATE admins
         SET is_active = ?,
             failed_attempts = CASE WHEN ? THEN 0 ELSE failed_attempts END,
             locked_until = CASE WHEN ? THEN NULL ELSE locked_until END
         WHERE id = ?
         RETURNING *",
    )
    .bind(body.is_active)
    .bind(body.is_active)
    .bind(body.is_active)
    .bind(admin_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Admin {} not found", admin_id)))?;

    let sessions_revoked = if body.is_active {
        0
    } else {
        sessions::revoke_all_for_admin(&mut *tx, admin_id, None).await?
    };

    audit::record(
        &mut *tx,
        admin.id,
        if body.is_active { "admin.activate" } else { "admin.deactivate" },
        "admin",
        Some(admin_id),
        json!({ "username": target.username, "sessions_revoked": sessions_revoked }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, target = admin_id, active = body.is_active, "Admin status changed");
    Ok(Json(AdminStatusResult {
        admin: target,
        sessions_revoked,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AdminRoleRequest {
    pub role: AdminRole,
}

/// POST /api/admins/:id/role
pub async fn set_role(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(admin_id): Path<i64>,
    Json(body): Json<AdminRoleRequest>,
) -> ApiResult<Json<Admin>> {
    require(admin.role, Permission::ManageAdmins)?;
    if admin_id == admin.id && body.role != admin.role {
        return Err(ApiError::Conflict("You cannot change your own role".to_string()));
    }

    let mut tx = state.db.begin().await?;
    let previous: AdminRole = sqlx::query_scalar("SELECT role FROM admins WHERE id = ?")
        .bind(admin_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Admin {} not found", admin_id)))?;

    let target = sqlx::query_as::<_, Admin>("UPDATE admins SET role = ? WHERE id = ? RETURNING *")
        .bind(body.role)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

    audit::record(
        &mut *tx,
        admin.id,
        "admin.role",
        "admin",
        Some(admin_id),
        json!({ "username": target.username, "previous": previous, "role": target.role }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = admin.id, target = admin_id, role = %target.role, "Admin role changed");
    Ok(Json(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  Priya.S ").unwrap(), "priya.s");
        assert!(normalize_username("ab").is_err());
        assert!(normalize_username("has space").is_err());
        assert!(normalize_username(&"x".repeat(USERNAME_MAX + 1)).is_err());
    }
}
