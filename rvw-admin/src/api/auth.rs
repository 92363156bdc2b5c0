//! Admin login, sessions and the session/CSRF middleware

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
    Extension,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use rvw_common::db::settings::load_runtime_settings;
use rvw_common::db::Admin;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::db::audit;
use crate::db::sessions::{self, CSRF_HEADER, SESSION_COOKIE};
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::security::{constant_time_eq, hash_password, verify_password};
use crate::AppState;

pub use crate::db::sessions::CurrentAdmin;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Session + CSRF middleware for protected routes
///
/// Resolves the session cookie to a [`CurrentAdmin`] request extension. For
/// POST/PUT/PATCH/DELETE the `X-CSRF-Token` header must match the session's
/// token.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Unauthorized("Login required".to_string()))?;

    let admin = sessions::lookup(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".to_string()))?;

    let unsafe_method = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if unsafe_method {
        let provided = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !constant_time_eq(provided, &admin.csrf_token) {
            warn!(
                admin_id = admin.id,
                "CSRF check failed for {} {}",
                request.method(),
                request.uri().path()
            );
            return Err(ApiError::CsrfFailed);
        }
    }

    request.extensions_mut().insert(admin);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub admin: Admin,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .build()
}

async fn load_admin(state: &AppState, admin_id: i64) -> ApiResult<Admin> {
    sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE id = ?")
        .bind(admin_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Admin {} not found", admin_id)))
}

/// POST /api/auth/login
///
/// Unknown usernames and wrong passwords get the same answer. Repeated
/// failures lock the account for `login_lockout_minutes`.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    let username = body.username.trim();
    let settings = load_runtime_settings(&state.db).await?;

    let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE username = ?")
        .bind(username)
        .fetch_optional(&state.db)
        .await?;

    let Some(admin) = admin else {
        warn!("Login failed: unknown username '{}'", username);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };

    let now = Utc::now();
    if let Some(locked_until) = admin.locked_until {
        if locked_until > now {
            warn!(admin_id = admin.id, "Login refused: account locked");
            return Err(ApiError::Unauthorized(format!(
                "Account locked until {}",
                locked_until.format("%Y-%m-%d %H:%M:%S UTC")
            )));
        }
    }

    if !verify_password(&body.password, &admin.password_hash) {
        let attempts: i64 = sqlx::query_scalar(
            "UPDATE admins SET failed_attempts = failed_attempts + 1 WHERE id = ?
             RETURNING failed_attempts",
        )
        .bind(admin.id)
        .fetch_one(&state.db)
        .await?;

        if attempts >= settings.login_max_attempts {
            let locked_until = now + Duration::minutes(settings.login_lockout_minutes);
            sqlx::query("UPDATE admins SET failed_attempts = 0, locked_until = ? WHERE id = ?")
                .bind(locked_until)
                .bind(admin.id)
                .execute(&state.db)
                .await?;
            warn!(
                admin_id = admin.id,
                "Account locked after {} failed logins, until {}", attempts, locked_until
            );
        } else {
            warn!(admin_id = admin.id, "Login failed: wrong password ({} consecutive)", attempts);
        }
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    if !admin.is_active {
        warn!(admin_id = admin.id, "Login refused: account deactivated");
        return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
    }

    sqlx::query(
        "UPDATE admins SET failed_attempts = 0, locked_until = NULL, last_login_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(admin.id)
    .execute(&state.db)
    .await?;

    let session = sessions::create(&state.db, admin.id, state.config.session_ttl).await?;
    audit::record(&state.db, admin.id, "auth.login", "admin", Some(admin.id), json!(null)).await?;
    info!(admin_id = admin.id, "Admin '{}' logged in", admin.username);

    let admin = load_admin(&state, admin.id).await?;
    let jar = jar.add(session_cookie(session.token, state.config.secure_cookies));

    Ok((
        jar,
        Json(SessionResponse {
            admin,
            csrf_token: session.csrf_token,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<serde_json::Value>)> {
    sessions::revoke(&state.db, &current.token_hash).await?;
    audit::record(&state.db, current.id, "auth.logout", "admin", Some(current.id), json!(null)).await?;
    info!(admin_id = current.id, "Admin logged out");

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    Ok((jar, Json(json!({ "logged_out": true }))))
}

/// GET /api/auth/session
pub async fn current_session(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
) -> ApiResult<Json<SessionResponse>> {
    let admin = load_admin(&state, current.id).await?;
    Ok(Json(SessionResponse {
        admin,
        csrf_token: current.csrf_token,
        expires_at: current.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// POST /api/auth/password
///
/// Other sessions of the same admin are signed out.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let admin = load_admin(&state, current.id).await?;

    if !verify_password(&body.current_password, &admin.password_hash) {
        return Err(ApiError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }
    if body.new_password == body.current_password {
        return Err(ApiError::BadRequest(
            "New password must differ from the current one".to_string(),
        ));
    }
    let password_hash = hash_password(&body.new_password)?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE admins SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(current.id)
        .execute(&mut *tx)
        .await?;
    let revoked =
        sessions::revoke_all_for_admin(&mut *tx, current.id, Some(&current.token_hash)).await?;
    audit::record(
        &mut *tx,
        current.id,
        "auth.change_password",
        "admin",
        Some(current.id),
        json!({ "sessions_revoked": revoked }),
    )
    .await?;
    tx.commit().await?;

    info!(admin_id = current.id, revoked, "Password changed");
    Ok(Json(json!({ "changed": true, "sessions_revoked": revoked })))
}
