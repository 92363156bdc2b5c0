//! HTTP API handlers for rvw-admin

pub mod admins;
pub mod announcements;
pub mod audit;
pub mod auth;
pub mod dashboard;
pub mod export;
pub mod health;
pub mod kyc;
pub mod notifications;
pub mod referrals;
pub mod review_requests;
pub mod sellers;
pub mod settings;
pub mod tasks;
pub mod users;
pub mod wallet;
pub mod withdrawals;

pub use auth::require_session;
pub use health::health_routes;

use crate::error::{ApiError, ApiResult};

/// Trimmed copy of a required text field
pub(crate) fn required_text(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Trimmed optional text; blank becomes `None`
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
