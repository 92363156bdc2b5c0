//! rvw-admin library - marketplace administration service
//!
//! JSON API over the Reviewdesk database: moderation of sellers, review
//! requests and task proofs, KYC review, wallet and withdrawal management,
//! referral commissions, announcements and notifications.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod csv_export;
pub mod db;
pub mod error;
pub mod extract;
pub mod listing;
pub mod pagination;
pub mod security;
pub mod services;

use services::proof_scorer::ProofScorer;

/// Maximum accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Service settings fixed at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Lifetime of an admin session
    pub session_ttl: chrono::Duration,
    /// Mark session cookies `Secure`
    pub secure_cookies: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::minutes(480),
            secure_cookies: false,
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<ServiceConfig>,
    /// External proof scorer; `None` disables scoring
    pub scorer: Option<Arc<dyn ProofScorer>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServiceConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
            scorer: None,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ProofScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }
}

/// Build application router
///
/// `/health`, login and public announcements are open; everything else
/// requires a session, and unsafe methods additionally require the CSRF header.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post, put};

    let protected = Router::new()
        // Session
        .route("/api/auth/logout", post(api::auth::logout))
        .route("/api/auth/session", get(api::auth::current_session))
        .route("/api/auth/password", post(api::auth::change_password))
        // Dashboard
        .route("/api/dashboard/stats", get(api::dashboard::stats))
        .route("/api/dashboard/chart", get(api::dashboard::chart))
        // Users
        .route("/api/users", get(api::users::list_users))
        .route("/api/users/:id", get(api::users::get_user))
        .route("/api/users/:id/status", post(api::users::set_status))
        .route("/api/users/:id/wallet", post(api::users::adjust_wallet))
        .route("/api/users/:id/transactions", get(api::users::list_transactions))
        .route("/api/users/:id/referrals", get(api::users::referral_tree))
        // Sellers
        .route(
            "/api/sellers",
            get(api::sellers::list_sellers).post(api::sellers::create_seller),
        )
        .route(
            "/api/sellers/:id",
            get(api::sellers::get_seller)
                .put(api::sellers::update_seller)
                .delete(api::sellers::delete_seller),
        )
        .route("/api/sellers/:id/verify", post(api::sellers::set_verified))
        .route("/api/sellers/:id/status", post(api::sellers::set_status))
        // Review requests
        .route("/api/review-requests", get(api::review_requests::list_review_requests))
        .route(
            "/api/review-requests/:id",
            get(api::review_requests::get_review_request)
                .put(api::review_requests::update_review_request)
                .delete(api::review_requests::delete_review_request),
        )
        .route("/api/review-requests/:id/approve", post(api::review_requests::approve))
        .route("/api/review-requests/:id/reject", post(api::review_requests::reject))
        .route("/api/review-requests/:id/pause", post(api::review_requests::pause))
        .route("/api/review-requests/:id/resume", post(api::review_requests::resume))
        // Tasks and proofs
        .route("/api/tasks", get(api::tasks::list_tasks))
        .route("/api/tasks/auto-verify", post(api::tasks::auto_verify))
        .route("/api/tasks/:id", get(api::tasks::get_task))
        .route("/api/tasks/:id/approve", post(api::tasks::approve_task))
        .route("/api/tasks/:id/reject", post(api::tasks::reject_task))
        .route("/api/tasks/:id/rescore", post(api::tasks::rescore_task))
        // KYC
        .route("/api/kyc", get(api::kyc::list_documents))
        .route("/api/kyc/:id", get(api::kyc::get_document))
        .route("/api/kyc/:id/approve", post(api::kyc::approve_document))
        .route("/api/kyc/:id/reject", post(api::kyc::reject_document))
        // Wallet and withdrawals
        .route("/api/wallet/transactions", get(api::wallet::list_transactions))
        .route("/api/withdrawals", get(api::withdrawals::list_withdrawals))
        .route("/api/withdrawals/:id", get(api::withdrawals::get_withdrawal))
        .route("/api/withdrawals/:id/approve", post(api::withdrawals::approve))
        .route("/api/withdrawals/:id/reject", post(api::withdrawals::reject))
        .route("/api/withdrawals/:id/mark-paid", post(api::withdrawals::mark_paid))
        // Referrals
        .route(
            "/api/referrals/tiers",
            get(api::referrals::list_tiers).put(api::referrals::replace_tiers),
        )
        .route("/api/referrals/commissions", get(api::referrals::list_commissions))
        // Announcements
        .route(
            "/api/announcements",
            get(api::announcements::list_announcements)
                .post(api::announcements::create_announcement),
        )
        .route(
            "/api/announcements/:id",
            put(api::announcements::update_announcement)
                .delete(api::announcements::delete_announcement),
        )
        .route("/api/announcements/:id/toggle", post(api::announcements::toggle_announcement))
        // Notifications
        .route(
            "/api/notifications",
            get(api::notifications::list_notifications)
                .post(api::notifications::send_notification),
        )
        .route("/api/notifications/:id", delete(api::notifications::delete_notification))
        // Admins
        .route(
            "/api/admins",
            get(api::admins::list_admins).post(api::admins::create_admin),
        )
        .route("/api/admins/:id/status", post(api::admins::set_status))
        .route("/api/admins/:id/role", post(api::admins::set_role))
        // Settings and audit
        .route("/api/settings", get(api::settings::list_settings))
        .route("/api/settings/:key", put(api::settings::update_setting))
        .route("/api/audit", get(api::audit::list_audit))
        // CSV export
        .route("/api/export/:entity", get(api::export::export_csv))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::require_session,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/login", post(api::auth::login))
        .route(
            "/api/public/announcements",
            get(api::announcements::public_announcements),
        )
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
