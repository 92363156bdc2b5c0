//! Shared fixtures for rvw-admin integration tests
//!
//! Each test gets its own temporary database and router. Requests go
//! through `oneshot`, so no port is bound.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use rvw_admin::db::sessions::{CSRF_HEADER, SESSION_COOKIE};
use rvw_admin::security::hash_password;
use rvw_admin::services::proof_scorer::ProofScorer;
use rvw_admin::{build_router, AppState, ServiceConfig};
use rvw_common::db::init_database;
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    _dir: TempDir,
    pub db: SqlitePool,
    pub app: Router,
}

/// Cookie and CSRF token of a logged-in admin
#[derive(Debug, Clone)]
pub struct Session {
    pub cookie: String,
    pub csrf: String,
    pub admin_id: i64,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    pub async fn with_scorer(scorer: Arc<dyn ProofScorer>) -> Self {
        Self::build(Some(scorer)).await
    }

    async fn build(scorer: Option<Arc<dyn ProofScorer>>) -> Self {
        let dir = TempDir::new().unwrap();
        let db = init_database(&dir.path().join("reviewdesk.db")).await.unwrap();

        let mut state = AppState::new(db.clone(), ServiceConfig::default());
        if let Some(scorer) = scorer {
            state = state.with_scorer(scorer);
        }

        Self {
            _dir: dir,
            db,
            app: build_router(state),
        }
    }

    pub async fn create_admin(&self, username: &str, role: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO admins (username, password_hash, role, is_active, created_at)
             VALUES (?, ?, ?, 1, ?) RETURNING id",
        )
        .bind(username)
        .bind(hash_password(PASSWORD).unwrap())
        .bind(role)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    /// Create an admin with `role` and log them in
    pub async fn admin_session(&self, username: &str, role: &str) -> Session {
        self.create_admin(username, role).await;
        self.login(username, PASSWORD).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Session {
        let response = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login as {} failed", username);

        let cookie = session_cookie(&response).expect("login sets the session cookie");
        let body = json_body(response).await;
        Session {
            cookie,
            csrf: body["csrf_token"].as_str().unwrap().to_string(),
            admin_id: body["admin"]["id"].as_i64().unwrap(),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        session: Option<&Session>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            builder = builder
                .header(header::COOKIE, &session.cookie)
                .header(CSRF_HEADER, &session.csrf);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Send and decode the JSON answer
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        session: &Session,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, uri, Some(session), body).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    pub async fn get(&self, uri: &str, session: &Session) -> (StatusCode, Value) {
        self.call(Method::GET, uri, session, None).await
    }

    pub async fn post(&self, uri: &str, session: &Session, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, session, Some(body)).await
    }

    pub async fn insert_user(&self, name: &str, referred_by: Option<i64>) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO users (name, email, referral_code, referred_by, created_at)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(format!("{}@example.in", name.to_lowercase()))
        .bind(format!("REF-{}", name.to_uppercase()))
        .bind(referred_by)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    pub async fn insert_seller(&self, name: &str, gst_number: Option<&str>) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO sellers (name, email, company_name, gst_number, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(format!("{}@seller.in", name.to_lowercase()))
        .bind(format!("{} Pvt Ltd", name))
        .bind(gst_number)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    pub async fn insert_request(
        &self,
        seller_id: i64,
        reward_paise: i64,
        total_slots: i64,
        status: &str,
    ) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO review_requests
                (seller_id, title, platform, product_url, reward_paise, total_slots, status, created_at, updated_at)
             VALUES (?, 'Review our kettle', 'amazon', 'https://example.in/kettle', ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(seller_id)
        .bind(reward_paise)
        .bind(total_slots)
        .bind(status)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    /// A submitted task; `proof_text` doubles as the stub scorer's input
    pub async fn insert_task(
        &self,
        review_request_id: i64,
        user_id: i64,
        ai_confidence: Option<f64>,
        proof_text: &str,
    ) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO tasks
                (review_request_id, user_id, status, proof_url, proof_text, ai_confidence, submitted_at, created_at)
             VALUES (?, ?, 'submitted', 'https://example.in/proof.png', ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(review_request_id)
        .bind(user_id)
        .bind(proof_text)
        .bind(ai_confidence)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    pub async fn insert_document(&self, user_id: i64, document_type: &str, number: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO kyc_documents (user_id, document_type, document_number, document_url, submitted_at)
             VALUES (?, ?, ?, 'https://example.in/doc.jpg', ?) RETURNING id",
        )
        .bind(user_id)
        .bind(document_type)
        .bind(number)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    pub async fn insert_withdrawal(&self, user_id: i64, amount_paise: i64) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO withdrawal_requests (user_id, amount_paise, method, account_details, requested_at)
             VALUES (?, ?, 'upi', 'worker@okaxis', ?) RETURNING id",
        )
        .bind(user_id)
        .bind(amount_paise)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    pub async fn balance(&self, user_id: i64) -> i64 {
        sqlx::query_scalar("SELECT wallet_balance_paise FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.db)
            .await
            .unwrap()
    }

    pub async fn audit_count(&self, action: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE action = ?")
            .bind(action)
            .fetch_one(&self.db)
            .await
            .unwrap()
    }
}

/// `name=value` of the session cookie set by a response
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", SESSION_COOKIE)))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn text_body(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
