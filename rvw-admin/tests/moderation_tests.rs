//! Sellers, review requests, task approval and automated proof verification

mod helpers;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use helpers::TestApp;
use rvw_admin::services::proof_scorer::{ProofScorer, ScorerError, TaskProof};
use serde_json::json;
use sqlx::SqlitePool;

/// Reads the confidence straight out of the proof text
struct TextScorer;

#[async_trait]
impl ProofScorer for TextScorer {
    async fn score(&self, proof: &TaskProof) -> Result<f64, ScorerError> {
        proof
            .proof_text
            .as_deref()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| ScorerError::Parse("no score in proof text".to_string()))
    }
}

/// Approves the task from another session while scoring it
struct RacingScorer {
    db: OnceLock<SqlitePool>,
}

#[async_trait]
impl ProofScorer for RacingScorer {
    async fn score(&self, proof: &TaskProof) -> Result<f64, ScorerError> {
        let db = self.db.get().expect("pool set before scoring");
        sqlx::query("UPDATE tasks SET status = 'approved' WHERE id = ?")
            .bind(proof.task_id)
            .execute(db)
            .await
            .expect("approve task");
        Ok(0.05)
    }
}

#[tokio::test]
async fn test_seller_gstin_is_validated_and_verification_tracks_it() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;

    let (status, _) = app
        .post(
            "/api/sellers",
            &admin,
            json!({
                "name": "Anil",
                "email": "anil@acme.in",
                "company_name": "Acme Traders",
                "gst_number": "27AAPFU0939F1ZA",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, seller) = app
        .post(
            "/api/sellers",
            &admin,
            json!({
                "name": "Anil",
                "email": "Anil@Acme.in",
                "company_name": "Acme Traders",
                "gst_number": " 27aapfu0939f1zv ",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", seller);
    assert_eq!(seller["email"], "anil@acme.in");
    assert_eq!(seller["gst_number"], "27AAPFU0939F1ZV");
    assert_eq!(seller["is_verified"], false);
    let id = seller["id"].as_i64().unwrap();

    let (status, seller) = app
        .post(&format!("/api/sellers/{}/verify", id), &admin, json!({ "verified": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seller["is_verified"], true);

    let (status, seller) = app
        .call(
            Method::PUT,
            &format!("/api/sellers/{}", id),
            &admin,
            Some(json!({
                "name": "Anil",
                "email": "anil@acme.in",
                "company_name": "Acme Traders",
                "gst_number": "29AAGCB7383J1Z4",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seller["is_verified"], false);

    let bare = app.insert_seller("Bare", None).await;
    let (status, _) = app
        .post(&format!("/api/sellers/{}/verify", bare), &admin, json!({ "verified": true }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_duplicate_seller_email_conflicts() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    app.insert_seller("Acme", None).await;

    let (status, _) = app
        .post(
            "/api/sellers",
            &admin,
            json!({ "name": "Other", "email": "acme@seller.in", "company_name": "Other Co" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_suspending_seller_pauses_live_requests() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    let seller = app.insert_seller("Acme", None).await;
    let live = app.insert_request(seller, 5000, 10, "approved").await;
    let pending = app.insert_request(seller, 5000, 10, "pending").await;

    let (status, body) = app
        .post(&format!("/api/sellers/{}/status", seller), &admin, json!({ "status": "suspended" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused_requests"], 1);

    let (_, request) = app.get(&format!("/api/review-requests/{}", live), &admin).await;
    assert_eq!(request["status"], "paused");
    let (_, request) = app.get(&format!("/api/review-requests/{}", pending), &admin).await;
    assert_eq!(request["status"], "pending");

    // Cannot resume or approve while the seller is suspended
    let (status, _) = app
        .post(&format!("/api/review-requests/{}/resume", live), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Sellers with requests are never deleted
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/sellers/{}", seller), &admin, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_review_request_transitions() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 5000, 10, "pending").await;
    let base = format!("/api/review-requests/{}", request);

    let (status, body) = app.post(&format!("{}/approve", base), &admin, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, _) = app.post(&format!("{}/approve", base), &admin, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.post(&format!("{}/pause", base), &admin, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paused");

    let (status, body) = app.post(&format!("{}/resume", base), &admin, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, _) = app
        .post(&format!("{}/reject", base), &admin, json!({ "reason": "Counterfeit product" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_task_approval_pays_reward_and_referral_chain() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;

    let top = app.insert_user("Asha", None).await;
    let middle = app.insert_user("Bala", Some(top)).await;
    let direct = app.insert_user("Chitra", Some(middle)).await;
    let worker = app.insert_user("Dev", Some(direct)).await;

    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 10000, 1, "approved").await;
    let task = app.insert_task(request, worker, Some(0.7), "looks fine").await;
    let late = app.insert_task(request, top, Some(0.7), "also fine").await;

    let (status, outcome) = app
        .post(&format!("/api/tasks/{}/approve", task), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["reward_paise"], 10000);
    assert_eq!(outcome["request_completed"], true);
    assert_eq!(outcome["commissions"].as_array().unwrap().len(), 3);

    assert_eq!(app.balance(worker).await, 10000);
    assert_eq!(app.balance(direct).await, 1000);
    assert_eq!(app.balance(middle).await, 500);
    assert_eq!(app.balance(top).await, 200);

    let (_, request_body) = app.get(&format!("/api/review-requests/{}", request), &admin).await;
    assert_eq!(request_body["status"], "completed");
    assert_eq!(request_body["filled_slots"], 1);

    // The only slot is taken
    let (status, _) = app
        .post(&format!("/api/tasks/{}/approve", late), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, late_task) = app.get(&format!("/api/tasks/{}", late), &admin).await;
    assert_eq!(late_task["status"], "submitted");
    // No reward for the refused approval, only the earlier commission
    assert_eq!(app.balance(top).await, 200);

    // Approved tasks cannot be approved again
    let (status, _) = app
        .post(&format!("/api/tasks/{}/approve", task), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, commissions) = app
        .get(&format!("/api/referrals/commissions?source_user_id={}", worker), &admin)
        .await;
    assert_eq!(commissions["total_items"], 3);
}

#[tokio::test]
async fn test_blocked_referrer_is_skipped() {
    let app = TestApp::new().await;
    let admin = app.admin_session("priya", "super_admin").await;

    let top = app.insert_user("Asha", None).await;
    let middle = app.insert_user("Bala", Some(top)).await;
    let worker = app.insert_user("Dev", Some(middle)).await;
    app.post(
        &format!("/api/users/{}/status", middle),
        &admin,
        json!({ "status": "blocked", "reason": "Referral farming" }),
    )
    .await;

    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 10000, 5, "approved").await;
    let task = app.insert_task(request, worker, None, "").await;

    let (status, _) = app
        .post(&format!("/api/tasks/{}/approve", task), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.balance(middle).await, 0);
    // Level-2 rate for the user above the blocked one
    assert_eq!(app.balance(top).await, 500);
}

#[tokio::test]
async fn test_reject_task_requires_reason() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    let worker = app.insert_user("Dev", None).await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 10000, 5, "approved").await;
    let task = app.insert_task(request, worker, None, "").await;

    let (status, _) = app
        .post(&format!("/api/tasks/{}/reject", task), &admin, json!({ "reason": " " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            &format!("/api/tasks/{}/reject", task),
            &admin,
            json!({ "reason": "Screenshot is of a different product" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(app.balance(worker).await, 0);
}

#[tokio::test]
async fn test_rescore_without_scorer_conflicts() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    let worker = app.insert_user("Dev", None).await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 10000, 5, "approved").await;
    let task = app.insert_task(request, worker, None, "0.9").await;

    let (status, _) = app
        .post(&format!("/api/tasks/{}/rescore", task), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_auto_verify_dry_run_then_apply() {
    let app = TestApp::with_scorer(Arc::new(TextScorer)).await;
    let admin = app.admin_session("arjun", "moderator").await;
    let worker = app.insert_user("Dev", None).await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 4000, 10, "approved").await;

    let confident = app.insert_task(request, worker, Some(0.95), "").await;
    let doubtful = app.insert_task(request, worker, Some(0.10), "").await;
    let unscored_good = app.insert_task(request, worker, None, "0.97").await;
    let unscored_middling = app.insert_task(request, worker, None, "0.50").await;

    let (status, report) = app
        .post("/api/tasks/auto-verify", &admin, json!({ "dry_run": true }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["examined"], 4);
    assert_eq!(report["approved"], 1);
    assert_eq!(report["rejected"], 1);
    assert_eq!(report["manual"], 2);
    assert_eq!(report["scored"], 0);
    assert_eq!(app.balance(worker).await, 0);

    let (status, report) = app.post("/api/tasks/auto-verify", &admin, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["examined"], 4);
    assert_eq!(report["scored"], 2);
    assert_eq!(report["approved"], 2);
    assert_eq!(report["rejected"], 1);
    assert_eq!(report["manual"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(app.balance(worker).await, 8000);

    for (task, expected) in [
        (confident, "approved"),
        (doubtful, "rejected"),
        (unscored_good, "approved"),
        (unscored_middling, "submitted"),
    ] {
        let (_, body) = app.get(&format!("/api/tasks/{}", task), &admin).await;
        assert_eq!(body["status"], expected, "task {}", task);
    }

    let (_, body) = app.get(&format!("/api/tasks/{}", confident), &admin).await;
    assert_eq!(body["auto_verified"], true);

    let (_, page) = app.get("/api/tasks?auto_verified=true&status=approved", &admin).await;
    assert_eq!(page["total_items"], 2);
    assert_eq!(app.audit_count("task.auto_verify").await, 1);
}

#[tokio::test]
async fn test_review_request_edit_rules() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 5000, 10, "approved").await;
    let uri = format!("/api/review-requests/{}", request);
    sqlx::query("UPDATE review_requests SET filled_slots = 3 WHERE id = ?")
        .bind(request)
        .execute(&app.db)
        .await
        .unwrap();

    let edit = |title: &str, reward: i64, slots: i64| {
        json!({ "title": title, "description": "Honest review", "reward_paise": reward, "total_slots": slots })
    };

    let (status, _) = app.call(Method::PUT, &uri, &admin, Some(edit("  ", 5000, 10))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.call(Method::PUT, &uri, &admin, Some(edit("Phone case", 0, 10))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // Below the three slots already filled
    let (status, _) = app.call(Method::PUT, &uri, &admin, Some(edit("Phone case", 5000, 2))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::PUT, &uri, &admin, Some(edit("Phone case", 6000, 8)))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["title"], "Phone case");
    assert_eq!(body["reward_paise"], 6000);
    assert_eq!(body["status"], "approved");

    // Shrinking to the filled count completes the request
    let (status, body) = app
        .call(Method::PUT, &uri, &admin, Some(edit("Phone case", 6000, 3)))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "completed");

    let (status, _) = app
        .call(Method::PUT, &uri, &admin, Some(edit("Phone case", 6000, 20)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.audit_count("review_request.update").await, 2);
}

#[tokio::test]
async fn test_referral_cycle_pays_each_ancestor_once() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;

    let first = app.insert_user("Asha", None).await;
    let second = app.insert_user("Bala", Some(first)).await;
    sqlx::query("UPDATE users SET referred_by = ? WHERE id = ?")
        .bind(second)
        .bind(first)
        .execute(&app.db)
        .await
        .unwrap();
    let worker = app.insert_user("Dev", Some(first)).await;

    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 10000, 5, "approved").await;
    let task = app.insert_task(request, worker, None, "").await;

    let (status, outcome) = app
        .post(&format!("/api/tasks/{}/approve", task), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["commissions"].as_array().unwrap().len(), 2);
    assert_eq!(app.balance(worker).await, 10000);
    assert_eq!(app.balance(first).await, 1000);
    assert_eq!(app.balance(second).await, 500);
}

#[tokio::test]
async fn test_auto_verify_counts_tasks_it_could_not_approve() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    let worker = app.insert_user("Dev", None).await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 4000, 1, "approved").await;
    app.insert_task(request, worker, Some(0.95), "").await;
    let second = app.insert_task(request, worker, Some(0.96), "").await;

    let (status, report) = app.post("/api/tasks/auto-verify", &admin, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["examined"], 2);
    assert_eq!(report["approved"], 1);
    assert_eq!(report["failed"], 1);
    assert!(report["decisions"][1]["error"].is_string());
    assert_eq!(app.balance(worker).await, 4000);

    let (_, body) = app.get(&format!("/api/tasks/{}", second), &admin).await;
    assert_eq!(body["status"], "submitted");
}

#[tokio::test]
async fn test_rescore_keeps_a_task_decided_meanwhile() {
    let scorer = Arc::new(RacingScorer { db: OnceLock::new() });
    let app = TestApp::with_scorer(scorer.clone()).await;
    scorer.db.set(app.db.clone()).unwrap();
    let admin = app.admin_session("arjun", "moderator").await;
    let worker = app.insert_user("Dev", None).await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 10000, 5, "approved").await;
    let task = app.insert_task(request, worker, None, "").await;

    let (status, body) = app
        .post(&format!("/api/tasks/{}/rescore", task), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (_, body) = app.get(&format!("/api/tasks/{}", task), &admin).await;
    assert_eq!(body["status"], "approved");
    assert!(body["ai_confidence"].is_null());
}

#[tokio::test]
async fn test_malformed_input_gets_the_error_envelope() {
    let app = TestApp::new().await;
    let admin = app.admin_session("arjun", "moderator").await;
    let worker = app.insert_user("Dev", None).await;
    let seller = app.insert_seller("Acme", None).await;
    let request = app.insert_request(seller, 10000, 5, "approved").await;
    let task = app.insert_task(request, worker, None, "").await;
    let reject = format!("/api/tasks/{}/reject", task);

    let (status, body) = app.post(&reject, &admin, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = app.post(&reject, &admin, json!({ "reason": 42 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = app.get("/api/tasks/abc", &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = app.get("/api/users?status=frozen", &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let huge = "x".repeat(rvw_admin::MAX_BODY_BYTES + 1);
    let (status, body) = app.post(&reject, &admin, json!({ "reason": huge })).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");

    let (_, body) = app.get(&format!("/api/tasks/{}", task), &admin).await;
    assert_eq!(body["status"], "submitted");
}
