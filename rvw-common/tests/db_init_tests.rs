//! Integration tests for database initialization
//!
//! Covers first-run creation, reopening, default settings, seeded referral
//! tiers, schema versioning and the CHECK constraints that guard balances.

use rvw_common::db::init::init_database;
use rvw_common::db::migrations::get_schema_version;
use rvw_common::db::settings::{load_runtime_settings, update_setting, RuntimeSettings};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("reviewdesk.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviewdesk.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
    assert_eq!(get_schema_version(&pool2.unwrap()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("reviewdesk.db")).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 8);

    let settings = load_runtime_settings(&pool).await.unwrap();
    assert_eq!(settings, RuntimeSettings::default());
}

#[tokio::test]
async fn test_null_setting_reset_on_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviewdesk.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'login_max_attempts'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'login_max_attempts'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("5"));
}

#[tokio::test]
async fn test_update_setting_persists_normalized_value() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("reviewdesk.db")).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let stored = update_setting(&mut conn, "kyc_required_documents", "bank_account , pan")
        .await
        .unwrap();
    assert_eq!(stored, "bank_account,pan");

    assert!(update_setting(&mut conn, "proof_auto_reject_threshold", "0.99").await.is_err());
    drop(conn);

    let settings = load_runtime_settings(&pool).await.unwrap();
    assert_eq!(settings.kyc_required_documents.len(), 2);
    assert_eq!(settings.proof_auto_reject_threshold, 0.30);
}

#[tokio::test]
async fn test_referral_tiers_seeded_once() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reviewdesk.db");

    let pool = init_database(&db_path).await.unwrap();
    let tiers: Vec<(i64, i64)> =
        sqlx::query_as("SELECT level, commission_bps FROM referral_tiers ORDER BY level")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(tiers, vec![(1, 1000), (2, 500), (3, 200)]);

    // Operator edits survive a restart
    sqlx::query("DELETE FROM referral_tiers WHERE level > 1")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referral_tiers")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_negative_wallet_balance_rejected_by_schema() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("reviewdesk.db")).await.unwrap();

    sqlx::query("INSERT INTO users (name, email, referral_code) VALUES ('A', 'a@example.com', 'REFA')")
        .execute(&pool)
        .await
        .unwrap();

    let result = sqlx::query("UPDATE users SET wallet_balance_paise = -1 WHERE email = 'a@example.com'")
        .execute(&pool)
        .await;
    assert!(result.is_err(), "CHECK constraint should reject negative balances");
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("reviewdesk.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO review_requests (seller_id, title, platform, product_url, reward_paise, total_slots)
         VALUES (999, 'x', 'amazon', 'https://example.com', 100, 1)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "Unknown seller_id should violate the foreign key");
}
