//! Database initialization
//!
//! Startup sequence:
//! 1. Open (or create) the SQLite file with foreign keys, WAL and a busy timeout
//! 2. `CREATE TABLE IF NOT EXISTS` for every table
//! 3. Versioned migrations ([`crate::db::migrations`])
//! 4. Default runtime settings

use crate::db::settings::SETTING_DEFAULTS;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Table definitions in dependency order (referenced tables first)
const TABLES: &[(&str, &str)] = &[
    (
        "schema_version",
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "settings",
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "admins",
        r#"
        CREATE TABLE IF NOT EXISTS admins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('super_admin', 'moderator', 'finance')),
            is_active INTEGER NOT NULL DEFAULT 1,
            failed_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until TIMESTAMP,
            last_login_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "admin_sessions",
        r#"
        CREATE TABLE IF NOT EXISTS admin_sessions (
            token_hash TEXT PRIMARY KEY,
            admin_id INTEGER NOT NULL REFERENCES admins(id) ON DELETE CASCADE,
            csrf_token TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            expires_at TIMESTAMP NOT NULL,
            last_seen_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            referral_code TEXT NOT NULL UNIQUE,
            referred_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            wallet_balance_paise INTEGER NOT NULL DEFAULT 0 CHECK (wallet_balance_paise >= 0),
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'blocked')),
            blocked_reason TEXT,
            kyc_status TEXT NOT NULL DEFAULT 'none'
                CHECK (kyc_status IN ('none', 'pending', 'verified', 'rejected')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "sellers",
        r#"
        CREATE TABLE IF NOT EXISTS sellers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            company_name TEXT NOT NULL,
            gst_number TEXT,
            is_verified INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'suspended')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "review_requests",
        r#"
        CREATE TABLE IF NOT EXISTS review_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            seller_id INTEGER NOT NULL REFERENCES sellers(id),
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            platform TEXT NOT NULL,
            product_url TEXT NOT NULL,
            reward_paise INTEGER NOT NULL CHECK (reward_paise > 0),
            total_slots INTEGER NOT NULL CHECK (total_slots > 0),
            filled_slots INTEGER NOT NULL DEFAULT 0 CHECK (filled_slots >= 0),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'paused', 'completed')),
            rejection_reason TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (filled_slots <= total_slots)
        )
        "#,
    ),
    (
        "tasks",
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            review_request_id INTEGER NOT NULL REFERENCES review_requests(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            status TEXT NOT NULL DEFAULT 'assigned'
                CHECK (status IN ('assigned', 'submitted', 'approved', 'rejected')),
            proof_url TEXT,
            proof_text TEXT,
            ai_confidence REAL CHECK (ai_confidence IS NULL OR (ai_confidence >= 0 AND ai_confidence <= 1)),
            submitted_at TIMESTAMP,
            reviewed_by INTEGER REFERENCES admins(id),
            reviewed_at TIMESTAMP,
            rejection_reason TEXT,
            auto_verified INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "kyc_documents",
        r#"
        CREATE TABLE IF NOT EXISTS kyc_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            document_type TEXT NOT NULL CHECK (document_type IN ('pan', 'aadhaar', 'bank_account')),
            document_number TEXT NOT NULL,
            document_url TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),
            rejection_reason TEXT,
            reviewed_by INTEGER REFERENCES admins(id),
            reviewed_at TIMESTAMP,
            submitted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "wallet_transactions",
        r#"
        CREATE TABLE IF NOT EXISTS wallet_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            amount_paise INTEGER NOT NULL CHECK (amount_paise != 0),
            balance_after_paise INTEGER NOT NULL CHECK (balance_after_paise >= 0),
            source TEXT NOT NULL
                CHECK (source IN ('task_reward', 'referral_commission', 'admin_adjustment', 'withdrawal')),
            reference TEXT,
            note TEXT,
            created_by INTEGER REFERENCES admins(id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "withdrawal_requests",
        r#"
        CREATE TABLE IF NOT EXISTS withdrawal_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            amount_paise INTEGER NOT NULL CHECK (amount_paise > 0),
            method TEXT NOT NULL CHECK (method IN ('upi', 'bank_transfer')),
            account_details TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'paid')),
            rejection_reason TEXT,
            payout_reference TEXT,
            processed_by INTEGER REFERENCES admins(id),
            processed_at TIMESTAMP,
            requested_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "referral_tiers",
        r#"
        CREATE TABLE IF NOT EXISTS referral_tiers (
            level INTEGER PRIMARY KEY CHECK (level >= 1),
            commission_bps INTEGER NOT NULL CHECK (commission_bps >= 0 AND commission_bps <= 10000)
        )
        "#,
    ),
    (
        "referral_commissions",
        r#"
        CREATE TABLE IF NOT EXISTS referral_commissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            beneficiary_id INTEGER NOT NULL REFERENCES users(id),
            source_user_id INTEGER NOT NULL REFERENCES users(id),
            task_id INTEGER NOT NULL REFERENCES tasks(id),
            level INTEGER NOT NULL,
            amount_paise INTEGER NOT NULL CHECK (amount_paise > 0),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "announcements",
        r#"
        CREATE TABLE IF NOT EXISTS announcements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            audience TEXT NOT NULL DEFAULT 'all' CHECK (audience IN ('all', 'users', 'sellers')),
            is_active INTEGER NOT NULL DEFAULT 1,
            starts_at TIMESTAMP NOT NULL,
            ends_at TIMESTAMP,
            created_by INTEGER NOT NULL REFERENCES admins(id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "notifications",
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "audit_log",
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admin_id INTEGER NOT NULL REFERENCES admins(id),
            action TEXT NOT NULL,
            entity TEXT NOT NULL,
            entity_id INTEGER,
            details TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_users_referred_by ON users(referred_by)",
    "CREATE INDEX IF NOT EXISTS idx_review_requests_seller ON review_requests(seller_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, submitted_at)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_review_request ON tasks(review_request_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_kyc_user ON kyc_documents(user_id, document_type)",
    "CREATE INDEX IF NOT EXISTS idx_wallet_tx_user ON wallet_transactions(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawal_requests(status)",
    "CREATE INDEX IF NOT EXISTS idx_commissions_beneficiary ON referral_commissions(beneficiary_id)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read)",
    "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity, entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_admin ON admin_sessions(admin_id)",
];

/// Open the database file, creating and upgrading the schema as needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Per-connection pragmas go through the connect options so every pooled
    // connection gets them, not just the first one.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    for (name, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
        debug!("Ensured table {}", name);
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

/// Insert missing runtime settings and reset NULL ones to their defaults
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, default_value) in SETTING_DEFAULTS {
        ensure_setting(pool, key, default_value).await?;
    }
    info!("Default settings initialized");
    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates two processes initializing at once
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?;

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?;
    if reset.rows_affected() > 0 {
        info!("Setting '{}' was NULL, reset to default '{}'", key, default_value);
    }

    Ok(())
}
