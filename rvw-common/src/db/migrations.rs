//! Database schema migrations
//!
//! Versioned, idempotent upgrades tracked in `schema_version`. They run after
//! `CREATE TABLE IF NOT EXISTS`, so a fresh database already has the newest
//! columns and each migration must tolerate that.
//!
//! Never modify an existing migration; add a new one and bump
//! [`CURRENT_SCHEMA_VERSION`].

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Referral tiers seeded on first run: (level, basis points)
const DEFAULT_REFERRAL_TIERS: &[(i64, i64)] = &[(1, 1000), (2, 500), (3, 200)];

/// Latest applied schema version (0 when none)
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    Ok(())
}

/// Migration v1: seed default referral commission tiers
///
/// Skipped when tiers already exist so an operator's table is never overwritten.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Seed referral tiers");

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referral_tiers")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        info!("  referral_tiers already populated - skipping");
        return Ok(());
    }

    for (level, bps) in DEFAULT_REFERRAL_TIERS {
        sqlx::query("INSERT OR IGNORE INTO referral_tiers (level, commission_bps) VALUES (?, ?)")
            .bind(level)
            .bind(bps)
            .execute(pool)
            .await?;
    }

    info!("  ✓ Seeded {} referral tiers", DEFAULT_REFERRAL_TIERS.len());
    Ok(())
}
