//! Runtime settings stored in the `settings` table
//!
//! Values are TEXT. Unparseable stored values fall back to the built-in
//! default with a warning instead of failing the request that reads them.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::{Executor, Sqlite, SqliteConnection};
use tracing::warn;

use crate::db::models::{DocumentType, Setting};
use crate::{Error, Result};

pub const PROOF_AUTO_APPROVE_THRESHOLD: &str = "proof_auto_approve_threshold";
pub const PROOF_AUTO_REJECT_THRESHOLD: &str = "proof_auto_reject_threshold";
pub const KYC_REQUIRED_DOCUMENTS: &str = "kyc_required_documents";
pub const WITHDRAWAL_MIN_PAISE: &str = "withdrawal_min_paise";
pub const WITHDRAWAL_REQUIRES_KYC: &str = "withdrawal_requires_kyc";
pub const LOGIN_MAX_ATTEMPTS: &str = "login_max_attempts";
pub const LOGIN_LOCKOUT_MINUTES: &str = "login_lockout_minutes";
pub const MAX_REFERRAL_LEVELS: &str = "max_referral_levels";

/// Built-in defaults, inserted at database init
pub const SETTING_DEFAULTS: &[(&str, &str)] = &[
    (PROOF_AUTO_APPROVE_THRESHOLD, "0.90"),
    (PROOF_AUTO_REJECT_THRESHOLD, "0.30"),
    (KYC_REQUIRED_DOCUMENTS, "pan,aadhaar"),
    (WITHDRAWAL_MIN_PAISE, "10000"),
    (WITHDRAWAL_REQUIRES_KYC, "true"),
    (LOGIN_MAX_ATTEMPTS, "5"),
    (LOGIN_LOCKOUT_MINUTES, "15"),
    (MAX_REFERRAL_LEVELS, "5"),
];

/// Typed view of the settings table
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub proof_auto_approve_threshold: f64,
    pub proof_auto_reject_threshold: f64,
    pub kyc_required_documents: Vec<DocumentType>,
    pub withdrawal_min_paise: i64,
    pub withdrawal_requires_kyc: bool,
    pub login_max_attempts: i64,
    pub login_lockout_minutes: i64,
    pub max_referral_levels: i64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            proof_auto_approve_threshold: 0.90,
            proof_auto_reject_threshold: 0.30,
            kyc_required_documents: vec![DocumentType::Pan, DocumentType::Aadhaar],
            withdrawal_min_paise: 10_000,
            withdrawal_requires_kyc: true,
            login_max_attempts: 5,
            login_lockout_minutes: 15,
            max_referral_levels: 5,
        }
    }
}

impl RuntimeSettings {
    /// Build from raw key/value pairs, falling back per key on bad values
    pub fn from_map(values: &HashMap<String, String>) -> Self {
        let mut settings = Self::default();

        for (key, raw) in values {
            let applied = settings.apply(key, raw);
            if let Err(e) = applied {
                warn!("Ignoring stored setting {}='{}': {}", key, raw, e);
            }
        }

        // A stored pair can violate the ordering even if each value parses
        if settings.proof_auto_reject_threshold > settings.proof_auto_approve_threshold {
            warn!(
                "Stored reject threshold {} exceeds approve threshold {}, using defaults",
                settings.proof_auto_reject_threshold, settings.proof_auto_approve_threshold
            );
            let defaults = Self::default();
            settings.proof_auto_approve_threshold = defaults.proof_auto_approve_threshold;
            settings.proof_auto_reject_threshold = defaults.proof_auto_reject_threshold;
        }

        settings
    }

    /// Parse and apply one key. Unknown keys are ignored.
    fn apply(&mut self, key: &str, raw: &str) -> Result<()> {
        match key {
            PROOF_AUTO_APPROVE_THRESHOLD => self.proof_auto_approve_threshold = parse_ratio(raw)?,
            PROOF_AUTO_REJECT_THRESHOLD => self.proof_auto_reject_threshold = parse_ratio(raw)?,
            KYC_REQUIRED_DOCUMENTS => self.kyc_required_documents = parse_document_list(raw)?,
            WITHDRAWAL_MIN_PAISE => self.withdrawal_min_paise = parse_non_negative(raw)?,
            WITHDRAWAL_REQUIRES_KYC => self.withdrawal_requires_kyc = parse_bool(raw)?,
            LOGIN_MAX_ATTEMPTS => self.login_max_attempts = parse_positive(raw)?,
            LOGIN_LOCKOUT_MINUTES => self.login_lockout_minutes = parse_non_negative(raw)?,
            MAX_REFERRAL_LEVELS => self.max_referral_levels = parse_positive(raw)?,
            _ => {}
        }
        Ok(())
    }
}

fn parse_ratio(raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("'{}' is not a number", raw)))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidInput(format!("{} is outside [0, 1]", value)));
    }
    Ok(value)
}

fn parse_non_negative(raw: &str) -> Result<i64> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("'{}' is not an integer", raw)))?;
    if value < 0 {
        return Err(Error::InvalidInput(format!("{} must not be negative", value)));
    }
    Ok(value)
}

fn parse_positive(raw: &str) -> Result<i64> {
    let value = parse_non_negative(raw)?;
    if value == 0 {
        return Err(Error::InvalidInput("value must be at least 1".to_string()));
    }
    Ok(value)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::InvalidInput(format!(
            "'{}' is not 'true' or 'false'",
            other
        ))),
    }
}

fn parse_document_list(raw: &str) -> Result<Vec<DocumentType>> {
    let mut docs = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let doc = DocumentType::from_str(part)?;
        if !docs.contains(&doc) {
            docs.push(doc);
        }
    }
    Ok(docs)
}

/// Validate a proposed value for `key` against the current settings
///
/// Returns the normalized text to store.
pub fn validate_setting(key: &str, raw: &str, current: &RuntimeSettings) -> Result<String> {
    if !SETTING_DEFAULTS.iter().any(|(k, _)| *k == key) {
        return Err(Error::NotFound(format!("Unknown setting: {}", key)));
    }

    let mut candidate = current.clone();
    candidate
        .apply(key, raw)
        .map_err(|e| Error::InvalidInput(format!("{}: {}", key, e)))?;

    if candidate.proof_auto_reject_threshold > candidate.proof_auto_approve_threshold {
        return Err(Error::InvalidInput(format!(
            "{}: reject threshold ({}) must not exceed approve threshold ({})",
            key, candidate.proof_auto_reject_threshold, candidate.proof_auto_approve_threshold
        )));
    }

    let normalized = match key {
        KYC_REQUIRED_DOCUMENTS => candidate
            .kyc_required_documents
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(","),
        _ => raw.trim().to_string(),
    };

    Ok(normalized)
}

/// All stored settings, sorted by key
pub async fn list_settings<'e, E>(executor: E) -> Result<Vec<Setting>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Setting>(
        "SELECT key, COALESCE(value, '') AS value FROM settings ORDER BY key",
    )
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Load the typed runtime settings
pub async fn load_runtime_settings<'e, E>(executor: E) -> Result<RuntimeSettings>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(String, Option<String>)> = sqlx::query_as("SELECT key, value FROM settings")
        .fetch_all(executor)
        .await?;

    let values: HashMap<String, String> = rows
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect();

    Ok(RuntimeSettings::from_map(&values))
}

/// Validate and store one setting; returns the stored value
///
/// Takes a connection so the write can share the caller's transaction.
pub async fn update_setting(conn: &mut SqliteConnection, key: &str, raw: &str) -> Result<String> {
    let current = load_runtime_settings(&mut *conn).await?;
    let normalized = validate_setting(key, raw, &current)?;

    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(&normalized)
    .execute(&mut *conn)
    .await?;

    Ok(normalized)
}
