//! CSV rendering for exports
//!
//! RFC 4180 output with CRLF line endings. Cells that a spreadsheet would
//! evaluate as a formula get a leading `'`.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use rvw_common::db::{Seller, Task, User, WalletTransaction, WithdrawalRequest};
use rvw_common::money::format_paise;

/// Most rows a single export returns
pub const MAX_EXPORT_ROWS: i64 = 50_000;

/// Quote or neutralize one cell
pub fn escape_field(value: &str) -> Cow<'_, str> {
    let formula = matches!(
        value.chars().next(),
        Some('=' | '+' | '-' | '@' | '\t' | '\r')
    );
    let needs_quotes = value.contains([',', '"', '\r', '\n']);

    if !formula && !needs_quotes {
        return Cow::Borrowed(value);
    }

    let mut cell = String::with_capacity(value.len() + 3);
    if formula {
        cell.push('\'');
    }
    cell.push_str(value);

    if needs_quotes {
        Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        Cow::Owned(cell)
    }
}

/// Accumulates CSV records in memory
#[derive(Debug, Default)]
pub struct CsvWriter {
    out: String,
}

impl CsvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_record<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.out.push_str(&escape_field(field.as_ref()));
        }
        self.out.push_str("\r\n");
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// An exportable row type
pub trait CsvRow {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

/// Header plus one record per row
pub fn render<T: CsvRow>(rows: &[T]) -> String {
    let mut writer = CsvWriter::new();
    writer.write_record(T::HEADER);
    for row in rows {
        writer.write_record(row.fields());
    }
    writer.finish()
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn optional_timestamp(ts: &Option<DateTime<Utc>>) -> String {
    ts.as_ref().map(timestamp).unwrap_or_default()
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

impl CsvRow for User {
    const HEADER: &'static [&'static str] = &[
        "id",
        "name",
        "email",
        "phone",
        "referral_code",
        "referred_by",
        "wallet_balance_rupees",
        "status",
        "kyc_status",
        "created_at",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.email.clone(),
            optional(&self.phone),
            self.referral_code.clone(),
            optional(&self.referred_by),
            format_paise(self.wallet_balance_paise),
            self.status.to_string(),
            self.kyc_status.to_string(),
            timestamp(&self.created_at),
        ]
    }
}

impl CsvRow for Seller {
    const HEADER: &'static [&'static str] = &[
        "id",
        "name",
        "email",
        "company_name",
        "gst_number",
        "is_verified",
        "status",
        "created_at",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.email.clone(),
            self.company_name.clone(),
            optional(&self.gst_number),
            self.is_verified.to_string(),
            self.status.to_string(),
            timestamp(&self.created_at),
        ]
    }
}

impl CsvRow for Task {
    const HEADER: &'static [&'static str] = &[
        "id",
        "review_request_id",
        "user_id",
        "status",
        "proof_url",
        "ai_confidence",
        "auto_verified",
        "submitted_at",
        "reviewed_by",
        "reviewed_at",
        "rejection_reason",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.review_request_id.to_string(),
            self.user_id.to_string(),
            self.status.to_string(),
            optional(&self.proof_url),
            self.ai_confidence
                .map(|c| format!("{:.4}", c))
                .unwrap_or_default(),
            self.auto_verified.to_string(),
            optional_timestamp(&self.submitted_at),
            optional(&self.reviewed_by),
            optional_timestamp(&self.reviewed_at),
            optional(&self.rejection_reason),
        ]
    }
}

impl CsvRow for WalletTransaction {
    const HEADER: &'static [&'static str] = &[
        "id",
        "user_id",
        "amount_rupees",
        "balance_after_rupees",
        "source",
        "reference",
        "note",
        "created_by",
        "created_at",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.user_id.to_string(),
            format_paise(self.amount_paise),
            format_paise(self.balance_after_paise),
            self.source.to_string(),
            optional(&self.reference),
            optional(&self.note),
            optional(&self.created_by),
            timestamp(&self.created_at),
        ]
    }
}

impl CsvRow for WithdrawalRequest {
    const HEADER: &'static [&'static str] = &[
        "id",
        "user_id",
        "amount_rupees",
        "method",
        "account_details",
        "status",
        "rejection_reason",
        "payout_reference",
        "processed_by",
        "processed_at",
        "requested_at",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.user_id.to_string(),
            format_paise(self.amount_paise),
            self.method.to_string(),
            self.account_details.clone(),
            self.status.to_string(),
            optional(&self.rejection_reason),
            optional(&self.payout_reference),
            optional(&self.processed_by),
            optional_timestamp(&self.processed_at),
            timestamp(&self.requested_at),
        ]
    }
}
