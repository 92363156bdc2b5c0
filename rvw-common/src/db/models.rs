//! Database models
//!
//! Status-like columns are TEXT in SQLite and map to the enums below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::Error;

/// Declares a TEXT-backed enum with matching serde/sqlx names
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[serde(rename_all = "snake_case")]
        #[sqlx(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "Invalid {}: '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Admin role; governs which mutating actions are allowed
    AdminRole {
        SuperAdmin => "super_admin",
        Moderator => "moderator",
        Finance => "finance",
    }
);

text_enum!(UserStatus {
    Active => "active",
    Blocked => "blocked",
});

text_enum!(KycStatus {
    None => "none",
    Pending => "pending",
    Verified => "verified",
    Rejected => "rejected",
});

text_enum!(SellerStatus {
    Active => "active",
    Suspended => "suspended",
});

text_enum!(ReviewRequestStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Paused => "paused",
    Completed => "completed",
});

text_enum!(TaskStatus {
    Assigned => "assigned",
    Submitted => "submitted",
    Approved => "approved",
    Rejected => "rejected",
});

text_enum!(DocumentType {
    Pan => "pan",
    Aadhaar => "aadhaar",
    BankAccount => "bank_account",
});

impl DocumentType {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Pan => "PAN",
            DocumentType::Aadhaar => "Aadhaar number",
            DocumentType::BankAccount => "bank account number",
        }
    }
}

text_enum!(DocumentStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

text_enum!(
    /// Why a wallet balance changed
    TransactionSource {
        TaskReward => "task_reward",
        ReferralCommission => "referral_commission",
        AdminAdjustment => "admin_adjustment",
        Withdrawal => "withdrawal",
    }
);

text_enum!(WithdrawalStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Paid => "paid",
});

text_enum!(PayoutMethod {
    Upi => "upi",
    BankTransfer => "bank_transfer",
});

text_enum!(Audience {
    All => "all",
    Users => "users",
    Sellers => "sellers",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<i64>,
    pub wallet_balance_paise: i64,
    pub status: UserStatus,
    pub blocked_reason: Option<String>,
    pub kyc_status: KycStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Seller {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub company_name: String,
    pub gst_number: Option<String>,
    pub is_verified: bool,
    pub status: SellerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewRequest {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    pub description: String,
    pub platform: String,
    pub product_url: String,
    pub reward_paise: i64,
    pub total_slots: i64,
    pub filled_slots: i64,
    pub status: ReviewRequestStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub review_request_id: i64,
    pub user_id: i64,
    pub status: TaskStatus,
    pub proof_url: Option<String>,
    pub proof_text: Option<String>,
    pub ai_confidence: Option<f64>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub auto_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct KycDocument {
    pub id: i64,
    pub user_id: i64,
    pub document_type: DocumentType,
    pub document_number: String,
    pub document_url: String,
    pub status: DocumentStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WalletTransaction {
    pub id: i64,
    pub user_id: i64,
    /// Signed: credits positive, debits negative
    pub amount_paise: i64,
    pub balance_after_paise: i64,
    pub source: TransactionSource,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub user_id: i64,
    pub amount_paise: i64,
    pub method: PayoutMethod,
    pub account_details: String,
    pub status: WithdrawalStatus,
    pub rejection_reason: Option<String>,
    pub payout_reference: Option<String>,
    pub processed_by: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct ReferralTier {
    pub level: i64,
    pub commission_bps: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferralCommission {
    pub id: i64,
    pub beneficiary_id: i64,
    pub source_user_id: i64,
    pub task_id: i64,
    pub level: i64,
    pub amount_paise: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Announcement {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub audience: Audience,
    pub is_active: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub admin_id: i64,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<i64>,
    pub details: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}
