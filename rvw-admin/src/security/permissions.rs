//! Role-based permissions
//!
//! Every role may read everything; roles differ only in what they may change.

use rvw_common::db::models::AdminRole;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Review requests, task proofs, sellers, announcements
    ModerateContent,
    /// Block and unblock users
    ManageUsers,
    ReviewKyc,
    SendNotifications,
    /// Wallet adjustments, withdrawals, commission tiers
    ManageFinance,
    ExportData,
    ManageAdmins,
    ManageSettings,
}

impl Permission {
    pub fn name(&self) -> &'static str {
        match self {
            Permission::ModerateContent => "moderate_content",
            Permission::ManageUsers => "manage_users",
            Permission::ReviewKyc => "review_kyc",
            Permission::SendNotifications => "send_notifications",
            Permission::ManageFinance => "manage_finance",
            Permission::ExportData => "export_data",
            Permission::ManageAdmins => "manage_admins",
            Permission::ManageSettings => "manage_settings",
        }
    }
}

pub fn allows(role: AdminRole, permission: Permission) -> bool {
    use Permission::*;
    match role {
        AdminRole::SuperAdmin => true,
        AdminRole::Moderator => matches!(
            permission,
            ModerateContent | ManageUsers | ReviewKyc | SendNotifications
        ),
        AdminRole::Finance => matches!(permission, ManageFinance | ExportData),
    }
}

/// Fail with 403 unless `role` grants `permission`
pub fn require(role: AdminRole, permission: Permission) -> ApiResult<()> {
    if allows(role, permission) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Role '{}' lacks permission '{}'",
            role,
            permission.name()
        )))
    }
}
