//! Business workflows that span several tables

pub mod kyc;
pub mod ledger;
pub mod proof_scorer;
pub mod proof_verification;
pub mod referrals;
pub mod review_requests;
pub mod withdrawals;
