//! Admin-side persistence helpers (sessions, audit log, user notifications)

pub mod admins;
pub mod audit;
pub mod notifications;
pub mod sessions;
