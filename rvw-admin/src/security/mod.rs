//! Credential, token and permission primitives
//!
//! Pure functions only; the HTTP layer lives in `api::auth`.

pub mod password;
pub mod permissions;
pub mod tokens;

pub use password::{generate_password, hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use permissions::{require, Permission};
pub use tokens::{constant_time_eq, generate_token, hash_token};
