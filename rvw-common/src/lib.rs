//! # Reviewdesk Common Library
//!
//! Shared code for the Reviewdesk admin backend:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Database bootstrap (schema, migrations, default settings)
//! - Domain models and runtime settings
//! - Money and identity-number helpers

pub mod config;
pub mod db;
pub mod error;
pub mod money;
pub mod validation;

pub use error::{Error, Result};
