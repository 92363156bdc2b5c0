//! Database bootstrap, models and runtime settings

pub mod init;
pub mod migrations;
pub mod models;
pub mod settings;

pub use init::*;
pub use migrations::*;
pub use models::*;
