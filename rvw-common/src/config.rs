//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration only. Runtime settings live in the `settings`
//! table (see [`crate::db::settings`]).
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `RVW_ROOT_FOLDER` environment variable
//! 3. `root_folder` key in the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed TOML file never aborts startup: a warning is logged
//! and compiled defaults are used.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "RVW_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "reviewdesk.db";

/// Built-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub session_ttl_minutes: i64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_address: default_bind_address(),
            port: default_port(),
            session_ttl_minutes: default_session_ttl_minutes(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Cannot change while the service runs.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Admin session lifetime
    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: i64,

    /// Add the `Secure` attribute to session cookies (enable behind TLS)
    #[serde(default)]
    pub secure_cookies: bool,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// External proof scoring service; scoring is disabled when absent
    #[serde(default)]
    pub proof_scorer: Option<ProofScorerConfig>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            port: default_port(),
            session_ttl_minutes: default_session_ttl_minutes(),
            secure_cookies: false,
            logging: LoggingConfig::default(),
            proof_scorer: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Proof scoring endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProofScorerConfig {
    pub url: String,

    #[serde(default = "default_scorer_timeout_secs")]
    pub timeout_secs: u64,
}

/// Longest accepted admin session (30 days)
pub const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_session_ttl_minutes() -> i64 {
    480
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scorer_timeout_secs() -> u64 {
    10
}

impl TomlConfig {
    /// Parse TOML text, validating values that serde cannot
    pub fn parse(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;

        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&config.session_ttl_minutes) {
            return Err(Error::Config(format!(
                "session_ttl_minutes must be between 1 and {}, got {}",
                MAX_SESSION_TTL_MINUTES, config.session_ttl_minutes
            )));
        }
        if let Some(scorer) = &config.proof_scorer {
            if scorer.url.trim().is_empty() {
                return Err(Error::Config("proof_scorer.url is empty".to_string()));
            }
        }

        Ok(config)
    }

    /// Load configuration from an explicit path or the platform default path
    ///
    /// Never fails: missing or invalid files fall back to defaults with a warning.
    pub fn load(explicit_path: Option<&Path>) -> Self {
        let path = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => {
                    warn!("Could not determine config directory, using defaults");
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            if explicit_path.is_some() {
                warn!("Config file not found: {}, using defaults", path.display());
            } else {
                info!("No config file at {}, using defaults", path.display());
            }
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reviewdesk").join("config.toml"))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("reviewdesk"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\reviewdesk"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("reviewdesk"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/reviewdesk"))
    }
}

/// Where the resolved root folder came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFolderSource {
    CommandLine,
    Environment,
    ConfigFile,
    CompiledDefault,
}

/// Resolves the root folder following the 4-tier priority order
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_config(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        self.resolve_with_source().0
    }

    pub fn resolve_with_source(&self) -> (PathBuf, RootFolderSource) {
        if let Some(path) = &self.cli_arg {
            return (path.clone(), RootFolderSource::CommandLine);
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return (PathBuf::from(path), RootFolderSource::Environment);
            }
            warn!(
                "{}: {} is set but empty, ignoring",
                self.module_name, ROOT_FOLDER_ENV
            );
        }

        if let Some(path) = &self.toml_root {
            return (path.clone(), RootFolderSource::ConfigFile);
        }

        (
            CompiledDefaults::for_current_platform().root_folder,
            RootFolderSource::CompiledDefault,
        )
    }
}

/// Creates the root folder and locates files inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}
