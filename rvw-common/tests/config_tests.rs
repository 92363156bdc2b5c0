//! Tests for configuration loading and root folder resolution
//!
//! Tests that manipulate RVW_ROOT_FOLDER are marked #[serial] so they do not
//! race each other on the process environment.

use rvw_common::config::{
    CompiledDefaults, RootFolderInitializer, RootFolderResolver, RootFolderSource, TomlConfig,
    MAX_SESSION_TTL_MINUTES, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let (root, source) = RootFolderResolver::new("test").resolve_with_source();

    assert_eq!(source, RootFolderSource::CompiledDefault);
    assert_eq!(root, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/rvw-test-env-folder");

    let (root, source) = RootFolderResolver::new("test").resolve_with_source();
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(source, RootFolderSource::Environment);
    assert_eq!(root, PathBuf::from("/tmp/rvw-test-env-folder"));
}

#[test]
#[serial]
fn test_resolver_cli_beats_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/rvw-from-env");
    let config = TomlConfig::parse("root_folder = \"/tmp/rvw-from-toml\"").unwrap();

    let (root, source) = RootFolderResolver::new("test")
        .with_cli_arg(Some(PathBuf::from("/tmp/rvw-from-cli")))
        .with_config(&config)
        .resolve_with_source();
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(source, RootFolderSource::CommandLine);
    assert_eq!(root, PathBuf::from("/tmp/rvw-from-cli"));
}

#[test]
#[serial]
fn test_resolver_toml_used_without_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);
    let config = TomlConfig::parse("root_folder = \"/tmp/rvw-from-toml\"").unwrap();

    let (root, source) = RootFolderResolver::new("test")
        .with_config(&config)
        .resolve_with_source();

    assert_eq!(source, RootFolderSource::ConfigFile);
    assert_eq!(root, PathBuf::from("/tmp/rvw-from-toml"));
}

#[test]
fn test_load_missing_file_returns_defaults() {
    let dir = TempDir::new().unwrap();
    let config = TomlConfig::load(Some(&dir.path().join("absent.toml")));
    assert_eq!(config.port, 5780);
    assert!(config.root_folder.is_none());
}

#[test]
fn test_load_invalid_file_returns_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let config = TomlConfig::load(Some(&path));
    assert_eq!(config.port, 5780);
}

#[test]
fn test_session_ttl_is_bounded() {
    assert!(TomlConfig::parse("session_ttl_minutes = 0").is_err());
    assert!(TomlConfig::parse("session_ttl_minutes = 9223372036854775807").is_err());
    assert!(TomlConfig::parse("session_ttl_minutes = 43201").is_err());

    let config = TomlConfig::parse("session_ttl_minutes = 43200").unwrap();
    assert_eq!(config.session_ttl_minutes, MAX_SESSION_TTL_MINUTES);
}

#[test]
fn test_load_valid_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 6001\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config = TomlConfig::load(Some(&path));
    assert_eq!(config.port, 6001);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_initializer_creates_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("a").join("b");

    let init = RootFolderInitializer::new(root.clone());
    init.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(init.database_path(), root.join("reviewdesk.db"));
}
