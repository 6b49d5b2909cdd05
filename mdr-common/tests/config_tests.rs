//! Root folder resolution and config file loading

use mdr_common::config::{
    resolve_root_folder, AppPaths, TomlConfig, DEFAULT_DATABASE_FILE, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn cli_argument_wins_over_env_and_toml() {
    std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/from/cli")), &toml);
    assert_eq!(resolved, PathBuf::from("/from/cli"));

    std::env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn env_wins_over_toml() {
    std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/from/env"));

    std::env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn toml_used_when_env_blank() {
    std::env::set_var(ROOT_FOLDER_ENV, "  ");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/from/toml"));

    std::env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn falls_back_to_os_default() {
    std::env::remove_var(ROOT_FOLDER_ENV);
    let resolved = resolve_root_folder(None, &TomlConfig::default());
    assert!(resolved.ends_with("mdr") || resolved.ends_with("mdr_data"));
}

#[test]
fn invalid_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = [not toml").unwrap();

    let config = TomlConfig::load_or_default(&path);
    assert_eq!(config.root_folder, None);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn app_paths_created_under_root() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("mdr-root");
    let paths = AppPaths::resolve(root.clone(), &TomlConfig::default());

    assert_eq!(paths.database_path, root.join(DEFAULT_DATABASE_FILE));
    paths.ensure_root_exists().unwrap();
    assert!(root.is_dir());
}
