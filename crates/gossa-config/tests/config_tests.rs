//! Configuration loading and precedence tests

use gossa_config::{ConfigError, ConfigLoader, ProjectConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("gossa.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

fn create_global_file(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("global.toml");
    fs::write(&path, content).unwrap();
    path
}

/// Loader that never reads the real home directory.
fn loader(dir: &Path) -> ConfigLoader {
    ConfigLoader::with_global_path(dir.join("missing-global.toml"))
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let config = loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert_eq!(config.entry(), "main");
}

#[test]
#[serial]
fn test_load_from_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[run]\nentry = \"serve\"\n");

    let sub2 = temp_dir.path().join("sub1").join("sub2");
    fs::create_dir_all(&sub2).unwrap();

    let config = loader(temp_dir.path()).load_from_directory(&sub2).unwrap();

    assert_eq!(config.entry(), "serve");
    assert_eq!(config.project_root(), Some(temp_dir.path()));
}

#[test]
#[serial]
fn test_load_with_empty_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    let config = loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    // Every section is optional
    assert!(config.is_project());
    assert_eq!(config.project, ProjectConfig::default());
}

#[test]
#[serial]
fn test_load_from_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[test]\nverbose = true\n");

    let config = loader(temp_dir.path()).load_from_file(&path).unwrap();

    assert!(config.verbose_tests());
    assert_eq!(config.project_root(), Some(temp_dir.path()));
}

#[test]
#[serial]
fn test_missing_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = loader(temp_dir.path()).load_from_file(&temp_dir.path().join("gossa.toml"));

    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test]
#[serial]
fn test_invalid_toml_syntax() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[run\nentry = ");

    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[rstest]
#[serial]
#[case("[run]\nentrypoint = \"main\"\n")]
#[case("[runner]\nentry = \"main\"\n")]
#[case("[introspection]\nwrapper = \"$w\"\n")]
fn test_unknown_fields_rejected(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), content);

    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[rstest]
#[serial]
#[case("[run]\nentry = \"main.main\"\n", "run.entry")]
#[case("[introspection]\nbound_suffix = \"\"\n", "introspection.bound_suffix")]
#[case("[resolver]\ncommand = []\n", "resolver.command")]
fn test_invalid_values(#[case] content: &str, #[case] field: &str) {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), content);

    match loader(temp_dir.path()).load_from_directory(temp_dir.path()) {
        Err(ConfigError::InvalidValue { field: got, .. }) => assert_eq!(got, field),
        other => panic!("expected InvalidValue, got {:?}", other),
    }
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_global_supplies_introspection_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let global = create_global_file(
        temp_dir.path(),
        "[introspection]\nbound_suffix = \"$method\"\nautogenerated_file = \"<gen>\"\n",
    );

    let config = ConfigLoader::with_global_path(global)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.bound_suffix(), "$method");
    assert_eq!(config.autogenerated_file(), "<gen>");
    assert_eq!(config.thunk_suffix(), "$thunk");
}

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp_dir = TempDir::new().unwrap();
    let global = create_global_file(
        temp_dir.path(),
        "[introspection]\nbound_suffix = \"$method\"\n\n[resolver]\ncommand = [\"global-list\"]\n",
    );
    create_config_file(
        temp_dir.path(),
        "[introspection]\nbound_suffix = \"$bnd\"\n\n[resolver]\ncommand = [\"project-list\", \".\"]\n",
    );

    let config = ConfigLoader::with_global_path(global)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.bound_suffix(), "$bnd");
    assert_eq!(
        config.resolver_command(),
        vec!["project-list".to_string(), ".".to_string()]
    );
}

#[test]
#[serial]
fn test_invalid_global_config_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let global = create_global_file(temp_dir.path(), "[run]\nentry = \"main\"\n");

    let result = ConfigLoader::with_global_path(global).load_from_directory(temp_dir.path());

    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

// ============================================================================
// Environment Variable Override Tests
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_project() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        "[run]\nentry = \"start\"\ntrace = false\ndisable_recover = false\n",
    );

    env::set_var("GOSSA_ENTRY", "other");
    env::set_var("GOSSA_TRACE", "1");
    env::set_var("GOSSA_DISABLE_RECOVER", "yes");
    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("GOSSA_ENTRY");
    env::remove_var("GOSSA_TRACE");
    env::remove_var("GOSSA_DISABLE_RECOVER");

    let config = result.unwrap();
    assert_eq!(config.entry(), "other");
    assert!(config.trace());
    assert!(config.disable_recover());
}

#[test]
#[serial]
fn test_env_applies_without_project_file() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("GOSSA_DISABLE_RECOVER", "true");
    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("GOSSA_DISABLE_RECOVER");

    let config = result.unwrap();
    assert!(!config.is_project());
    assert!(config.disable_recover());
}

#[test]
#[serial]
fn test_invalid_env_entry_rejected() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("GOSSA_ENTRY", "not a name");
    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("GOSSA_ENTRY");

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}
