//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{ProjectConfig, PROJECT_FILE};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENTRY: &str = "main";
pub const DEFAULT_BOUND_SUFFIX: &str = "$bound";
pub const DEFAULT_THUNK_SUFFIX: &str = "$thunk";
pub const DEFAULT_AUTOGENERATED_FILE: &str = "<autogenerated>";

/// Default resolver command: one `import/path=dir` line per package
/// reachable from the current directory.
pub const DEFAULT_RESOLVER_COMMAND: [&str; 6] = [
    "go",
    "list",
    "-deps",
    "-e",
    "-f={{.ImportPath}}={{.Dir}}",
    ".",
];

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.gossa/config.toml) - lowest priority
/// 2. Project config (./gossa.toml) - overrides global
/// 3. Environment variables (GOSSA_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where gossa.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Loader reading the global configuration from `path` instead of the
    /// home directory.
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find gossa.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;

        // Global config is optional
        let global_config = self.load_global_config()?;

        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); no file found is not an error
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.gossa/config.toml
    ///
    /// A missing file or an unknown home directory yields the defaults.
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(err) => return Err(err),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized: GOSSA_ENTRY, GOSSA_TRACE, GOSSA_DISABLE_RECOVER
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(entry) = env::var("GOSSA_ENTRY") {
            config.run_mut().entry = Some(entry);
        }

        if let Ok(trace) = env::var("GOSSA_TRACE") {
            config.run_mut().trace = Some(parse_bool("GOSSA_TRACE", &trace)?);
        }

        if let Ok(disable) = env::var("GOSSA_DISABLE_RECOVER") {
            config.run_mut().disable_recover = Some(parse_bool("GOSSA_DISABLE_RECOVER", &disable)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the global configuration directory (~/.gossa)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".gossa"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a boolean, got '{}'", value),
        }),
    }
}

impl Config {
    /// Effective entry function (project > default)
    pub fn entry(&self) -> &str {
        self.project.entry().unwrap_or(DEFAULT_ENTRY)
    }

    pub fn trace(&self) -> bool {
        self.project.trace().unwrap_or(false)
    }

    pub fn disable_recover(&self) -> bool {
        self.project.disable_recover().unwrap_or(false)
    }

    pub fn verbose_tests(&self) -> bool {
        self.project.verbose_tests().unwrap_or(false)
    }

    /// Effective wrapper suffix of method values (project > global > default)
    pub fn bound_suffix(&self) -> &str {
        self.introspection(|i| i.bound_suffix.as_deref())
            .unwrap_or(DEFAULT_BOUND_SUFFIX)
    }

    pub fn thunk_suffix(&self) -> &str {
        self.introspection(|i| i.thunk_suffix.as_deref())
            .unwrap_or(DEFAULT_THUNK_SUFFIX)
    }

    pub fn bound_is_autogenerated(&self) -> bool {
        self.introspection(|i| i.bound_is_autogenerated)
            .unwrap_or(true)
    }

    pub fn autogenerated_file(&self) -> &str {
        self.introspection(|i| i.autogenerated_file.as_deref())
            .unwrap_or(DEFAULT_AUTOGENERATED_FILE)
    }

    /// Effective resolver command (project > global > default)
    pub fn resolver_command(&self) -> Vec<String> {
        self.project
            .resolver
            .as_ref()
            .and_then(|r| r.command.clone())
            .or_else(|| self.global.resolver.as_ref().and_then(|r| r.command.clone()))
            .unwrap_or_else(|| DEFAULT_RESOLVER_COMMAND.iter().map(|s| s.to_string()).collect())
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has gossa.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    fn introspection<'a, T>(
        &'a self,
        get: impl Fn(&'a crate::IntrospectionConfig) -> Option<T>,
    ) -> Option<T> {
        self.project
            .introspection
            .as_ref()
            .and_then(&get)
            .or_else(|| self.global.introspection.as_ref().and_then(&get))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::with_global_path(dir.join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[run]\nentry = \"start\"\n");

        let config = isolated_loader(temp_dir.path())
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert_eq!(config.entry(), "start");
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[test]\nverbose = true\n");

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let config = isolated_loader(temp_dir.path())
            .load_from_directory(&sub_dir)
            .unwrap();

        assert!(config.verbose_tests());
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.entry(), "main");
        assert!(!config.trace());
        assert!(!config.disable_recover());
        assert_eq!(config.bound_suffix(), "$bound");
        assert_eq!(config.thunk_suffix(), "$thunk");
        assert!(config.bound_is_autogenerated());
        assert_eq!(config.autogenerated_file(), "<autogenerated>");
        assert_eq!(config.resolver_command()[..2], ["go".to_string(), "list".to_string()]);
    }

    #[test]
    #[serial]
    fn test_env_override_entry() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[run]\nentry = \"start\"\n");

        env::set_var("GOSSA_ENTRY", "other");
        let config = isolated_loader(temp_dir.path()).load_from_directory(temp_dir.path());
        env::remove_var("GOSSA_ENTRY");

        assert_eq!(config.unwrap().entry(), "other");
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_bad_boolean() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("GOSSA_TRACE", "sometimes");
        let result = isolated_loader(temp_dir.path()).load_from_directory(temp_dir.path());
        env::remove_var("GOSSA_TRACE");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_bool_forms() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "no").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
