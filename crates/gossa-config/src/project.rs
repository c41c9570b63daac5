//! Project Configuration (gossa.toml)
//!
//! Handles project-level configuration stored in `gossa.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the project configuration file.
pub const PROJECT_FILE: &str = "gossa.toml";

/// Project configuration from gossa.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// How programs are run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunConfig>,

    /// Wrapper naming conventions of the SSA front end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection: Option<IntrospectionConfig>,

    /// Import-path resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverConfig>,

    /// Test runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<TestConfig>,
}

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Entry function of the main package (default: "main")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Log every executed instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,

    /// Surface unrecovered panics as errors instead of exit code 2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_recover: Option<bool>,
}

/// Introspection configuration. Shared with the global file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct IntrospectionConfig {
    /// Suffix of method-value wrappers (default: "$bound")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_suffix: Option<String>,

    /// Suffix of interface thunks (default: "$thunk")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thunk_suffix: Option<String>,

    /// Whether method-value wrappers report as autogenerated (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_is_autogenerated: Option<bool>,

    /// File reported for autogenerated functions (default: "<autogenerated>")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autogenerated_file: Option<String>,
}

/// Resolver configuration. Shared with the global file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Command listing `import/path=dir` lines for the module root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

/// Test configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Report every test, not only failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(entry) = self.run.as_ref().and_then(|r| r.entry.as_deref()) {
            if !is_identifier(entry) {
                return Err(ConfigError::InvalidValue {
                    field: "run.entry".to_string(),
                    reason: format!("'{}' is not a function name", entry),
                });
            }
        }
        if let Some(introspection) = &self.introspection {
            introspection.validate("introspection")?;
        }
        if let Some(resolver) = &self.resolver {
            resolver.validate("resolver")?;
        }
        Ok(())
    }

    pub fn entry(&self) -> Option<&str> {
        self.run.as_ref().and_then(|r| r.entry.as_deref())
    }

    pub fn trace(&self) -> Option<bool> {
        self.run.as_ref().and_then(|r| r.trace)
    }

    pub fn disable_recover(&self) -> Option<bool> {
        self.run.as_ref().and_then(|r| r.disable_recover)
    }

    pub fn verbose_tests(&self) -> Option<bool> {
        self.test.as_ref().and_then(|t| t.verbose)
    }

    /// Run section, created on first write.
    pub fn run_mut(&mut self) -> &mut RunConfig {
        self.run.get_or_insert_with(RunConfig::default)
    }

    /// Merge another project config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ProjectConfig) {
        if other.run.is_some() {
            self.run = other.run.clone();
        }
        merge_section(&mut self.introspection, &other.introspection, IntrospectionConfig::merge);
        merge_section(&mut self.resolver, &other.resolver, ResolverConfig::merge);
        if other.test.is_some() {
            self.test = other.test.clone();
        }
    }
}

impl IntrospectionConfig {
    pub(crate) fn validate(&self, section: &str) -> ConfigResult<()> {
        for (key, value) in [
            ("bound_suffix", &self.bound_suffix),
            ("thunk_suffix", &self.thunk_suffix),
        ] {
            if value.as_deref() == Some("") {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.{}", section, key),
                    reason: "suffix cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Field-wise merge; `other` wins where it is set.
    pub fn merge(&mut self, other: &IntrospectionConfig) {
        if other.bound_suffix.is_some() {
            self.bound_suffix = other.bound_suffix.clone();
        }
        if other.thunk_suffix.is_some() {
            self.thunk_suffix = other.thunk_suffix.clone();
        }
        if other.bound_is_autogenerated.is_some() {
            self.bound_is_autogenerated = other.bound_is_autogenerated;
        }
        if other.autogenerated_file.is_some() {
            self.autogenerated_file = other.autogenerated_file.clone();
        }
    }
}

impl ResolverConfig {
    pub(crate) fn validate(&self, section: &str) -> ConfigResult<()> {
        match &self.command {
            Some(command) if command.is_empty() || command[0].is_empty() => {
                Err(ConfigError::InvalidValue {
                    field: format!("{}.command", section),
                    reason: "command cannot be empty".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn merge(&mut self, other: &ResolverConfig) {
        if other.command.is_some() {
            self.command = other.command.clone();
        }
    }
}

/// Merges an optional section field by field.
pub(crate) fn merge_section<T: Clone>(
    base: &mut Option<T>,
    other: &Option<T>,
    merge: fn(&mut T, &T),
) {
    match (base.as_mut(), other) {
        (Some(base), Some(other)) => merge(base, other),
        (None, Some(other)) => *base = Some(other.clone()),
        _ => {}
    }
}

/// Go identifier: a letter or underscore, then letters, digits or underscores.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_project_config() {
        let toml = r#"
[run]
entry = "start"
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.entry(), Some("start"));
        assert_eq!(config.trace(), None);
    }

    #[test]
    fn test_parse_full_project_config() {
        let toml = r#"
[run]
entry = "main"
trace = true
disable_recover = false

[introspection]
bound_suffix = "$bound"
thunk_suffix = "$thunk"
bound_is_autogenerated = false
autogenerated_file = "<autogenerated>"

[resolver]
command = ["go", "list", "-deps", "-f={{.ImportPath}}={{.Dir}}", "."]

[test]
verbose = true
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.trace(), Some(true));
        assert_eq!(config.disable_recover(), Some(false));
        assert_eq!(config.verbose_tests(), Some(true));
        assert_eq!(
            config.introspection.as_ref().and_then(|i| i.bound_is_autogenerated),
            Some(false)
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let toml = r#"
[run]
entrypoint = "main"
"#;
        assert!(toml::from_str::<ProjectConfig>(toml).is_err());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_identifier("main"));
        assert!(is_identifier("_start"));
        assert!(is_identifier("run2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2run"));
        assert!(!is_identifier("main.main"));
    }

    #[test]
    fn test_empty_suffix_is_invalid() {
        let config = ProjectConfig {
            introspection: Some(IntrospectionConfig {
                thunk_suffix: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_resolver_command_is_invalid() {
        let config = ProjectConfig {
            resolver: Some(ResolverConfig {
                command: Some(vec![]),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_configs() {
        let mut base = ProjectConfig {
            introspection: Some(IntrospectionConfig {
                bound_suffix: Some("$b".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let override_config = ProjectConfig {
            run: Some(RunConfig {
                entry: Some("start".to_string()),
                ..Default::default()
            }),
            introspection: Some(IntrospectionConfig {
                thunk_suffix: Some("$t".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        base.merge(&override_config);
        assert_eq!(base.entry(), Some("start"));
        let introspection = base.introspection.unwrap();
        assert_eq!(introspection.bound_suffix.as_deref(), Some("$b"));
        assert_eq!(introspection.thunk_suffix.as_deref(), Some("$t"));
    }
}
