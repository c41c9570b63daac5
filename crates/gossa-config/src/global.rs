//! Global Configuration (~/.gossa/config.toml)
//!
//! Handles user-level defaults stored in `~/.gossa/config.toml`. Only the
//! sections that describe the toolchain, not a program, live here.

use crate::project::{merge_section, IntrospectionConfig, ResolverConfig};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.gossa/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection: Option<IntrospectionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverConfig>,
}

impl GlobalConfig {
    /// Load global configuration from a file
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

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(introspection) = &self.introspection {
            introspection.validate("introspection")?;
        }
        if let Some(resolver) = &self.resolver {
            resolver.validate("resolver")?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.gossa/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".gossa").join("config.toml"))
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        merge_section(&mut self.introspection, &other.introspection, IntrospectionConfig::merge);
        merge_section(&mut self.resolver, &other.resolver, ResolverConfig::merge);
    }
}
