//! CLI configuration: environment switches, logging and the loaded
//! `gossa.toml` settings.

use anyhow::{anyhow, Context, Result};
use gossa_config::{Config, ConfigLoader};
use std::env;
use tracing_subscriber::EnvFilter;

/// Log filter variable.
pub const LOG_ENV: &str = "GOSSA_LOG";

/// Filter used when `GOSSA_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Switches read from the environment before anything else runs.
#[derive(Debug, Clone, Default)]
pub struct CliEnv {
    /// `GOSSA_LOG`
    pub log_filter: Option<String>,
    /// `NO_COLOR`
    pub no_color: bool,
}

impl CliEnv {
    pub fn from_env() -> Self {
        Self {
            log_filter: env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty()),
            no_color: env::var_os("NO_COLOR").is_some(),
        }
    }

    /// The filter to install; `trace` raises the runtime to trace level.
    pub fn filter(&self, trace: bool) -> Result<EnvFilter> {
        let spec = self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
        let mut filter = EnvFilter::try_new(spec)
            .with_context(|| format!("invalid {} filter: {}", LOG_ENV, spec))?;
        if trace {
            filter = filter.add_directive("gossa_runtime=trace".parse()?);
        }
        Ok(filter)
    }
}

/// Installs the global subscriber. Logs go to stderr so they never mix with
/// the interpreted program's stdout.
pub fn init_logging(env: &CliEnv, trace: bool) -> Result<()> {
    let filter = env.filter(trace)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {}", e))
}

/// Loads the configuration that applies to the current directory.
pub fn load_settings() -> Result<Config> {
    let cwd = env::current_dir().context("cannot determine the current directory")?;
    ConfigLoader::new()
        .load_from_directory(&cwd)
        .context("failed to load configuration")
}
