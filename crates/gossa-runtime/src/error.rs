//! Error types of the runtime.
//!
//! Interpreted panics are not errors here: they travel through the engine as
//! [`crate::interp::Unwind`] values and only surface as an exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal engine errors. These indicate a defect in the loaded program or in
/// the registration of external functions, never a user-level panic.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("unresolved external symbol: {name}")]
    UnresolvedExternalSymbol { name: String },

    #[error("corrupt call stack: {function} at offset {offset} outside [0, {len}]")]
    CorruptCallStack {
        function: String,
        offset: u32,
        len: u32,
    },

    #[error("cannot call {name}: {message}")]
    Marshal { name: String, message: String },

    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("unknown global: {name}")]
    UnknownGlobal { name: String },

    #[error("invalid operand in {function}: {message}")]
    InvalidOperand { function: String, message: String },

    #[error("no entry function {entry} in package {package}")]
    NoEntry { package: String, entry: String },

    #[error("failed to spawn goroutine: {0}")]
    Spawn(String),

    #[error("panic: {value}")]
    Panic { value: String },
}

/// Load-time errors.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: malformed SSA unit: {message}")]
    Parse { file: PathBuf, message: String },

    #[error("{function}: {message}")]
    Invalid { function: String, message: String },

    #[error("cannot find package \"{path}\" imported by {from}")]
    ImportNotFound { path: String, from: String },

    #[error("import cycle not allowed: {}", cycle.join(" -> "))]
    ImportCycle { cycle: Vec<String> },

    #[error("not found main package")]
    NotFoundMainPackage,

    #[error("not found package: {path}")]
    NotFoundPackage { path: String },

    #[error("package resolver failed: {message}")]
    Resolver { message: String },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error comes from malformed input rather than from how the
    /// packages fit together.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, LoadError::Parse { .. } | LoadError::Io { .. })
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Errors reported by the driver.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("interpreting {input}: exit code was {code}")]
    ExitCode { input: String, code: i32 },
}

impl RunError {
    /// Exit code the interpreted program asked for, if that is what failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunError::ExitCode { code, .. } => Some(*code),
            _ => None,
        }
    }
}
