//! Process exit codes and error reporting.

use colored::Colorize;
use gossa_runtime::{LoadError, RunError, RuntimeError};
use std::process::ExitCode;

/// Generic failure, and any FAIL in test mode.
pub const FAILURE: i32 = 1;
/// Unrecovered panic surfaced as an error.
pub const PANIC: i32 = 2;
/// Malformed or unreadable unit.
pub const PARSE_FAILURE: i32 = 10;
/// Program does not link: failed sanity check or unresolved import.
pub const LINK_FAILURE: i32 = 11;
/// Input is not a main package.
pub const NOT_MAIN: i32 = 12;

/// Prints `err` with its context chain.
pub fn report(err: &anyhow::Error) {
    eprintln!("{} {:#}", "error:".red().bold(), err);
}

/// Exit code for a failed command.
pub fn classify(err: &anyhow::Error) -> i32 {
    if let Some(run) = err.downcast_ref::<RunError>() {
        return match run {
            RunError::ExitCode { code, .. } => *code,
            RunError::Load(load) => load_code(load),
            RunError::Runtime(runtime) => runtime_code(runtime),
        };
    }
    if let Some(load) = err.downcast_ref::<LoadError>() {
        return load_code(load);
    }
    if let Some(runtime) = err.downcast_ref::<RuntimeError>() {
        return runtime_code(runtime);
    }
    FAILURE
}

fn load_code(err: &LoadError) -> i32 {
    match err {
        LoadError::Io { .. } | LoadError::Parse { .. } => PARSE_FAILURE,
        LoadError::NotFoundMainPackage => NOT_MAIN,
        _ => LINK_FAILURE,
    }
}

fn runtime_code(err: &RuntimeError) -> i32 {
    match err {
        RuntimeError::UnresolvedExternalSymbol { .. } => LINK_FAILURE,
        RuntimeError::Panic { .. } => PANIC,
        _ => FAILURE,
    }
}

/// Converts an interpreted exit code to a process exit code. Only the low
/// byte survives, as with a native process.
pub fn code(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn classify_run(err: RunError) -> i32 {
        classify(&anyhow::Error::from(err))
    }

    #[test]
    fn test_exit_code_passes_through() {
        let err = RunError::ExitCode {
            input: "main.ssa".to_string(),
            code: 7,
        };
        assert_eq!(classify_run(err), 7);
    }

    #[test]
    fn test_load_failures() {
        let parse = LoadError::Parse {
            file: PathBuf::from("bad.ssa"),
            message: "expected value".to_string(),
        };
        assert_eq!(classify_run(parse.into()), PARSE_FAILURE);
        assert_eq!(classify_run(LoadError::NotFoundMainPackage.into()), NOT_MAIN);
        let missing = LoadError::ImportNotFound {
            path: "ex/lib".to_string(),
            from: "main".to_string(),
        };
        assert_eq!(classify_run(missing.into()), LINK_FAILURE);
    }

    #[test]
    fn test_runtime_failures() {
        let unresolved = RuntimeError::UnresolvedExternalSymbol {
            name: "C.puts".to_string(),
        };
        assert_eq!(classify_run(unresolved.into()), LINK_FAILURE);
        let panic = RuntimeError::Panic {
            value: "boom".to_string(),
        };
        assert_eq!(classify_run(panic.into()), PANIC);
    }

    #[test]
    fn test_context_keeps_classification() {
        let err = anyhow::Error::from(RunError::from(LoadError::NotFoundMainPackage))
            .context("loading ./lib");
        assert_eq!(classify(&err), NOT_MAIN);
    }

    #[test]
    fn test_other_errors_are_generic_failures() {
        assert_eq!(classify(&anyhow::anyhow!("no packages")), FAILURE);
    }
}
