//! Run command - interpret a unit file or a main package

use anyhow::{Context, Result};
use gossa_config::Config;
use gossa_runtime::RunError;
use std::io::{self, Write};
use tracing::debug;

/// Arguments for the run command
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    /// Unit file or package directory
    pub input: String,
    /// Arguments seen by the interpreted program after `os.Args[0]`
    pub args: Vec<String>,
    pub trace: bool,
    /// Print the instruction listing before running
    pub dump_instrs: bool,
    /// Print the loaded packages before running
    pub dump_packages: bool,
    /// Overrides the configured entry function
    pub entry: Option<String>,
}

/// Runs the program and returns the exit code it asked for.
pub fn run(args: RunArgs, settings: &Config) -> Result<i32> {
    let mut builder = super::driver_builder(settings, args.trace, args.dump_instrs);
    if let Some(entry) = &args.entry {
        builder = builder.entry(entry.as_str());
    }
    let driver = builder.build();

    let program = driver
        .load(&args.input)
        .map_err(RunError::from)
        .with_context(|| format!("loading {}", args.input))?;

    if args.dump_packages {
        let mut out = io::stdout().lock();
        for pkg in program.packages() {
            writeln!(out, "{}\t{}", pkg.name, pkg.path)?;
        }
        out.flush()?;
    }

    match driver.run_pkg(program, &args.input, driver.entry(), &args.args) {
        Ok(()) => Ok(0),
        Err(RunError::ExitCode { code, .. }) => {
            debug!(input = %args.input, code, "program exited");
            Ok(code)
        }
        Err(err) => Err(err).with_context(|| format!("running {}", args.input)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit;
    use gossa_runtime::ssa::{FunctionBuilder, Instr, Operand, UnitBuilder};
    use tempfile::TempDir;

    fn exit_unit(code: i64) -> String {
        UnitBuilder::new("main", "main", "exit.go")
            .import("os")
            .function(
                FunctionBuilder::new("main.main")
                    .instr(Instr::call(None, "os.Exit", vec![Operand::int(code)]))
                    .ret()
                    .build(),
            )
            .build()
            .to_json()
            .unwrap()
    }

    fn args_for(input: &std::path::Path) -> RunArgs {
        RunArgs {
            input: input.display().to_string(),
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_run_returns_program_exit_code() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("exit.ssa");
        std::fs::write(&file, exit_unit(5)).unwrap();

        let code = run(args_for(&file), &Config::default()).unwrap();
        assert_eq!(code, 5);
    }

    #[test]
    fn test_run_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = run(args_for(&tmp.path().join("absent.ssa")), &Config::default()).unwrap_err();
        assert_eq!(exit::classify(&err), exit::PARSE_FAILURE);
        assert!(format!("{:#}", err).starts_with("loading "));
    }

    #[test]
    fn test_run_unknown_entry() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("exit.ssa");
        std::fs::write(&file, exit_unit(0)).unwrap();

        let args = RunArgs {
            entry: Some("start".to_string()),
            ..args_for(&file)
        };
        let err = run(args, &Config::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("no entry function start"), "{:#}", err);
    }
}
