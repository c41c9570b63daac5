//! Run and test dispatch.
//!
//! The [`Driver`] ties the loader to the interpreter: it projects the
//! argument vector, resets the flag set, runs the entry function and turns
//! a non-zero exit code into [`RunError::ExitCode`].
//!
//! # Examples
//!
//! ```
//! use gossa_runtime::ssa::{FunctionBuilder, Instr, Operand, UnitBuilder};
//! use gossa_runtime::{CaptureBuffer, Driver};
//! use std::path::Path;
//!
//! let unit = UnitBuilder::new("main", "main", "hello.go")
//!     .import("fmt")
//!     .function(
//!         FunctionBuilder::new("main.main")
//!             .instr(Instr::call(None, "fmt.Println", vec![Operand::str("hello")]))
//!             .ret()
//!             .build(),
//!     )
//!     .build();
//! let src = unit.to_json().unwrap();
//!
//! let out = CaptureBuffer::new();
//! let driver = Driver::builder().stdout(out.writer()).build();
//! driver.run_file(Path::new("hello.ssa"), Some(src.as_bytes()), &[]).unwrap();
//! assert_eq!(out.contents(), "hello\n");
//! ```

use crate::bridge::{self, Registry};
use crate::error::{LoadError, RunError, RuntimeError};
use crate::interp::{output, ExecOptions, Interp, OutputWriter};
use crate::introspect::WrapperRecognizer;
use crate::loader::{DirectoryDriver, Loader, PackageDriver, TestPackage, TestSuite};
use crate::resolver::{GoListCommand, ListDriver};
use crate::ssa::unit::UNIT_EXTENSION;
use crate::ssa::Program;
use crate::stdlib::{flag, os};
use gossa_config::Config;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default entry function name.
pub const DEFAULT_ENTRY: &str = "main";

/// How a package's test run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    NoTestFiles,
    /// Test files exist but declare no tests.
    NoTests,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub path: String,
    pub status: TestStatus,
    pub elapsed: Duration,
}

impl TestOutcome {
    pub fn failed(&self) -> bool {
        self.status == TestStatus::Failed
    }
}

pub struct DriverBuilder {
    registry: Arc<Registry>,
    package_driver: Option<Arc<dyn PackageDriver>>,
    options: ExecOptions,
    recognizer: WrapperRecognizer,
    stdout: OutputWriter,
    stderr: OutputWriter,
    entry: String,
    resolver_command: Option<Vec<String>>,
}

impl DriverBuilder {
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Package driver for programs the standalone path cannot load.
    pub fn package_driver(mut self, driver: Arc<dyn PackageDriver>) -> Self {
        self.package_driver = Some(driver);
        self
    }

    pub fn options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn recognizer(mut self, recognizer: WrapperRecognizer) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn stdout(mut self, out: OutputWriter) -> Self {
        self.stdout = out;
        self
    }

    pub fn stderr(mut self, out: OutputWriter) -> Self {
        self.stderr = out;
        self
    }

    pub fn entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Applies the run, introspection and resolver settings of a loaded
    /// configuration. Later builder calls still override them.
    pub fn config(mut self, config: &Config) -> Self {
        self.entry = config.entry().to_string();
        self.options.trace = config.trace();
        self.options.disable_recover = config.disable_recover();
        self.recognizer = WrapperRecognizer {
            bound_suffix: config.bound_suffix().to_string(),
            thunk_suffix: config.thunk_suffix().to_string(),
            bound_is_autogenerated: config.bound_is_autogenerated(),
            autogenerated_file: config.autogenerated_file().to_string(),
        };
        self.resolver_command = Some(config.resolver_command());
        self
    }

    pub fn build(self) -> Driver {
        let command = match self.resolver_command {
            Some(argv) => GoListCommand::new(argv),
            None => GoListCommand::default(),
        };
        let package_driver = self.package_driver.unwrap_or_else(|| {
            let resolver = Arc::new(ListDriver::new(command));
            Arc::new(DirectoryDriver::new(resolver))
        });
        Driver {
            loader: Loader::new(self.registry.clone(), package_driver),
            registry: self.registry,
            options: self.options,
            recognizer: self.recognizer,
            stdout: self.stdout,
            stderr: self.stderr,
            entry: self.entry,
        }
    }
}

pub struct Driver {
    registry: Arc<Registry>,
    loader: Loader,
    options: ExecOptions,
    recognizer: WrapperRecognizer,
    stdout: OutputWriter,
    stderr: OutputWriter,
    entry: String,
}

impl Driver {
    /// Builder over the process-wide registry and the standard streams.
    pub fn builder() -> DriverBuilder {
        DriverBuilder {
            registry: bridge::global(),
            package_driver: None,
            options: ExecOptions::default(),
            recognizer: WrapperRecognizer::default(),
            stdout: output::stdout(),
            stderr: output::stderr(),
            entry: DEFAULT_ENTRY.to_string(),
            resolver_command: None,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Loads `input`: a unit file when it has the unit extension, a
    /// package directory otherwise.
    pub fn load(&self, input: &str) -> Result<Program, LoadError> {
        let path = Path::new(input);
        if is_unit_file(path) {
            self.loader.load_file(path, None)
        } else {
            self.loader.load_pkg(path)
        }
    }

    /// Loads and runs `input` with `args`.
    pub fn run(&self, input: &str, args: &[String]) -> Result<(), RunError> {
        let program = self.load(input)?;
        self.run_pkg(program, input, &self.entry, args)
    }

    /// Runs a single unit file; `src` replaces its contents when given.
    pub fn run_file(&self, file: &Path, src: Option<&[u8]>, args: &[String]) -> Result<(), RunError> {
        let program = self.loader.load_file(file, src)?;
        self.run_pkg(program, &file.display().to_string(), &self.entry, args)
    }

    /// Runs `entry` of an already loaded program.
    pub fn run_pkg(
        &self,
        program: Program,
        input: &str,
        entry: &str,
        args: &[String],
    ) -> Result<(), RunError> {
        self.project_args(input, args);
        let code = self.interpret(program, entry)?;
        if code != 0 {
            return Err(RunError::ExitCode {
                input: input.to_string(),
                code,
            });
        }
        Ok(())
    }

    /// Loads the package in `input` with its tests and runs its test mains.
    pub fn run_test(&self, input: &str, args: &[String]) -> Result<TestOutcome, RunError> {
        let started = Instant::now();
        let (path, suite) = self.loader.load_test(Path::new(input))?;
        let packages = match suite {
            TestSuite::NoTestFiles => {
                output::emit(&self.stdout, &format!("?\t{} [no test files]\n", path));
                return Ok(TestOutcome {
                    path,
                    status: TestStatus::NoTestFiles,
                    elapsed: started.elapsed(),
                });
            }
            TestSuite::NoTests => {
                output::emit(&self.stdout, "testing: warning: no tests to run\n");
                Vec::new()
            }
            TestSuite::Mains(packages) => packages,
        };

        let ran = !packages.is_empty();
        let mut failed = false;
        for TestPackage { path: pkg_path, program } in packages {
            self.project_args(input, args);
            let code = self.interpret(program, DEFAULT_ENTRY)?;
            debug!(package = %pkg_path, code, "test main finished");
            failed |= code != 0;
        }

        let elapsed = started.elapsed();
        let status = match (failed, ran) {
            (true, _) => TestStatus::Failed,
            (false, true) => TestStatus::Passed,
            (false, false) => TestStatus::NoTests,
        };
        let label = if failed { "FAIL" } else { "ok" };
        output::emit(
            &self.stdout,
            &format!("{}\t{} {:.3}s\n", label, path, elapsed.as_secs_f64()),
        );
        Ok(TestOutcome {
            path,
            status,
            elapsed,
        })
    }

    /// Runs `entry` of `program` to completion and returns its exit code.
    pub fn interpret(&self, program: Program, entry: &str) -> Result<i32, RuntimeError> {
        let interp = Interp::builder(Arc::new(program), self.registry.clone())
            .options(self.options.clone())
            .recognizer(self.recognizer.clone())
            .stdout(self.stdout.clone())
            .stderr(self.stderr.clone())
            .build();
        let code = interp.run(entry)?;
        info!(entry, code, "interpretation finished");
        Ok(code)
    }

    /// Makes interpreted code see `[input, args...]` as its arguments and a
    /// fresh flag set named after `input`.
    fn project_args(&self, input: &str, args: &[String]) {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(input.to_string());
        argv.extend_from_slice(args);
        os::set_args(&self.registry, &argv);
        flag::reset_command_line(&self.registry, input);
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("entry", &self.entry)
            .field("options", &self.options)
            .field("loader", &self.loader)
            .finish()
    }
}

fn is_unit_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(UNIT_EXTENSION)
}
