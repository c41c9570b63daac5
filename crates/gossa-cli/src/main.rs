use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod commands;
mod config;
mod exit;

/// Interpreter for Go programs compiled to SSA units.
///
/// gossa loads the SSA units an upstream compiler produced for a package and
/// its dependencies, then runs the entry function or the package's tests.
///
/// EXAMPLES:
///     gossa run hello.ssa              Run a single unit
///     gossa run ./cmd/tool -- -n 3     Run a package directory with arguments
///     gossa test                       Test the package in the current directory
///     gossa test ./... -v              Test every package below here
///
/// ENVIRONMENT VARIABLES:
///     GOSSA_LOG              Log filter (default: warn)
///     GOSSA_ENTRY            Entry function name
///     GOSSA_TRACE            Set to '1' to trace executed instructions
///     GOSSA_DISABLE_RECOVER  Set to '1' to surface panics as errors
///     NO_COLOR               Set to disable colored output
#[derive(Parser)]
#[command(name = "gossa")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a unit file or a main package
    ///
    /// The interpreted program's exit code becomes gossa's exit code.
    /// Load failures exit with 10 (malformed unit), 11 (link failure) or
    /// 12 (not a main package).
    ///
    /// EXAMPLES:
    ///     gossa run main.ssa                 Run a single unit
    ///     gossa run . -- -v input.txt        Pass arguments to the program
    ///     gossa run main.ssa --dumpssa       Print instructions before running
    #[command(visible_alias = "r")]
    Run {
        /// Unit file (.ssa) or package directory
        input: String,
        /// Arguments passed to the interpreted program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Log every executed instruction
        #[arg(long)]
        trace: bool,
        /// Print each function's instruction listing before running
        #[arg(long)]
        dumpssa: bool,
        /// Print the loaded packages in initialization order
        #[arg(long)]
        dumppkg: bool,
        /// Entry function name (default: main)
        #[arg(long)]
        entry: Option<String>,
    },

    /// Run the tests of one or more packages
    ///
    /// A package pattern ending in `/...` tests every directory below it
    /// that holds units. Arguments after the pattern reach the test binary
    /// (`-test.run`, `-test.v`).
    ///
    /// EXAMPLES:
    ///     gossa test                         Test the current package
    ///     gossa test -v ./calc               Verbose run of one package
    ///     gossa test ./... -test.run Add     Only tests matching Add
    #[command(visible_alias = "t")]
    Test {
        /// Package directory or pattern (default: .)
        #[arg(default_value = ".")]
        package: String,
        /// Arguments passed to the test binary
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Print each test as it runs
        #[arg(short = 'v', long)]
        verbose: bool,
        /// Log every executed instruction
        #[arg(long)]
        trace: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = config::CliEnv::from_env();
    if env.no_color {
        colored::control::set_override(false);
    }

    match execute(cli, &env) {
        Ok(code) => exit::code(code),
        Err(err) => {
            exit::report(&err);
            exit::code(exit::classify(&err))
        }
    }
}

fn execute(cli: Cli, env: &config::CliEnv) -> Result<i32> {
    let settings = config::load_settings()?;
    let trace = match &cli.command {
        Commands::Run { trace, .. } | Commands::Test { trace, .. } => *trace,
    };
    config::init_logging(env, trace || settings.trace())?;

    match cli.command {
        Commands::Run {
            input,
            args,
            trace,
            dumpssa,
            dumppkg,
            entry,
        } => {
            let args = commands::run::RunArgs {
                input,
                args,
                trace,
                dump_instrs: dumpssa,
                dump_packages: dumppkg,
                entry,
            };
            commands::run::run(args, &settings)
        }
        Commands::Test {
            package,
            args,
            verbose,
            trace,
        } => {
            let args = commands::test::TestArgs {
                package,
                args,
                verbose,
                trace,
            };
            commands::test::run(args, &settings)
        }
    }
}
