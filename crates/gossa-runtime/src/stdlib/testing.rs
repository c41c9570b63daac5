//! `testing` shims: the `testing.Main` runner invoked by synthesized test
//! mains, and the `*testing.T` methods tests call.

use crate::bridge::RegistryBuilder;
use crate::interp::{output, Frame, Interp, Unwind};
use crate::introspect;
use crate::marshal::{Kind, NativeSignature};
use crate::stdlib::{fmt, os};
use crate::value::{NativeObject, Value};
use parking_lot::Mutex;
use regex::Regex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::debug;

const T_TYPE: &str = "*testing.T";

/// State behind one `*testing.T`.
#[derive(Debug)]
pub struct TestState {
    name: String,
    failed: AtomicBool,
    logs: Mutex<Vec<String>>,
}

impl TestState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failed: AtomicBool::new(false),
            logs: Mutex::new(Vec::new()),
        }
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn log(&self, line: String) {
        self.logs.lock().push(line);
    }
}

/// Runner flags taken from the argument vector.
#[derive(Debug, Default)]
struct RunnerFlags {
    verbose: bool,
    run: Option<String>,
}

impl RunnerFlags {
    fn parse(args: &[String]) -> Self {
        let mut flags = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let body = arg.trim_start_matches('-');
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (body, None),
            };
            match name {
                "test.v" | "v" => {
                    flags.verbose = inline.map(|v| v != "false").unwrap_or(true);
                }
                "test.run" | "run" => {
                    flags.run = inline.or_else(|| iter.next().cloned());
                }
                _ => {}
            }
        }
        flags
    }
}

/// Formats a log entry the way `go test` indents it.
fn decorate(file: &str, line: u32, message: &str) -> String {
    let base = Path::new(file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file);
    let message = message.strip_suffix('\n').unwrap_or(message);
    format!("    {}:{}: {}", base, line, message.replace('\n', "\n        "))
}

fn receiver(args: &[Value]) -> Result<NativeObject, Unwind> {
    match args.first() {
        Some(Value::Native(obj)) if obj.downcast::<TestState>().is_some() => Ok(obj.clone()),
        _ => Err(Unwind::runtime_error("invalid memory address or nil pointer dereference")),
    }
}

fn with_t<R>(args: &[Value], f: impl FnOnce(&TestState) -> R) -> Result<R, Unwind> {
    let obj = receiver(args)?;
    match obj.downcast::<TestState>() {
        Some(state) => Ok(f(state)),
        None => Err(Unwind::runtime_error("invalid memory address or nil pointer dereference")),
    }
}

/// Records `message` against the test, located at the calling line.
fn record(fr: &Frame<'_>, args: &[Value], message: String) -> Result<(), Unwind> {
    let at = introspect::caller(fr, 0)?;
    with_t(args, |t| t.log(decorate(&at.file, at.line, &message)))
}

fn log_args(args: &[Value]) -> String {
    fmt::sprintln(args.get(1..).unwrap_or_default())
}

fn logf_args(args: &[Value]) -> String {
    let format = args.get(1).and_then(Value::as_str).unwrap_or_default();
    fmt::sprintf(format, args.get(2..).unwrap_or_default())
}

/// Result of running one test function.
#[derive(Debug, PartialEq, Eq)]
enum TestResult {
    Passed,
    Failed,
}

fn run_test(
    interp: &Interp,
    flags: &RunnerFlags,
    name: &str,
    func: &Value,
) -> Result<TestResult, Unwind> {
    let out = interp.stdout();
    if flags.verbose {
        output::emit(out, &format!("=== RUN   {}\n", name));
    }
    let state = NativeObject::new(T_TYPE, TestState::new(name));
    let t = Value::Native(state.clone());
    let started = Instant::now();
    let outcome = interp.run_goroutine(|base| interp.call_value(base, func, vec![t]))?;
    let elapsed = started.elapsed().as_secs_f64();

    let Some(test) = state.downcast::<TestState>() else {
        return Err(Unwind::runtime_error("testing state lost"));
    };
    match outcome {
        Ok(_) | Err(Unwind::Goexit) => {}
        Err(Unwind::Panic(p)) => {
            test.fail();
            test.log(format!("    {}", p.message().trim_end().replace('\n', "\n    ")));
        }
        Err(other) => return Err(other),
    }

    let failed = test.failed();
    debug!(test = name, failed, elapsed, "test finished");
    if failed || flags.verbose {
        let status = if failed { "FAIL" } else { "PASS" };
        let mut text = format!("--- {}: {} ({:.2}s)\n", status, name, elapsed);
        for line in test.logs.lock().iter() {
            text.push_str(line);
            text.push('\n');
        }
        output::emit(out, &text);
    }
    Ok(if failed {
        TestResult::Failed
    } else {
        TestResult::Passed
    })
}

fn testing_main(fr: &Frame<'_>, args: Vec<Value>) -> Result<Vec<Value>, Unwind> {
    let interp = fr.interp();
    let argv = os::args(interp.registry());
    let flags = RunnerFlags::parse(argv.get(1..).unwrap_or_default());
    let filter = match flags.run.as_deref() {
        Some(pattern) => Some(Regex::new(pattern).map_err(|err| {
            Unwind::panic(Value::string(format!(
                "testing: invalid regexp for -test.run: {}",
                err
            )))
        })?),
        None => None,
    };

    let mut ran = 0;
    let mut failed = false;
    for pair in args.chunks(2) {
        let [name, func] = pair else {
            return Err(Unwind::runtime_error("testing.Main: unpaired test entry"));
        };
        let name = name.as_str().unwrap_or_default();
        if filter.as_ref().is_some_and(|re| !re.is_match(name)) {
            continue;
        }
        ran += 1;
        if run_test(interp, &flags, name, func)? == TestResult::Failed {
            failed = true;
        }
    }

    let out = interp.stdout();
    if ran == 0 {
        output::emit(out, "testing: warning: no tests to run\n");
    }
    output::emit(out, if failed { "FAIL\n" } else { "PASS\n" });
    Ok(vec![Value::Int(failed as i64)])
}

pub fn register(b: &mut RegistryBuilder) {
    let t = || vec![Kind::Opaque];
    let t_variadic = || vec![Kind::Opaque, Kind::Any];
    let t_format = || vec![Kind::Opaque, Kind::String, Kind::Any];

    b.native(
        "testing.Main",
        NativeSignature::variadic(vec![Kind::Any], vec![Kind::Int]),
        testing_main,
    )
    .native(
        "(*testing.T).Name",
        NativeSignature::new(t(), vec![Kind::String]),
        |_, args| Ok(vec![Value::string(with_t(&args, |t| t.name.clone())?)]),
    )
    .native(
        "(*testing.T).Log",
        NativeSignature::variadic(t_variadic(), vec![]),
        |fr, args| {
            record(fr, &args, log_args(&args))?;
            Ok(Vec::new())
        },
    )
    .native(
        "(*testing.T).Logf",
        NativeSignature::variadic(t_format(), vec![]),
        |fr, args| {
            record(fr, &args, logf_args(&args))?;
            Ok(Vec::new())
        },
    )
    .native(
        "(*testing.T).Error",
        NativeSignature::variadic(t_variadic(), vec![]),
        |fr, args| {
            record(fr, &args, log_args(&args))?;
            with_t(&args, TestState::fail)?;
            Ok(Vec::new())
        },
    )
    .native(
        "(*testing.T).Errorf",
        NativeSignature::variadic(t_format(), vec![]),
        |fr, args| {
            record(fr, &args, logf_args(&args))?;
            with_t(&args, TestState::fail)?;
            Ok(Vec::new())
        },
    )
    .native("(*testing.T).Fail", NativeSignature::new(t(), vec![]), |_, args| {
        with_t(&args, TestState::fail)?;
        Ok(Vec::new())
    })
    .native(
        "(*testing.T).FailNow",
        NativeSignature::new(t(), vec![]),
        |fr, args| {
            with_t(&args, TestState::fail)?;
            Err(fr.interp().goexit(fr))
        },
    )
    .native(
        "(*testing.T).Failed",
        NativeSignature::new(t(), vec![Kind::Bool]),
        |_, args| Ok(vec![Value::Bool(with_t(&args, TestState::failed)?)]),
    )
    .native(
        "(*testing.T).Fatal",
        NativeSignature::variadic(t_variadic(), vec![]),
        |fr, args| {
            record(fr, &args, log_args(&args))?;
            with_t(&args, TestState::fail)?;
            Err(fr.interp().goexit(fr))
        },
    )
    .native(
        "(*testing.T).Fatalf",
        NativeSignature::variadic(t_format(), vec![]),
        |fr, args| {
            record(fr, &args, logf_args(&args))?;
            with_t(&args, TestState::fail)?;
            Err(fr.interp().goexit(fr))
        },
    );
}
