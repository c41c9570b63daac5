//! Execution engine.
//!
//! One host thread per goroutine. Each thread owns its frame chain; the
//! only state shared between goroutines is the read-only program and
//! registry, the goroutine bookkeeping below, and the single-slot exit
//! channel through which a goroutine delivers the process exit code once
//! the main goroutine can no longer unwind to it.

mod call;
mod exec;
pub mod frame;
mod ops;
pub mod output;
mod unwind;

pub use frame::{Frame, PanicLink};
pub use output::{CaptureBuffer, OutputWriter};
pub use unwind::{PanicUnwind, Unwind};

use crate::bridge::Registry;
use crate::error::RuntimeError;
use crate::introspect::{self, WrapperRecognizer};
use crate::ssa::Program;
use crate::value::{new_cell, Cell, FuncValue, Value};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Goroutine id of the main goroutine.
pub const MAIN_GOID: u64 = 1;

/// Exit code of a run ended by an unrecovered panic or a deadlock.
pub const PANIC_EXIT_CODE: i32 = 2;

const DEADLOCK_MESSAGE: &str = "fatal error: no goroutines (main called runtime.Goexit) - deadlock!\n";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Log every executed instruction at `trace` level.
    pub trace: bool,
    /// Surface unrecovered panics as [`RuntimeError::Panic`] instead of
    /// exit code 2.
    pub disable_recover: bool,
    /// Print each function's instruction listing before running.
    pub dump_instrs: bool,
}

/// Message posted on the exit channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitSignal {
    Code(i32),
    Deadlock,
    Fatal(RuntimeError),
}

/// Broadcast that the run is over. Dropping the sender disconnects every
/// receiver, which wakes goroutines blocked in channel operations.
struct Shutdown {
    triggered: AtomicBool,
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Shutdown {
    fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            triggered: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.tx.lock().take();
    }

    fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }
}

/// Interpreter context of one program execution.
pub struct Interp {
    program: Arc<Program>,
    registry: Arc<Registry>,
    options: ExecOptions,
    recognizer: WrapperRecognizer,
    stdout: OutputWriter,
    stderr: OutputWriter,
    globals: Vec<Cell>,
    next_goid: AtomicU64,
    goroutines: AtomicUsize,
    goexited: AtomicBool,
    exit_tx: Sender<ExitSignal>,
    exit_rx: Receiver<ExitSignal>,
    shutdown: Shutdown,
    this: Weak<Interp>,
}

pub struct InterpBuilder {
    program: Arc<Program>,
    registry: Arc<Registry>,
    options: ExecOptions,
    recognizer: WrapperRecognizer,
    stdout: Option<OutputWriter>,
    stderr: Option<OutputWriter>,
}

impl InterpBuilder {
    pub fn options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn recognizer(mut self, recognizer: WrapperRecognizer) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn stdout(mut self, out: OutputWriter) -> Self {
        self.stdout = Some(out);
        self
    }

    pub fn stderr(mut self, out: OutputWriter) -> Self {
        self.stderr = Some(out);
        self
    }

    pub fn build(self) -> Arc<Interp> {
        let (exit_tx, exit_rx) = channel::bounded(1);
        let globals = self
            .program
            .globals()
            .iter()
            .map(|_| new_cell(Value::Nil))
            .collect();
        Arc::new_cyclic(|this| Interp {
            program: self.program,
            registry: self.registry,
            options: self.options,
            recognizer: self.recognizer,
            stdout: self.stdout.unwrap_or_else(output::stdout),
            stderr: self.stderr.unwrap_or_else(output::stderr),
            globals,
            next_goid: AtomicU64::new(MAIN_GOID + 1),
            goroutines: AtomicUsize::new(1),
            goexited: AtomicBool::new(false),
            exit_tx,
            exit_rx,
            shutdown: Shutdown::new(),
            this: this.clone(),
        })
    }
}

impl Interp {
    pub fn builder(program: Arc<Program>, registry: Arc<Registry>) -> InterpBuilder {
        InterpBuilder {
            program,
            registry,
            options: ExecOptions::default(),
            recognizer: WrapperRecognizer::default(),
            stdout: None,
            stderr: None,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn recognizer(&self) -> &WrapperRecognizer {
        &self.recognizer
    }

    pub fn stdout(&self) -> &OutputWriter {
        &self.stdout
    }

    pub fn stderr(&self) -> &OutputWriter {
        &self.stderr
    }

    /// Number of live goroutines, the main one included.
    pub fn num_goroutine(&self) -> usize {
        self.goroutines.load(Ordering::SeqCst)
    }

    /// Whether the main goroutine has called `runtime.Goexit`.
    pub fn main_exited(&self) -> bool {
        self.goexited.load(Ordering::SeqCst)
    }

    pub(crate) fn global(&self, name: &str) -> Result<&Cell, RuntimeError> {
        if let Some(index) = self.program.global_index(name) {
            if let Some(cell) = self.globals.get(index) {
                return Ok(cell);
            }
        }
        self.registry
            .variable(name)
            .ok_or_else(|| RuntimeError::UnknownGlobal {
                name: name.to_string(),
            })
    }

    pub(crate) fn shutdown_receiver(&self) -> &Receiver<()> {
        &self.shutdown.rx
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Runs package initializers in dependency order, then `entry` of the
    /// entry package, and returns the exit code.
    pub fn run(&self, entry: &str) -> Result<i32, RuntimeError> {
        let package = self
            .program
            .entry_package()
            .ok_or_else(|| RuntimeError::NoEntry {
                package: "main".to_string(),
                entry: entry.to_string(),
            })?;
        let name = format!("{}.{}", package.path, entry);
        let func = self
            .program
            .lookup(&name)
            .filter(|func| func.has_body())
            .ok_or_else(|| RuntimeError::NoEntry {
                package: package.path.clone(),
                entry: entry.to_string(),
            })?;

        if self.options.dump_instrs {
            let mut listing = String::new();
            for func in self.program.functions().iter().filter(|f| f.has_body()) {
                listing.push_str(&func.to_string());
                listing.push('\n');
            }
            output::emit(&self.stdout, &listing);
        }

        debug!(entry = %name, "starting main goroutine");
        let base = Frame::base(self, MAIN_GOID);
        let result = self
            .run_inits(&base)
            .and_then(|_| self.call_function(&base, func, &[], Vec::new(), false));
        let outcome = self.finish_main(&base, result);
        self.shutdown.trigger();
        outcome
    }

    fn run_inits(&self, base: &Frame<'_>) -> Result<(), Unwind> {
        for package in self.program.packages() {
            let name = format!("{}.init", package.path);
            if let Some(init) = self.program.lookup(&name).filter(|f| f.has_body()) {
                trace!(package = %package.path, "running package initializer");
                self.call_function(base, init, &[], Vec::new(), false)?;
            }
        }
        Ok(())
    }

    fn finish_main(
        &self,
        base: &Frame<'_>,
        result: Result<Vec<Value>, Unwind>,
    ) -> Result<i32, RuntimeError> {
        match result {
            Ok(_) => Ok(0),
            Err(Unwind::Exit(code)) => Ok(code),
            Err(Unwind::Halt) => self.await_exit(),
            Err(Unwind::Goexit) => {
                if self.num_goroutine() == 1 {
                    Ok(self.deadlock())
                } else {
                    self.await_exit()
                }
            }
            Err(Unwind::Panic(p)) => {
                if self.options.disable_recover {
                    return Err(RuntimeError::Panic {
                        value: p.value().to_string(),
                    });
                }
                self.report_panic(base, &p);
                Ok(PANIC_EXIT_CODE)
            }
            Err(Unwind::Fatal(err)) => Err(err),
        }
    }

    fn await_exit(&self) -> Result<i32, RuntimeError> {
        match self.exit_rx.recv() {
            Ok(ExitSignal::Code(code)) => Ok(code),
            Ok(ExitSignal::Deadlock) => Ok(self.deadlock()),
            Ok(ExitSignal::Fatal(err)) => Err(err),
            Err(_) => Ok(0),
        }
    }

    fn deadlock(&self) -> i32 {
        output::emit(&self.stderr, DEADLOCK_MESSAGE);
        PANIC_EXIT_CODE
    }

    fn post_exit(&self, signal: ExitSignal) {
        debug!(?signal, "posting exit signal");
        if self.exit_tx.try_send(signal).is_err() {
            trace!("exit signal already pending");
        }
    }

    /// Writes the unrecovered-panic report for the goroutine of `fr`.
    fn report_panic(&self, fr: &Frame<'_>, p: &PanicUnwind) {
        let mut text = p.message();
        text.push('\n');
        text.push_str(&introspect::panic_stack(self, fr.goid(), &p.chain));
        output::emit(&self.stderr, &text);
    }

    /// `os.Exit`. While the main goroutine runs, the exit unwinds to the top
    /// of the calling goroutine. Once main has exited, the code goes out
    /// through the exit channel instead.
    pub fn terminate(&self, code: i32) -> Unwind {
        if self.main_exited() {
            self.post_exit(ExitSignal::Code(code));
            self.shutdown.trigger();
            Unwind::Halt
        } else {
            Unwind::Exit(code)
        }
    }

    /// `runtime.Goexit`.
    pub fn goexit(&self, fr: &Frame<'_>) -> Unwind {
        if fr.goid() == MAIN_GOID {
            self.goexited.store(true, Ordering::SeqCst);
        }
        Unwind::Goexit
    }

    /// `runtime.GC`: walks the frame chain from `fr` to the goroutine base
    /// and releases dead registers. Values are reference counted, so the
    /// release is the collection.
    pub fn collect(&self, fr: &Frame<'_>) -> usize {
        let mut released = 0;
        let mut frames = 0;
        for frame in fr.ancestors() {
            released += frame.gc();
            frames += 1;
        }
        debug!(goroutine = fr.goid(), frames, released, "forced collection");
        released
    }

    fn next_goid(&self) -> u64 {
        self.next_goid.fetch_add(1, Ordering::SeqCst)
    }

    /// Starts a goroutine running `callee(args)` on its own thread.
    pub fn spawn(&self, callee: FuncValue, args: Vec<Value>) -> Result<(), Unwind> {
        let interp = self.this.upgrade().ok_or(Unwind::Halt)?;
        let goid = self.next_goid();
        self.goroutines.fetch_add(1, Ordering::SeqCst);
        trace!(goroutine = goid, callee = callee.name(), "spawning goroutine");
        let spawned = std::thread::Builder::new()
            .name(format!("goroutine-{}", goid))
            .spawn(move || interp.goroutine_main(goid, callee, args));
        if let Err(err) = spawned {
            self.goroutines.fetch_sub(1, Ordering::SeqCst);
            return Err(Unwind::Fatal(RuntimeError::Spawn(err.to_string())));
        }
        Ok(())
    }

    fn goroutine_main(&self, goid: u64, callee: FuncValue, args: Vec<Value>) {
        let base = Frame::base(self, goid);
        match self.call_func(&base, &callee, args, false) {
            Ok(_) | Err(Unwind::Goexit) | Err(Unwind::Halt) => {}
            Err(Unwind::Exit(code)) => {
                self.post_exit(ExitSignal::Code(code));
                self.shutdown.trigger();
            }
            Err(Unwind::Panic(p)) => {
                if !self.is_shutting_down() {
                    self.report_panic(&base, &p);
                    self.post_exit(ExitSignal::Code(PANIC_EXIT_CODE));
                    self.shutdown.trigger();
                }
            }
            Err(Unwind::Fatal(err)) => {
                warn!(goroutine = goid, error = %err, "goroutine failed");
                self.post_exit(ExitSignal::Fatal(err));
                self.shutdown.trigger();
            }
        }
        let remaining = self.goroutines.fetch_sub(1, Ordering::SeqCst) - 1;
        trace!(goroutine = goid, remaining, "goroutine finished");
        if remaining == 1 && self.main_exited() {
            self.post_exit(ExitSignal::Deadlock);
        }
    }

    /// Runs `f` on a fresh goroutine and waits for it. Used by natives that
    /// need a goroutine boundary, such as the test runner.
    pub fn run_goroutine<R, F>(&self, f: F) -> Result<R, RuntimeError>
    where
        R: Send,
        F: FnOnce(&Frame<'_>) -> R + Send,
    {
        let goid = self.next_goid();
        self.goroutines.fetch_add(1, Ordering::SeqCst);
        let joined = std::thread::scope(|scope| {
            std::thread::Builder::new()
                .name(format!("goroutine-{}", goid))
                .spawn_scoped(scope, || {
                    let base = Frame::base(self, goid);
                    f(&base)
                })
                .map(|handle| handle.join())
        });
        self.goroutines.fetch_sub(1, Ordering::SeqCst);
        match joined {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(RuntimeError::Spawn(format!(
                "goroutine {} aborted",
                goid
            ))),
            Err(err) => Err(RuntimeError::Spawn(err.to_string())),
        }
    }
}

impl std::fmt::Debug for Interp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interp")
            .field("functions", &self.program.functions().len())
            .field("goroutines", &self.num_goroutine())
            .field("options", &self.options)
            .finish()
    }
}
