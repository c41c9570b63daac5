//! Runtime-introspection emulation.
//!
//! Answers the questions `runtime.Caller`, `runtime.Callers`,
//! `runtime.FuncForPC` and `runtime.Stack` ask, by walking the
//! interpreter's own frame chain instead of the host stack.

mod frames;
mod naming;
mod stack;

pub use frames::{Frames, StackFrame};
pub use naming::WrapperRecognizer;
pub use stack::{debug_stack, panic_stack, print_stack, stack};

use crate::bridge::{NativeId, CALLERS, PANIC};
use crate::error::RuntimeError;
use crate::interp::{Frame, Interp, PanicLink};
use crate::ssa::{FuncId, Function};
use std::fmt;

/// A program counter.
///
/// Interpreted counters pair a function with a local offset: offset 0 is
/// the entry and the instruction at index `i` executes at offset `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pc {
    Interp { func: FuncId, offset: u32 },
    Native(NativeId),
}

impl Pc {
    /// Integer form handed to interpreted code as a `uintptr`.
    pub fn to_raw(self) -> u64 {
        match self {
            Pc::Interp { func, offset } => ((func.0 as u64 + 1) << 32) | offset as u64,
            Pc::Native(id) => id.0 as u64 + 1,
        }
    }

    /// Decodes [`to_raw`](Self::to_raw). Zero is no counter.
    pub fn from_raw(raw: u64) -> Option<Pc> {
        if raw == 0 {
            return None;
        }
        match raw >> 32 {
            0 => Some(Pc::Native(NativeId((raw - 1) as u32))),
            hi => Some(Pc::Interp {
                func: FuncId((hi - 1) as u32),
                offset: raw as u32,
            }),
        }
    }

    /// Entry counter of the same function.
    pub fn entry(self) -> Pc {
        match self {
            Pc::Interp { func, .. } => Pc::Interp { func, offset: 0 },
            native => native,
        }
    }
}

impl fmt::Display for Pc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.to_raw())
    }
}

/// Function owning a counter, if the counter lies inside an interpreted
/// function's `[entry, entry + len]` range.
pub fn find_func_by_pc(interp: &Interp, raw: u64) -> Option<&Function> {
    match Pc::from_raw(raw)? {
        Pc::Interp { func, offset } => interp
            .program()
            .function(func)
            .filter(|f| f.contains(offset)),
        Pc::Native(_) => None,
    }
}

/// What `runtime.FuncForPC` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncInfo {
    pub name: String,
    pub entry: u64,
    pub file: String,
    pub line: u32,
    pub autogenerated: bool,
    func: Option<FuncId>,
}

impl FuncInfo {
    /// File and line of `raw`, a counter inside this function.
    pub fn file_line(&self, interp: &Interp, raw: u64) -> (String, u32) {
        if let (Some(id), true) = (self.func, raw > self.entry) {
            if let Some(func) = interp.program().function(id) {
                let offset = (raw - self.entry) as u32;
                let pos = func.pos_for_offset(offset);
                if !pos.is_valid() {
                    return ("?".to_string(), 0);
                }
                return match interp.program().position(func, pos) {
                    Some(position) if position.filename.is_empty() => {
                        ("??".to_string(), position.line)
                    }
                    Some(position) => (position.filename, position.line),
                    None => ("?".to_string(), 0),
                };
            }
        }
        (self.file.clone(), self.line)
    }
}

/// Resolves a counter to its function. Native counters resolve through the
/// registry and report file `?`, line 0.
pub fn func_for_pc(interp: &Interp, raw: u64) -> Option<FuncInfo> {
    if let Some(func) = find_func_by_pc(interp, raw) {
        let (name, autogenerated) = interp.recognizer().display_name(func);
        let (file, line) = if autogenerated {
            (interp.recognizer().autogenerated_file.clone(), 1)
        } else {
            match interp.program().position(func, func.pos) {
                Some(position) => (position.filename, position.line),
                None => (String::new(), 0),
            }
        };
        return Some(FuncInfo {
            name,
            entry: Pc::Interp {
                func: func.id,
                offset: 0,
            }
            .to_raw(),
            file,
            line,
            autogenerated,
            func: Some(func.id),
        });
    }
    match Pc::from_raw(raw)? {
        Pc::Native(id) => interp.registry().native_name(id).map(|name| FuncInfo {
            name: name.to_string(),
            entry: raw,
            file: "?".to_string(),
            line: 0,
            autogenerated: false,
            func: None,
        }),
        Pc::Interp { .. } => None,
    }
}

/// Counters of a panic chain as a stack shows them: for each link, newest
/// first, the panic primitive followed by the frames that link unwound.
pub fn chain_pcs(chain: &PanicLink) -> Vec<Pc> {
    let mut pcs = Vec::new();
    for link in chain.iter() {
        pcs.push(Pc::Native(PANIC));
        pcs.extend(link.pcs.iter().copied());
    }
    pcs
}

/// `runtime.Callers`: entry 0 is `runtime.Callers` itself, entry 1 the
/// frame that called it, and so on to the goroutine base. A frame inside a
/// panic contributes its panic chain before its own counter. Wrappers are
/// dropped. At most `max` counters starting at `skip` are returned.
pub fn callers(fr: &Frame<'_>, skip: usize, max: usize) -> Result<Vec<u64>, RuntimeError> {
    let interp = fr.interp();
    let mut pcs = vec![Pc::Native(CALLERS)];
    for frame in fr.ancestors().filter(|frame| frame.is_valid()) {
        if let Some(chain) = frame.panic_chain() {
            pcs.extend(chain_pcs(&chain));
        }
        if let Some(pc) = frame.checked_pc()? {
            pcs.push(pc);
        }
    }
    let visible: Vec<u64> = pcs
        .into_iter()
        .map(Pc::to_raw)
        .filter(|raw| match find_func_by_pc(interp, *raw) {
            Some(func) => !interp.recognizer().is_wrapper(&func.name),
            None => true,
        })
        .collect();
    if skip >= visible.len() {
        return Ok(Vec::new());
    }
    Ok(visible.into_iter().skip(skip).take(max).collect())
}

/// Where a call to `runtime.Caller` lands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerInfo {
    pub pc: u64,
    pub file: String,
    pub line: u32,
    pub ok: bool,
}

/// `runtime.Caller(skip)`: `skip` 0 is the function calling
/// `runtime.Caller`.
pub fn caller(fr: &Frame<'_>, skip: usize) -> Result<CallerInfo, RuntimeError> {
    let pcs = callers(fr, skip + 1, 1)?;
    if pcs.is_empty() {
        return Ok(CallerInfo::default());
    }
    let mut frames = Frames::new(pcs);
    let (frame, _) = frames.next(fr.interp());
    Ok(CallerInfo {
        pc: frame.pc,
        file: frame.file,
        line: frame.line,
        ok: frame.pc != 0,
    })
}
