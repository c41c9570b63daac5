//! Stack text in the format of `runtime.Stack`.

use crate::interp::{output, Frame, Interp, PanicLink};
use crate::introspect::{callers, chain_pcs, Frames, Pc};
use crate::error::RuntimeError;
use std::fmt::Write;

/// Frames collected by `runtime.Stack`.
const MAX_FRAMES: usize = 64;

fn render(interp: &Interp, goid: u64, pcs: Vec<u64>) -> String {
    let mut out = format!("goroutine {} [running]:\n", goid);
    if pcs.is_empty() {
        return out;
    }
    let mut frames = Frames::new(pcs);
    loop {
        let (frame, more) = frames.next(interp);
        if frame.function == "runtime.gopanic" {
            out.push_str("panic()");
        } else {
            out.push_str(&frame.function);
            out.push_str("()");
        }
        let _ = write!(out, "\n\t{}:{}", frame.file, frame.line);
        if frame.pc != frame.entry {
            let _ = write!(out, " +0x{:x}", frame.pc - frame.entry);
        }
        out.push('\n');
        if !more {
            break;
        }
    }
    out
}

/// `runtime.Stack` for the goroutine of `fr`, starting at the function
/// that asked for it.
pub fn stack(fr: &Frame<'_>) -> Result<String, RuntimeError> {
    let pcs = callers(fr, 1, MAX_FRAMES)?;
    Ok(render(fr.interp(), fr.goid(), pcs))
}

/// `runtime/debug.Stack`.
pub fn debug_stack(fr: &Frame<'_>) -> Result<String, RuntimeError> {
    stack(fr)
}

/// `runtime/debug.PrintStack`: the stack, written to the interpreter's
/// standard error.
pub fn print_stack(fr: &Frame<'_>) -> Result<(), RuntimeError> {
    let text = debug_stack(fr)?;
    output::emit(fr.interp().stderr(), &text);
    Ok(())
}

/// Stack printed for a panic that escaped goroutine `goid`.
pub fn panic_stack(interp: &Interp, goid: u64, chain: &PanicLink) -> String {
    let pcs = chain_pcs(chain).into_iter().map(Pc::to_raw).collect();
    render(interp, goid, pcs)
}
