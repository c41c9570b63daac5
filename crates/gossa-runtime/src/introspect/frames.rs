//! Engine-owned frame iterator behind `runtime.CallersFrames`.

use crate::interp::Interp;
use crate::introspect::{func_for_pc, FuncInfo};
use std::collections::VecDeque;

/// One resolved stack entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    pub pc: u64,
    pub function: String,
    pub file: String,
    pub line: u32,
    pub entry: u64,
    info: Option<FuncInfo>,
}

impl StackFrame {
    pub fn info(&self) -> Option<&FuncInfo> {
        self.info.as_ref()
    }
}

/// Expands counters into frames, keeping up to two resolved frames
/// buffered so `next` can tell whether another frame follows.
#[derive(Debug, Clone, Default)]
pub struct Frames {
    callers: VecDeque<u64>,
    frames: VecDeque<StackFrame>,
}

impl Frames {
    pub fn new(callers: Vec<u64>) -> Self {
        Self {
            callers: callers.into(),
            frames: VecDeque::with_capacity(2),
        }
    }

    /// The next frame and whether more follow. Counters that resolve to no
    /// function are skipped; an exhausted iterator yields an empty frame.
    pub fn next(&mut self, interp: &Interp) -> (StackFrame, bool) {
        while self.frames.len() < 2 {
            let Some(pc) = self.callers.pop_front() else {
                break;
            };
            let Some(info) = func_for_pc(interp, pc) else {
                continue;
            };
            self.frames.push_back(StackFrame {
                pc,
                function: info.name.clone(),
                file: String::new(),
                line: 0,
                entry: info.entry,
                info: Some(info),
            });
        }
        let Some(mut frame) = self.frames.pop_front() else {
            return (StackFrame::default(), false);
        };
        if let Some(info) = &frame.info {
            let (file, line) = info.file_line(interp, frame.pc);
            frame.file = file;
            frame.line = line;
        }
        (frame, !self.frames.is_empty())
    }
}
