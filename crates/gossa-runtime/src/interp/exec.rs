//! Instruction dispatch loop and per-frame unwinding.

use crate::error::RuntimeError;
use crate::interp::frame::{Deferred, DeferredCallee};
use crate::interp::ops::{self, nil_dereference};
use crate::interp::{Frame, Interp, PanicUnwind, Unwind};
use crate::ssa::{BlockId, Builtin, Callee, CallCommon, Constant, Function, Instr, Operand};
use crate::value::{new_cell, ChanRef, FuncValue, SliceRef, Value};
use crossbeam::select;
use std::sync::Arc;
use tracing::trace;

impl Interp {
    /// Runs `fr` to completion, handling panics and goroutine exits that
    /// reach it: deferred calls run, a recovered panic resumes at the
    /// recover block (or returns zero results), and anything else keeps
    /// unwinding to the caller.
    pub(crate) fn run_frame(&self, fr: &Frame<'_>, func: &Function) -> Result<Vec<Value>, Unwind> {
        loop {
            let mut unwind = match self.exec(fr, func) {
                Ok(results) => return Ok(results),
                Err(unwind) => unwind,
            };
            loop {
                match unwind {
                    Unwind::Panic(p) => {
                        fr.enter_panic(p.chain);
                        match self.run_defers(fr) {
                            Ok(()) => break,
                            Err(next) => {
                                fr.take_panic();
                                unwind = next;
                            }
                        }
                    }
                    Unwind::Goexit => match self.run_defers(fr) {
                        Ok(()) => return Err(Unwind::Goexit),
                        Err(next) => unwind = next,
                    },
                    other => return Err(other),
                }
            }

            match fr.take_panic() {
                Some(active) if !active.recovered => {
                    let mut chain = active.chain;
                    if let Some(pc) = fr.pc() {
                        chain.unwound_through(pc);
                    }
                    return Err(Unwind::Panic(PanicUnwind { chain }));
                }
                _ => {
                    trace!(function = %func.name, "recovered from panic");
                    match func.recover {
                        Some(block) => self.enter_block(fr, func, block),
                        None => return Ok(func.results.iter().map(Value::zero).collect()),
                    }
                }
            }
        }
    }

    /// Runs the frame's deferred calls, newest first. A panic raised by a
    /// deferred call while the frame is already panicking supersedes the
    /// active panic; otherwise it is returned, like any other unwind. A
    /// recovered panic ends when the deferred call that recovered it returns.
    pub(crate) fn run_defers(&self, fr: &Frame<'_>) -> Result<(), Unwind> {
        while let Some(deferred) = fr.pop_defer() {
            match self.call_deferred(fr, deferred) {
                Ok(_) => fr.settle_recovered(),
                Err(Unwind::Panic(p)) if fr.is_panicking() => fr.enter_panic(p.chain),
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn call_deferred(&self, fr: &Frame<'_>, deferred: Deferred) -> Result<Vec<Value>, Unwind> {
        match deferred.callee {
            DeferredCallee::Func(callee) => self.call_func(fr, &callee, deferred.args, true),
            // Run by the unwinder rather than called from a deferred
            // function, so it never stops a panic.
            DeferredCallee::Builtin(Builtin::Recover) => Ok(vec![Value::Nil]),
            DeferredCallee::Builtin(builtin) => self.builtin(fr, builtin, deferred.args),
        }
    }

    /// Transfers control to `target`, evaluating its phi nodes as one
    /// parallel assignment.
    fn jump(&self, fr: &Frame<'_>, func: &Function, target: BlockId) -> Result<(), Unwind> {
        let from = BlockId(fr.block() as u32);
        let start = func.block_start(target);
        let edge = func.preds(target).iter().position(|pred| *pred == from);

        let mut values = Vec::new();
        let mut index = start;
        while let Some(Instr::Phi { dst, edges }) = func.instrs.get(index) {
            let edge = edge.ok_or_else(|| invalid(func, format!("{} is not a predecessor of {}", from, target)))?;
            let op = edges
                .get(edge)
                .ok_or_else(|| invalid(func, format!("phi {} lacks edge {}", dst, edge)))?;
            values.push((*dst, self.operand(fr, op)?));
            index += 1;
        }
        for (dst, value) in values {
            fr.set_reg(dst, value);
        }
        fr.set_block(target.index());
        fr.set_ip(index);
        Ok(())
    }

    fn enter_block(&self, fr: &Frame<'_>, func: &Function, block: BlockId) {
        fr.set_block(block.index());
        fr.set_ip(func.block_start(block));
    }

    pub(crate) fn operand(&self, fr: &Frame<'_>, op: &Operand) -> Result<Value, Unwind> {
        let value = match op {
            Operand::Reg(reg) => fr.reg(*reg),
            Operand::Const(constant) => match constant {
                Constant::Nil => Value::Nil,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(x) => Value::Float(*x),
                Constant::String(s) => Value::string(s),
            },
            Operand::Func(name) => Value::Func(self.func_value(name, Vec::new())),
        };
        Ok(value)
    }

    fn operands(&self, fr: &Frame<'_>, ops: &[Operand]) -> Result<Vec<Value>, Unwind> {
        ops.iter().map(|op| self.operand(fr, op)).collect()
    }

    /// Function value for a qualified name: interpreted when the program
    /// has a body for it, external otherwise.
    pub(crate) fn func_value(&self, name: &str, bindings: Vec<Value>) -> FuncValue {
        match self.program.lookup(name).filter(|f| f.has_body()) {
            Some(func) => FuncValue::Interp {
                func: func.id,
                name: Arc::from(name),
                bindings: Arc::from(bindings),
            },
            None => FuncValue::External(Arc::from(name)),
        }
    }

    fn deferred_callee(&self, fr: &Frame<'_>, call: &CallCommon) -> Result<DeferredCallee, Unwind> {
        match &call.callee {
            Callee::Static(name) => Ok(DeferredCallee::Func(self.func_value(name, Vec::new()))),
            Callee::Builtin(builtin) => Ok(DeferredCallee::Builtin(*builtin)),
            Callee::Dynamic(op) => match self.operand(fr, op)? {
                Value::Func(callee) => Ok(DeferredCallee::Func(callee)),
                Value::Nil => Err(nil_dereference()),
                other => Err(Unwind::Fatal(RuntimeError::InvalidOperand {
                    function: fr.function().map(|f| f.name.clone()).unwrap_or_default(),
                    message: format!("call of non-function {}", other.type_name()),
                })),
            },
        }
    }

    /// The dispatch loop: executes instructions from the frame's current
    /// position until a `return` or an unwind.
    fn exec(&self, fr: &Frame<'_>, func: &Function) -> Result<Vec<Value>, Unwind> {
        loop {
            if self.is_shutting_down() {
                return Err(Unwind::Halt);
            }
            let index = fr.ip();
            let instr = func.instrs.get(index).ok_or_else(|| {
                Unwind::Fatal(RuntimeError::CorruptCallStack {
                    function: func.name.clone(),
                    offset: index as u32 + 1,
                    len: func.len(),
                })
            })?;
            fr.set_ip(index + 1);
            fr.set_offset(index as u32 + 1);
            if self.options.trace {
                trace!(
                    target: "gossa::exec",
                    goroutine = fr.goid(),
                    function = %func.name,
                    offset = index + 1,
                    "{}",
                    instr
                );
            }

            match instr {
                Instr::BinOp { dst, binop, x, y } => {
                    let value = ops::binop(*binop, &self.operand(fr, x)?, &self.operand(fr, y)?)?;
                    fr.set_reg(*dst, value);
                }
                Instr::UnOp { dst, unop, x } => {
                    let value = ops::unop(*unop, &self.operand(fr, x)?)?;
                    fr.set_reg(*dst, value);
                }
                Instr::Convert { dst, x, to } => {
                    let value = ops::convert(*to, &self.operand(fr, x)?)?;
                    fr.set_reg(*dst, value);
                }
                Instr::Phi { dst, .. } => {
                    return Err(invalid(func, format!("phi {} outside a block header", dst)));
                }
                Instr::Call { dst, call } => {
                    let mut results = self.call(fr, call)?;
                    if let Some(dst) = dst {
                        let value = match results.len() {
                            0 => Value::Nil,
                            1 => results.pop().unwrap_or_default(),
                            _ => Value::tuple(results),
                        };
                        fr.set_reg(*dst, value);
                    }
                }
                Instr::Go { call } => {
                    let args = self.operands(fr, &call.args)?;
                    match self.deferred_callee(fr, call)? {
                        DeferredCallee::Func(callee) => self.spawn(callee, args)?,
                        DeferredCallee::Builtin(Builtin::Recover) => {}
                        DeferredCallee::Builtin(builtin) => {
                            self.builtin(fr, builtin, args)?;
                        }
                    }
                }
                Instr::Defer { call } => {
                    let callee = self.deferred_callee(fr, call)?;
                    let args = self.operands(fr, &call.args)?;
                    fr.push_defer(Deferred { callee, args });
                }
                Instr::RunDefers => self.run_defers(fr)?,
                Instr::Panic { x } => {
                    return Err(Unwind::panic(self.operand(fr, x)?));
                }
                Instr::Jump { target } => self.jump(fr, func, *target)?,
                Instr::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let target = match self.operand(fr, cond)? {
                        Value::Bool(true) => *then,
                        Value::Bool(false) => *otherwise,
                        other => {
                            return Err(invalid(
                                func,
                                format!("if condition is {}", other.type_name()),
                            ))
                        }
                    };
                    self.jump(fr, func, target)?;
                }
                Instr::Return { results } => return self.operands(fr, results),
                Instr::MakeClosure {
                    dst,
                    func: name,
                    bindings,
                } => {
                    let bindings = self.operands(fr, bindings)?;
                    fr.set_reg(*dst, Value::Func(self.func_value(name, bindings)));
                }
                Instr::Extract { dst, tuple, index } => {
                    let value = match self.operand(fr, tuple)? {
                        Value::Tuple(values) => values.get(*index).cloned(),
                        _ => None,
                    }
                    .ok_or_else(|| invalid(func, format!("extract #{} from non-tuple", index)))?;
                    fr.set_reg(*dst, value);
                }
                Instr::Field { dst, x, index } => {
                    let value = match self.operand(fr, x)? {
                        Value::Struct(fields) => fields.get(*index).cloned(),
                        Value::Pointer(cell) => match &*cell.read() {
                            Value::Struct(fields) => fields.get(*index).cloned(),
                            _ => None,
                        },
                        Value::Nil => return Err(nil_dereference()),
                        _ => None,
                    }
                    .ok_or_else(|| invalid(func, format!("field #{} of non-struct", index)))?;
                    fr.set_reg(*dst, value);
                }
                Instr::MakeStruct { dst, fields } => {
                    let fields = self.operands(fr, fields)?;
                    fr.set_reg(*dst, Value::Struct(Arc::from(fields)));
                }
                Instr::MakeSlice { dst, len } => {
                    let len = match self.operand(fr, len)?.as_int() {
                        Some(len) if len >= 0 => len as usize,
                        _ => return Err(Unwind::runtime_error("makeslice: len out of range")),
                    };
                    fr.set_reg(*dst, Value::Slice(SliceRef::new(vec![Value::Nil; len])));
                }
                Instr::Index { dst, x, index } => {
                    let value = index_value(&self.operand(fr, x)?, &self.operand(fr, index)?)?;
                    fr.set_reg(*dst, value);
                }
                Instr::SetIndex { x, index, value } => {
                    let target = self.operand(fr, x)?;
                    let i = self.operand(fr, index)?.as_int().unwrap_or(-1);
                    let value = self.operand(fr, value)?;
                    match target {
                        Value::Slice(slice) => {
                            if i < 0 || !slice.set(i as usize, value) {
                                return Err(out_of_range(i, slice.len()));
                            }
                        }
                        Value::Nil => return Err(out_of_range(i, 0)),
                        other => {
                            return Err(invalid(
                                func,
                                format!("index assignment on {}", other.type_name()),
                            ))
                        }
                    }
                }
                Instr::Slice { dst, x, low, high } => {
                    let x = self.operand(fr, x)?;
                    let low = match low {
                        Some(op) => Some(self.operand(fr, op)?.as_int().unwrap_or(-1)),
                        None => None,
                    };
                    let high = match high {
                        Some(op) => Some(self.operand(fr, op)?.as_int().unwrap_or(-1)),
                        None => None,
                    };
                    fr.set_reg(*dst, slice_value(&x, low, high)?);
                }
                Instr::Alloc { dst, init } => {
                    let init = match init {
                        Some(op) => self.operand(fr, op)?,
                        None => Value::Nil,
                    };
                    fr.set_reg(*dst, Value::Pointer(new_cell(init)));
                }
                Instr::Store { addr, value } => {
                    let value = self.operand(fr, value)?;
                    match self.operand(fr, addr)? {
                        Value::Pointer(cell) => *cell.write() = value,
                        Value::Nil => return Err(nil_dereference()),
                        other => {
                            return Err(invalid(func, format!("store through {}", other.type_name())))
                        }
                    }
                }
                Instr::LoadGlobal { dst, global } => {
                    let value = self.global(global)?.read().clone();
                    fr.set_reg(*dst, value);
                }
                Instr::StoreGlobal { global, value } => {
                    let value = self.operand(fr, value)?;
                    *self.global(global)?.write() = value;
                }
                Instr::MakeChan { dst, cap } => {
                    let cap = match self.operand(fr, cap)?.as_int() {
                        Some(cap) if cap >= 0 => cap as usize,
                        _ => return Err(Unwind::runtime_error("makechan: size out of range")),
                    };
                    fr.set_reg(*dst, Value::Chan(ChanRef::new(cap)));
                }
                Instr::Send { chan, x } => {
                    let chan = self.operand(fr, chan)?;
                    let value = self.operand(fr, x)?;
                    self.send(&chan, value)?;
                }
                Instr::Recv { dst, chan } => {
                    let chan = self.operand(fr, chan)?;
                    let value = self.recv(&chan)?;
                    fr.set_reg(*dst, value);
                }
            }
        }
    }

    /// Blocks until the value is sent or the run shuts down.
    fn send(&self, chan: &Value, value: Value) -> Result<(), Unwind> {
        let shutdown = self.shutdown_receiver();
        match chan {
            Value::Chan(chan) => select! {
                send(chan.sender(), value) -> _ => Ok(()),
                recv(shutdown) -> _ => Err(Unwind::Halt),
            },
            // A nil channel blocks forever.
            Value::Nil => {
                let _ = shutdown.recv();
                Err(Unwind::Halt)
            }
            other => Err(Unwind::Fatal(RuntimeError::InvalidOperand {
                function: "send".to_string(),
                message: format!("send on {}", other.type_name()),
            })),
        }
    }

    fn recv(&self, chan: &Value) -> Result<Value, Unwind> {
        let shutdown = self.shutdown_receiver();
        match chan {
            Value::Chan(chan) => select! {
                recv(chan.receiver()) -> msg => Ok(msg.unwrap_or_default()),
                recv(shutdown) -> _ => Err(Unwind::Halt),
            },
            Value::Nil => {
                let _ = shutdown.recv();
                Err(Unwind::Halt)
            }
            other => Err(Unwind::Fatal(RuntimeError::InvalidOperand {
                function: "recv".to_string(),
                message: format!("receive from {}", other.type_name()),
            })),
        }
    }
}

fn invalid(func: &Function, message: String) -> Unwind {
    Unwind::Fatal(RuntimeError::InvalidOperand {
        function: func.name.clone(),
        message,
    })
}

fn out_of_range(index: i64, len: usize) -> Unwind {
    Unwind::runtime_error(format!("index out of range [{}] with length {}", index, len))
}

fn index_value(x: &Value, index: &Value) -> Result<Value, Unwind> {
    let i = index.as_int().unwrap_or(-1);
    match x {
        Value::Slice(slice) => {
            if i < 0 {
                return Err(out_of_range(i, slice.len()));
            }
            slice
                .get(i as usize)
                .ok_or_else(|| out_of_range(i, slice.len()))
        }
        Value::String(s) => {
            let bytes = s.as_bytes();
            if i < 0 || i as usize >= bytes.len() {
                return Err(out_of_range(i, bytes.len()));
            }
            Ok(Value::Int(bytes[i as usize] as i64))
        }
        Value::Nil => Err(out_of_range(i, 0)),
        other => Err(Unwind::Fatal(RuntimeError::InvalidOperand {
            function: "index".to_string(),
            message: format!("index of {}", other.type_name()),
        })),
    }
}

fn slice_value(x: &Value, low: Option<i64>, high: Option<i64>) -> Result<Value, Unwind> {
    let bounds = |len: usize, cap: usize| -> Result<(usize, usize), Unwind> {
        let low = low.unwrap_or(0);
        let high = high.unwrap_or(len as i64);
        if high < 0 || high as usize > cap {
            return Err(Unwind::runtime_error(format!(
                "slice bounds out of range [:{}] with capacity {}",
                high, cap
            )));
        }
        if low < 0 || low > high {
            return Err(Unwind::runtime_error(format!(
                "slice bounds out of range [{}:{}]",
                low, high
            )));
        }
        Ok((low as usize, high as usize))
    };
    match x {
        Value::Slice(slice) => {
            let (low, high) = bounds(slice.len(), slice.cap())?;
            slice
                .slice(low, high)
                .map(Value::Slice)
                .ok_or_else(|| out_of_range(high as i64, slice.cap()))
        }
        Value::String(s) => {
            let (low, high) = bounds(s.len(), s.len())?;
            let bytes = &s.as_bytes()[low..high];
            Ok(Value::string(String::from_utf8_lossy(bytes)))
        }
        Value::Nil => {
            bounds(0, 0)?;
            Ok(Value::Nil)
        }
        other => Err(Unwind::Fatal(RuntimeError::InvalidOperand {
            function: "slice".to_string(),
            message: format!("slice of {}", other.type_name()),
        })),
    }
}
