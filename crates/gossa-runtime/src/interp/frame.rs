//! Activation records.
//!
//! A frame borrows its caller, so a goroutine's call stack is a linked list
//! living on the host thread's stack. Frames are never shared across
//! threads; interior mutability uses `Cell`/`RefCell`.

use crate::error::RuntimeError;
use crate::interp::Interp;
use crate::introspect::Pc;
use crate::ssa::{Builtin, Function, Reg};
use crate::value::{FuncValue, Value};
use std::cell::{Cell, RefCell};

/// One panic of a chain. `link` points to the panic that was in flight
/// when this one was raised from a deferred call.
#[derive(Debug, Clone)]
pub struct PanicLink {
    pub value: Value,
    /// Counters of the frames unwound on behalf of this panic, innermost
    /// first.
    pub pcs: Vec<Pc>,
    pub link: Option<Box<PanicLink>>,
}

impl PanicLink {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            pcs: Vec::new(),
            link: None,
        }
    }

    /// Links, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &PanicLink> {
        std::iter::successors(Some(self), |link| link.link.as_deref())
    }

    fn oldest_mut(&mut self) -> &mut PanicLink {
        match self.link {
            Some(ref mut link) => link.oldest_mut(),
            None => self,
        }
    }

    /// Records that the panic unwound through a frame executing at `pc`.
    pub fn unwound_through(&mut self, pc: Pc) {
        self.oldest_mut().pcs.push(pc);
    }

    /// Chains this panic onto the one it superseded.
    pub fn supersede(&mut self, previous: PanicLink) {
        self.oldest_mut().link = Some(Box::new(previous));
    }

    pub fn depth(&self) -> usize {
        self.iter().count()
    }
}

/// Panic state of a frame that is running its deferred calls.
#[derive(Debug)]
pub(crate) struct ActivePanic {
    pub chain: PanicLink,
    pub recovered: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum DeferredCallee {
    Func(FuncValue),
    Builtin(Builtin),
}

#[derive(Debug)]
pub(crate) struct Deferred {
    pub callee: DeferredCallee,
    pub args: Vec<Value>,
}

/// An activation record.
///
/// A frame without a function is the base of a goroutine: it anchors the
/// chain and gives natives called directly by a `go` statement a frame to
/// receive, but it never shows up in a stack.
pub struct Frame<'a> {
    interp: &'a Interp,
    goid: u64,
    func: Option<&'a Function>,
    caller: Option<&'a Frame<'a>>,
    /// Whether this activation is a deferred call; only those may recover.
    deferred: bool,
    offset: Cell<u32>,
    /// Index of the next instruction.
    ip: Cell<usize>,
    block: Cell<usize>,
    regs: RefCell<Vec<Value>>,
    defers: RefCell<Vec<Deferred>>,
    panic: RefCell<Option<ActivePanic>>,
}

impl<'a> Frame<'a> {
    /// Base frame of goroutine `goid`.
    pub fn base(interp: &'a Interp, goid: u64) -> Self {
        Self {
            interp,
            goid,
            func: None,
            caller: None,
            deferred: false,
            offset: Cell::new(0),
            ip: Cell::new(0),
            block: Cell::new(0),
            regs: RefCell::new(Vec::new()),
            defers: RefCell::new(Vec::new()),
            panic: RefCell::new(None),
        }
    }

    pub(crate) fn new(caller: &'a Frame<'a>, func: &'a Function, deferred: bool) -> Self {
        Self {
            interp: caller.interp,
            goid: caller.goid,
            func: Some(func),
            caller: Some(caller),
            deferred,
            offset: Cell::new(0),
            ip: Cell::new(0),
            block: Cell::new(0),
            regs: RefCell::new(vec![Value::Nil; func.frame_size()]),
            defers: RefCell::new(Vec::new()),
            panic: RefCell::new(None),
        }
    }

    pub fn interp(&self) -> &'a Interp {
        self.interp
    }

    /// Goroutine id.
    pub fn goid(&self) -> u64 {
        self.goid
    }

    pub fn function(&self) -> Option<&'a Function> {
        self.func
    }

    pub fn caller(&self) -> Option<&'a Frame<'a>> {
        self.caller
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Whether the frame executes an interpreted function.
    pub fn is_valid(&self) -> bool {
        self.func.is_some()
    }

    /// Current program counter. `None` for a goroutine base.
    pub fn pc(&self) -> Option<Pc> {
        self.func.map(|func| Pc::Interp {
            func: func.id,
            offset: self.offset.get(),
        })
    }

    /// Like [`pc`](Self::pc), but fails fast when the counter lies outside
    /// the function's instruction range.
    pub fn checked_pc(&self) -> Result<Option<Pc>, RuntimeError> {
        match self.func {
            Some(func) if !func.contains(self.offset.get()) => {
                Err(RuntimeError::CorruptCallStack {
                    function: func.name.clone(),
                    offset: self.offset.get(),
                    len: func.len(),
                })
            }
            _ => Ok(self.pc()),
        }
    }

    /// This frame followed by its callers, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Frame<'a>> {
        std::iter::successors(Some(self), |frame| frame.caller)
    }

    pub(crate) fn offset(&self) -> u32 {
        self.offset.get()
    }

    pub(crate) fn set_offset(&self, offset: u32) {
        self.offset.set(offset);
    }

    pub(crate) fn ip(&self) -> usize {
        self.ip.get()
    }

    pub(crate) fn set_ip(&self, ip: usize) {
        self.ip.set(ip);
    }

    /// Index of the block being executed.
    pub(crate) fn block(&self) -> usize {
        self.block.get()
    }

    pub(crate) fn set_block(&self, block: usize) {
        self.block.set(block);
    }

    pub(crate) fn reg(&self, reg: Reg) -> Value {
        self.regs
            .borrow()
            .get(reg.index())
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn set_reg(&self, reg: Reg, value: Value) {
        if let Some(slot) = self.regs.borrow_mut().get_mut(reg.index()) {
            *slot = value;
        }
    }

    pub(crate) fn push_defer(&self, deferred: Deferred) {
        self.defers.borrow_mut().push(deferred);
    }

    pub(crate) fn pop_defer(&self) -> Option<Deferred> {
        self.defers.borrow_mut().pop()
    }

    /// Enters the panicking state. A panic that arrives while an earlier
    /// one is still unrecovered supersedes it and chains onto it.
    pub(crate) fn enter_panic(&self, mut chain: PanicLink) {
        let mut slot = self.panic.borrow_mut();
        if let Some(previous) = slot.take() {
            if !previous.recovered {
                chain.supersede(previous.chain);
            }
        }
        *slot = Some(ActivePanic {
            chain,
            recovered: false,
        });
    }

    pub(crate) fn take_panic(&self) -> Option<ActivePanic> {
        self.panic.borrow_mut().take()
    }

    pub fn is_panicking(&self) -> bool {
        self.panic.borrow().is_some()
    }

    /// Snapshot of the panic chain in flight, if any.
    pub fn panic_chain(&self) -> Option<PanicLink> {
        self.panic.borrow().as_ref().map(|active| active.chain.clone())
    }

    /// Marks the in-flight panic recovered and returns its value.
    pub(crate) fn recover_panic(&self) -> Option<Value> {
        let mut slot = self.panic.borrow_mut();
        match slot.as_mut() {
            Some(active) if !active.recovered => {
                active.recovered = true;
                Some(active.chain.value.clone())
            }
            _ => None,
        }
    }

    /// Drops the in-flight panic once the deferred call that recovered it
    /// has returned, so later deferred calls run outside of it.
    pub(crate) fn settle_recovered(&self) {
        let mut slot = self.panic.borrow_mut();
        if matches!(slot.as_ref(), Some(active) if active.recovered) {
            *slot = None;
        }
    }

    /// Releases registers that are dead at the current instruction. Only
    /// functions without back-edges qualify: in them, an instruction index
    /// behind the current one can never execute again. Returns the number of
    /// released slots.
    pub(crate) fn gc(&self) -> usize {
        let func = match self.func {
            Some(func) if func.is_acyclic() => func,
            _ => return 0,
        };
        let current = (self.offset.get() as usize).saturating_sub(1);
        let mut released = 0;
        let mut regs = self.regs.borrow_mut();
        for (index, slot) in regs.iter_mut().enumerate() {
            let dead = matches!(func.last_use(Reg(index as u32)), Some(last) if last < current);
            if dead && !slot.is_nil() {
                *slot = Value::Nil;
                released += 1;
            }
        }
        released
    }
}

impl std::fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("goid", &self.goid)
            .field("func", &self.func.map(|func| func.name.as_str()))
            .field("offset", &self.offset.get())
            .field("deferred", &self.deferred)
            .finish()
    }
}
