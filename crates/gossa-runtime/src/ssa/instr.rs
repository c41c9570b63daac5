//! Instruction set of the SSA form executed by the engine.
//!
//! Instructions are serialized with an `op` tag, e.g.
//! `{"op": "binop", "dst": 2, "binop": "add", "x": {"reg": 0}, "y": {"const": {"int": 1}}}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A virtual register local to one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reg(pub u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Index of a basic block inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Compile-time constant operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Reg(Reg),
    Const(Constant),
    /// A function value referenced by qualified name.
    Func(String),
}

impl Operand {
    pub fn reg(index: u32) -> Self {
        Operand::Reg(Reg(index))
    }

    pub fn int(value: i64) -> Self {
        Operand::Const(Constant::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Operand::Const(Constant::Bool(value))
    }

    pub fn float(value: f64) -> Self {
        Operand::Const(Constant::Float(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Operand::Const(Constant::String(value.into()))
    }

    pub fn nil() -> Self {
        Operand::Const(Constant::Nil)
    }

    pub fn func(name: impl Into<String>) -> Self {
        Operand::Func(name.into())
    }

    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Const(Constant::Nil) => write!(f, "nil"),
            Operand::Const(Constant::Bool(b)) => write!(f, "{}", b),
            Operand::Const(Constant::Int(i)) => write!(f, "{}", i),
            Operand::Const(Constant::Float(x)) => write!(f, "{}", x),
            Operand::Const(Constant::String(s)) => write!(f, "{:?}", s),
            Operand::Func(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOp {
    Neg,
    Not,
    /// Load through a pointer.
    Deref,
}

/// Target of a `convert` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertKind {
    Int,
    Uintptr,
    Float,
    String,
}

/// Builtin functions handled by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Print,
    Println,
    Len,
    Recover,
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    /// Call of a function known by qualified name. Functions without an
    /// interpreted body are resolved through the external-function registry.
    Static(String),
    /// Call of a function value held in an operand.
    Dynamic(Operand),
    Builtin(Builtin),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCommon {
    pub callee: Callee,
    #[serde(default)]
    pub args: Vec<Operand>,
}

impl CallCommon {
    pub fn named(name: impl Into<String>, args: Vec<Operand>) -> Self {
        Self {
            callee: Callee::Static(name.into()),
            args,
        }
    }

    pub fn value(func: Operand, args: Vec<Operand>) -> Self {
        Self {
            callee: Callee::Dynamic(func),
            args,
        }
    }

    pub fn builtin(builtin: Builtin, args: Vec<Operand>) -> Self {
        Self {
            callee: Callee::Builtin(builtin),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    BinOp {
        dst: Reg,
        binop: BinOp,
        x: Operand,
        y: Operand,
    },
    UnOp {
        dst: Reg,
        unop: UnOp,
        x: Operand,
    },
    Convert {
        dst: Reg,
        x: Operand,
        to: ConvertKind,
    },
    /// One edge per predecessor, in predecessor order.
    Phi {
        dst: Reg,
        edges: Vec<Operand>,
    },
    Call {
        dst: Option<Reg>,
        call: CallCommon,
    },
    Go {
        call: CallCommon,
    },
    Defer {
        call: CallCommon,
    },
    RunDefers,
    Panic {
        x: Operand,
    },
    Jump {
        target: BlockId,
    },
    If {
        cond: Operand,
        then: BlockId,
        #[serde(rename = "else")]
        otherwise: BlockId,
    },
    Return {
        #[serde(default)]
        results: Vec<Operand>,
    },
    MakeClosure {
        dst: Reg,
        func: String,
        bindings: Vec<Operand>,
    },
    Extract {
        dst: Reg,
        tuple: Operand,
        index: usize,
    },
    Field {
        dst: Reg,
        x: Operand,
        index: usize,
    },
    MakeStruct {
        dst: Reg,
        fields: Vec<Operand>,
    },
    MakeSlice {
        dst: Reg,
        len: Operand,
    },
    Index {
        dst: Reg,
        x: Operand,
        index: Operand,
    },
    SetIndex {
        x: Operand,
        index: Operand,
        value: Operand,
    },
    Slice {
        dst: Reg,
        x: Operand,
        low: Option<Operand>,
        high: Option<Operand>,
    },
    Alloc {
        dst: Reg,
        init: Option<Operand>,
    },
    Store {
        addr: Operand,
        value: Operand,
    },
    LoadGlobal {
        dst: Reg,
        global: String,
    },
    StoreGlobal {
        global: String,
        value: Operand,
    },
    MakeChan {
        dst: Reg,
        cap: Operand,
    },
    Send {
        chan: Operand,
        x: Operand,
    },
    Recv {
        dst: Reg,
        chan: Operand,
    },
}

impl Instr {
    /// Whether the instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instr::Jump { .. } | Instr::If { .. } | Instr::Return { .. } | Instr::Panic { .. }
        )
    }

    /// Register written by the instruction, if any.
    pub fn dst(&self) -> Option<Reg> {
        match self {
            Instr::BinOp { dst, .. }
            | Instr::UnOp { dst, .. }
            | Instr::Convert { dst, .. }
            | Instr::Phi { dst, .. }
            | Instr::MakeClosure { dst, .. }
            | Instr::Extract { dst, .. }
            | Instr::Field { dst, .. }
            | Instr::MakeStruct { dst, .. }
            | Instr::MakeSlice { dst, .. }
            | Instr::Index { dst, .. }
            | Instr::Slice { dst, .. }
            | Instr::Alloc { dst, .. }
            | Instr::LoadGlobal { dst, .. }
            | Instr::MakeChan { dst, .. }
            | Instr::Recv { dst, .. } => Some(*dst),
            Instr::Call { dst, .. } => *dst,
            _ => None,
        }
    }

    /// Every operand read by the instruction.
    pub fn operands(&self) -> Vec<&Operand> {
        fn call_operands(call: &CallCommon) -> Vec<&Operand> {
            let mut ops = Vec::with_capacity(call.args.len() + 1);
            if let Callee::Dynamic(f) = &call.callee {
                ops.push(f);
            }
            ops.extend(call.args.iter());
            ops
        }

        match self {
            Instr::BinOp { x, y, .. } => vec![x, y],
            Instr::UnOp { x, .. }
            | Instr::Convert { x, .. }
            | Instr::Panic { x }
            | Instr::Extract { tuple: x, .. }
            | Instr::Field { x, .. }
            | Instr::MakeSlice { len: x, .. }
            | Instr::MakeChan { cap: x, .. }
            | Instr::Recv { chan: x, .. }
            | Instr::If { cond: x, .. }
            | Instr::StoreGlobal { value: x, .. } => vec![x],
            Instr::Phi { edges, .. } => edges.iter().collect(),
            Instr::Call { call, .. } | Instr::Go { call } | Instr::Defer { call } => {
                call_operands(call)
            }
            Instr::Return { results } => results.iter().collect(),
            Instr::MakeClosure { bindings, .. } => bindings.iter().collect(),
            Instr::MakeStruct { fields, .. } => fields.iter().collect(),
            Instr::Index { x, index, .. } => vec![x, index],
            Instr::SetIndex { x, index, value } => vec![x, index, value],
            Instr::Slice { x, low, high, .. } => {
                let mut ops = vec![x];
                ops.extend(low.iter());
                ops.extend(high.iter());
                ops
            }
            Instr::Alloc { init, .. } => init.iter().collect(),
            Instr::Store { addr, value } => vec![addr, value],
            Instr::Send { chan, x } => vec![chan, x],
            Instr::RunDefers | Instr::Jump { .. } | Instr::LoadGlobal { .. } => Vec::new(),
        }
    }

    /// Blocks this instruction may transfer control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instr::Jump { target } => vec![*target],
            Instr::If {
                then, otherwise, ..
            } => vec![*then, *otherwise],
            _ => Vec::new(),
        }
    }

    pub fn call(dst: Option<u32>, name: impl Into<String>, args: Vec<Operand>) -> Self {
        Instr::Call {
            dst: dst.map(Reg),
            call: CallCommon::named(name, args),
        }
    }

    pub fn ret(results: Vec<Operand>) -> Self {
        Instr::Return { results }
    }
}

fn write_call(f: &mut fmt::Formatter<'_>, call: &CallCommon) -> fmt::Result {
    match &call.callee {
        Callee::Static(name) => write!(f, "{}(", name)?,
        Callee::Dynamic(op) => write!(f, "{}(", op)?,
        Callee::Builtin(b) => write!(f, "{}(", format!("{:?}", b).to_lowercase())?,
    }
    for (i, arg) in call.args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    write!(f, ")")
}

fn write_list(f: &mut fmt::Formatter<'_>, ops: &[Operand]) -> fmt::Result {
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", op)?;
    }
    Ok(())
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dst) = self.dst() {
            write!(f, "{} = ", dst)?;
        }
        match self {
            Instr::BinOp { binop, x, y, .. } => write!(f, "{:?} {} {}", binop, x, y),
            Instr::UnOp { unop, x, .. } => write!(f, "{:?} {}", unop, x),
            Instr::Convert { x, to, .. } => write!(f, "convert {:?} <- {}", to, x),
            Instr::Phi { edges, .. } => {
                write!(f, "phi [")?;
                write_list(f, edges)?;
                write!(f, "]")
            }
            Instr::Call { call, .. } => write_call(f, call),
            Instr::Go { call } => {
                write!(f, "go ")?;
                write_call(f, call)
            }
            Instr::Defer { call } => {
                write!(f, "defer ")?;
                write_call(f, call)
            }
            Instr::RunDefers => write!(f, "rundefers"),
            Instr::Panic { x } => write!(f, "panic {}", x),
            Instr::Jump { target } => write!(f, "jump {}", target),
            Instr::If {
                cond,
                then,
                otherwise,
            } => write!(f, "if {} goto {} else {}", cond, then, otherwise),
            Instr::Return { results } => {
                write!(f, "return ")?;
                write_list(f, results)
            }
            Instr::MakeClosure { func, bindings, .. } => {
                write!(f, "make closure {} [", func)?;
                write_list(f, bindings)?;
                write!(f, "]")
            }
            Instr::Extract { tuple, index, .. } => write!(f, "extract {} #{}", tuple, index),
            Instr::Field { x, index, .. } => write!(f, "{}.#{}", x, index),
            Instr::MakeStruct { fields, .. } => {
                write!(f, "struct {{")?;
                write_list(f, fields)?;
                write!(f, "}}")
            }
            Instr::MakeSlice { len, .. } => write!(f, "make slice {}", len),
            Instr::Index { x, index, .. } => write!(f, "{}[{}]", x, index),
            Instr::SetIndex { x, index, value } => write!(f, "{}[{}] = {}", x, index, value),
            Instr::Slice { x, low, high, .. } => {
                write!(f, "slice {}[", x)?;
                if let Some(low) = low {
                    write!(f, "{}", low)?;
                }
                write!(f, ":")?;
                if let Some(high) = high {
                    write!(f, "{}", high)?;
                }
                write!(f, "]")
            }
            Instr::Alloc { init, .. } => match init {
                Some(init) => write!(f, "new {}", init),
                None => write!(f, "new"),
            },
            Instr::Store { addr, value } => write!(f, "*{} = {}", addr, value),
            Instr::LoadGlobal { global, .. } => write!(f, "*{}", global),
            Instr::StoreGlobal { global, value } => write!(f, "*{} = {}", global, value),
            Instr::MakeChan { cap, .. } => write!(f, "make chan {}", cap),
            Instr::Send { chan, x } => write!(f, "send {} <- {}", chan, x),
            Instr::Recv { chan, .. } => write!(f, "<-{}", chan),
        }
    }
}
