//! SSA program model.
//!
//! Units ([`Unit`]) are what the upstream compiler hands over; a
//! [`Program`] is what the engine runs.

pub mod builder;
pub mod instr;
pub mod program;
pub mod unit;

pub use builder::{FunctionBuilder, UnitBuilder};
pub use instr::{
    BinOp, BlockId, Builtin, CallCommon, Callee, Constant, ConvertKind, Instr, Operand, Reg, UnOp,
};
pub use program::{FileId, FileSet, FuncId, Function, Package, Position, Program};
pub use unit::{Located, Pos, TypeKind, TypeRef, Unit, UnitBlock, UnitFunction};
