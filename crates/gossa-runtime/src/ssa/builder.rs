//! Fluent construction of SSA units.
//!
//! Used by the loader to synthesize test-main packages, and by embedders
//! that generate units in memory.
//!
//! ```
//! use gossa_runtime::ssa::{FunctionBuilder, Instr, Operand, UnitBuilder};
//!
//! let unit = UnitBuilder::new("main", "main", "hello.go")
//!     .import("fmt")
//!     .function(
//!         FunctionBuilder::new("main.main")
//!             .at(3)
//!             .line(4)
//!             .instr(Instr::call(None, "fmt.Println", vec![Operand::str("hello")]))
//!             .ret()
//!             .build(),
//!     )
//!     .build();
//! assert_eq!(unit.functions.len(), 1);
//! ```

use crate::ssa::instr::{BlockId, Instr};
use crate::ssa::unit::{Located, Pos, TypeRef, Unit, UnitBlock, UnitFunction};

pub struct UnitBuilder {
    unit: Unit,
}

impl UnitBuilder {
    pub fn new(package: &str, name: &str, file: &str) -> Self {
        Self {
            unit: Unit {
                package: package.to_string(),
                name: name.to_string(),
                file: file.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn import(mut self, path: &str) -> Self {
        self.unit.imports.push(path.to_string());
        self
    }

    pub fn global(mut self, name: &str) -> Self {
        self.unit.globals.push(name.to_string());
        self
    }

    pub fn function(mut self, func: UnitFunction) -> Self {
        self.unit.functions.push(func);
        self
    }

    pub fn build(self) -> Unit {
        self.unit
    }
}

pub struct FunctionBuilder {
    func: UnitFunction,
    line: u32,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            func: UnitFunction {
                name: name.to_string(),
                ..Default::default()
            },
            line: 0,
        }
    }

    /// Declaration line.
    pub fn at(mut self, line: u32) -> Self {
        self.func.pos = Pos::new(line, 1);
        self
    }

    pub fn param(mut self, ty: TypeRef) -> Self {
        self.func.params.push(ty);
        self
    }

    pub fn result(mut self, ty: TypeRef) -> Self {
        self.func.results.push(ty);
        self
    }

    pub fn free_vars(mut self, count: u32) -> Self {
        self.func.free_vars = count;
        self
    }

    pub fn locals(mut self, count: u32) -> Self {
        self.func.locals = count;
        self
    }

    /// Source line attached to the instructions that follow.
    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Starts a new basic block with the given predecessors.
    pub fn block(mut self, preds: &[u32]) -> Self {
        if self.func.blocks.is_empty() {
            self.func.blocks.push(UnitBlock::default());
        }
        self.func.blocks.push(UnitBlock {
            preds: preds.iter().map(|p| BlockId(*p)).collect(),
            instrs: Vec::new(),
        });
        self
    }

    pub fn recover_block(mut self, block: u32) -> Self {
        self.func.recover = Some(BlockId(block));
        self
    }

    pub fn instr(mut self, instr: Instr) -> Self {
        if self.func.blocks.is_empty() {
            self.func.blocks.push(UnitBlock::default());
        }
        let pos = if self.line > 0 {
            Pos::new(self.line, 1)
        } else {
            Pos::NONE
        };
        if let Some(block) = self.func.blocks.last_mut() {
            block.instrs.push(Located { instr, pos });
        }
        self
    }

    /// Appends `return` with no results.
    pub fn ret(self) -> Self {
        self.instr(Instr::ret(Vec::new()))
    }

    pub fn build(self) -> UnitFunction {
        self.func
    }
}
