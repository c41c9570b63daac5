//! Loaded, immutable SSA program.
//!
//! [`Program::build`] flattens the basic blocks of every unit function into a
//! single instruction stream. A function's program counters are offsets into
//! that stream: offset 0 is the entry, and the instruction at index `i`
//! executes at offset `i + 1`.

use crate::error::{LoadError, LoadResult};
use crate::ssa::instr::{BlockId, Instr, Operand, Reg};
use crate::ssa::unit::{Pos, TypeRef, Unit, UnitFunction};
use std::collections::HashMap;
use std::fmt;

/// Index of a function in the program's function arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a file in the program's [`FileSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// Resolved source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub filename: String,
    pub line: u32,
}

/// Maps file ids back to file names.
#[derive(Debug, Default, Clone)]
pub struct FileSet {
    files: Vec<String>,
    index: HashMap<String, FileId>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `name`, adding it on first use.
    pub fn add(&mut self, name: &str) -> FileId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = FileId(self.files.len() as u32);
        self.files.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: FileId) -> &str {
        self.files
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Resolves a position in `file`. Returns `None` for an invalid position.
    pub fn position(&self, file: FileId, pos: Pos) -> Option<Position> {
        if !pos.is_valid() {
            return None;
        }
        Some(Position {
            filename: self.name(file).replace('\\', "/"),
            line: pos.line,
        })
    }
}

/// A compiled function.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: FuncId,
    /// Qualified SSA name.
    pub name: String,
    /// Import path of the owning package.
    pub package: String,
    pub file: FileId,
    pub pos: Pos,
    pub params: Vec<TypeRef>,
    pub results: Vec<TypeRef>,
    pub free_vars: u32,
    pub locals: u32,
    pub instrs: Vec<Instr>,
    pub positions: Vec<Pos>,
    pub recover: Option<BlockId>,
    block_starts: Vec<usize>,
    block_of: Vec<BlockId>,
    preds: Vec<Vec<BlockId>>,
    last_use: Vec<Option<usize>>,
    acyclic: bool,
}

impl Function {
    /// Whether the function has an interpreted body.
    pub fn has_body(&self) -> bool {
        !self.instrs.is_empty()
    }

    /// Length of the instruction stream; the largest valid local offset.
    pub fn len(&self) -> u32 {
        self.instrs.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Whether `offset` lies within `[0, len]`.
    pub fn contains(&self, offset: u32) -> bool {
        offset <= self.len()
    }

    /// Source position of the instruction executing at `offset`.
    pub fn pos_for_offset(&self, offset: u32) -> Pos {
        if offset == 0 {
            return self.pos;
        }
        self.positions
            .get(offset as usize - 1)
            .copied()
            .unwrap_or(Pos::NONE)
    }

    pub fn block_start(&self, block: BlockId) -> usize {
        self.block_starts[block.index()]
    }

    pub fn block_of(&self, index: usize) -> BlockId {
        self.block_of[index]
    }

    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.preds[block.index()]
    }

    pub fn block_count(&self) -> usize {
        self.block_starts.len()
    }

    /// Index of the last instruction reading `reg`, if any reads it.
    pub fn last_use(&self, reg: Reg) -> Option<usize> {
        self.last_use.get(reg.index()).copied().flatten()
    }

    /// Whether control never flows backwards, which makes instruction
    /// indices a valid liveness order. A function with a recover block never
    /// qualifies: any instruction that panics may continue there.
    pub fn is_acyclic(&self) -> bool {
        self.acyclic
    }

    /// Short member name without the package qualifier.
    pub fn member_name(&self) -> &str {
        let name = self.name.as_str();
        let prefix_len = self.package.len() + 1;
        if name.starts_with(&self.package) && name.as_bytes().get(self.package.len()) == Some(&b'.')
        {
            &name[prefix_len..]
        } else {
            name
        }
    }

    fn from_unit(id: FuncId, package: &str, file: FileId, unit: UnitFunction) -> LoadResult<Self> {
        let invalid = |message: String| LoadError::Invalid {
            function: unit.name.clone(),
            message,
        };

        let mut instrs = Vec::new();
        let mut positions = Vec::new();
        let mut block_starts = Vec::with_capacity(unit.blocks.len());
        let mut block_of = Vec::new();
        let mut preds = Vec::with_capacity(unit.blocks.len());
        for (b, block) in unit.blocks.iter().enumerate() {
            block_starts.push(instrs.len());
            preds.push(block.preds.clone());
            for located in &block.instrs {
                instrs.push(located.instr.clone());
                positions.push(located.pos);
                block_of.push(BlockId(b as u32));
            }
        }

        let func = Function {
            id,
            name: unit.name.clone(),
            package: package.to_string(),
            file,
            pos: unit.pos,
            params: unit.params.clone(),
            results: unit.results.clone(),
            free_vars: unit.free_vars,
            locals: unit.locals,
            instrs,
            positions,
            recover: unit.recover,
            block_starts,
            block_of,
            preds,
            last_use: Vec::new(),
            acyclic: true,
        };
        func.sanity_check(&unit).map_err(invalid)?;
        Ok(func.with_liveness())
    }

    /// Structural checks over the body, reported as a message.
    fn sanity_check(&self, unit: &UnitFunction) -> Result<(), String> {
        if unit.blocks.is_empty() {
            return Ok(());
        }
        let nblocks = unit.blocks.len();
        let frame_size = self.frame_size();
        let check_block = |b: BlockId| {
            if b.index() < nblocks {
                Ok(())
            } else {
                Err(format!("reference to missing block {}", b))
            }
        };
        let check_reg = |r: Reg| {
            if r.index() < frame_size {
                Ok(())
            } else {
                Err(format!("register {} outside frame of {} slots", r, frame_size))
            }
        };

        if let Some(recover) = self.recover {
            check_block(recover)?;
        }
        for (b, block) in unit.blocks.iter().enumerate() {
            match block.instrs.last() {
                Some(last) if last.instr.is_terminator() => {}
                _ => return Err(format!("block b{} does not end in a terminator", b)),
            }
            for pred in &block.preds {
                check_block(*pred)?;
            }
            for (i, located) in block.instrs.iter().enumerate() {
                let instr = &located.instr;
                if instr.is_terminator() && i + 1 != block.instrs.len() {
                    return Err(format!("terminator in the middle of block b{}", b));
                }
                if let Instr::Phi { edges, .. } = instr {
                    if edges.len() != block.preds.len() {
                        return Err(format!(
                            "phi in block b{} has {} edges for {} predecessors",
                            b,
                            edges.len(),
                            block.preds.len()
                        ));
                    }
                }
                for target in instr.successors() {
                    check_block(target)?;
                }
                if let Some(dst) = instr.dst() {
                    check_reg(dst)?;
                }
                for op in instr.operands() {
                    if let Operand::Reg(r) = op {
                        check_reg(*r)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of register slots: parameters, free variables, then locals.
    pub fn frame_size(&self) -> usize {
        (self.locals as usize).max(self.params.len() + self.free_vars as usize)
    }

    fn with_liveness(mut self) -> Self {
        let mut last_use = vec![None; self.frame_size()];
        let mut acyclic = self.recover.is_none();
        for (i, instr) in self.instrs.iter().enumerate() {
            for op in instr.operands() {
                if let Operand::Reg(r) = op {
                    last_use[r.index()] = Some(i);
                }
            }
            let here = self.block_of[i];
            if instr.successors().iter().any(|s| *s <= here) {
                acyclic = false;
            }
        }
        self.last_use = last_use;
        self.acyclic = acyclic;
        self
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Name: {}", self.name)?;
        writeln!(f, "# Package: {}", self.package)?;
        if !self.has_body() {
            return writeln!(f, "# (external)");
        }
        for (i, instr) in self.instrs.iter().enumerate() {
            if self.block_starts.contains(&i) {
                let b = self.block_of[i];
                writeln!(f, "{}: preds {:?}", b, self.preds(b))?;
            }
            writeln!(f, "  {:>4}  {}", i + 1, instr)?;
        }
        Ok(())
    }
}

/// One package of the program.
#[derive(Debug, Clone)]
pub struct Package {
    /// Import path.
    pub path: String,
    /// Package clause name.
    pub name: String,
    pub imports: Vec<String>,
    pub files: Vec<FileId>,
    pub functions: Vec<FuncId>,
    pub globals: Vec<String>,
}

impl Package {
    pub fn is_main(&self) -> bool {
        self.name == "main"
    }
}

/// Immutable program: function arena, packages in initialization order,
/// globals and the file set.
#[derive(Debug)]
pub struct Program {
    files: FileSet,
    packages: Vec<Package>,
    functions: Vec<Function>,
    by_name: HashMap<String, FuncId>,
    globals: Vec<String>,
    global_index: HashMap<String, usize>,
    entry: Option<usize>,
}

impl Program {
    /// Builds a program from units listed in dependency order. Units sharing
    /// a package path are merged into one package.
    pub fn build(units: Vec<Unit>) -> LoadResult<Program> {
        let mut program = Program {
            files: FileSet::new(),
            packages: Vec::new(),
            functions: Vec::new(),
            by_name: HashMap::new(),
            globals: Vec::new(),
            global_index: HashMap::new(),
            entry: None,
        };
        let mut package_index: HashMap<String, usize> = HashMap::new();

        for unit in units {
            let file = program.files.add(&unit.file);
            let pkg = *package_index.entry(unit.package.clone()).or_insert_with(|| {
                program.packages.push(Package {
                    path: unit.package.clone(),
                    name: unit.name.clone(),
                    imports: Vec::new(),
                    files: Vec::new(),
                    functions: Vec::new(),
                    globals: Vec::new(),
                });
                program.packages.len() - 1
            });

            let package = &mut program.packages[pkg];
            package.files.push(file);
            for import in &unit.imports {
                if !package.imports.contains(import) {
                    package.imports.push(import.clone());
                }
            }
            for global in &unit.globals {
                if !program.global_index.contains_key(global) {
                    program.global_index.insert(global.clone(), program.globals.len());
                    program.globals.push(global.clone());
                    program.packages[pkg].globals.push(global.clone());
                }
            }

            for unit_func in unit.functions {
                program.add_function(pkg, &unit.package, file, unit_func)?;
            }
        }

        program.check_globals()?;
        Ok(program)
    }

    fn add_function(
        &mut self,
        pkg: usize,
        package: &str,
        file: FileId,
        unit_func: UnitFunction,
    ) -> LoadResult<()> {
        match self.by_name.get(&unit_func.name).copied() {
            // A body replaces an earlier external declaration; a second
            // declaration never replaces anything.
            Some(existing) => {
                let has_body = self.functions[existing.index()].has_body();
                if !unit_func.blocks.is_empty() {
                    if has_body {
                        return Err(LoadError::Invalid {
                            function: unit_func.name,
                            message: "defined more than once".to_string(),
                        });
                    }
                    self.functions[existing.index()] =
                        Function::from_unit(existing, package, file, unit_func)?;
                }
            }
            None => {
                let id = FuncId(self.functions.len() as u32);
                self.by_name.insert(unit_func.name.clone(), id);
                self.functions
                    .push(Function::from_unit(id, package, file, unit_func)?);
                self.packages[pkg].functions.push(id);
            }
        }
        Ok(())
    }

    /// Every global an instruction names must be declared by some unit,
    /// unless it is qualified by a package outside the program.
    fn check_globals(&self) -> LoadResult<()> {
        for func in &self.functions {
            for instr in &func.instrs {
                let global = match instr {
                    Instr::LoadGlobal { global, .. } | Instr::StoreGlobal { global, .. } => global,
                    _ => continue,
                };
                if self.global_index.contains_key(global) {
                    continue;
                }
                let owned_here = self
                    .packages
                    .iter()
                    .any(|p| global.starts_with(&format!("{}.", p.path)));
                if owned_here {
                    return Err(LoadError::Invalid {
                        function: func.name.clone(),
                        message: format!("undeclared global {}", global),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.path == path)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<&Function> {
        self.by_name.get(name).map(|id| &self.functions[id.index()])
    }

    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    pub fn global_index(&self, name: &str) -> Option<usize> {
        self.global_index.get(name).copied()
    }

    /// Designates the entry package by import path.
    pub fn set_entry(&mut self, path: &str) -> bool {
        match self.packages.iter().position(|p| p.path == path) {
            Some(index) => {
                self.entry = Some(index);
                true
            }
            None => false,
        }
    }

    /// The designated entry package, or the last main package.
    pub fn entry_package(&self) -> Option<&Package> {
        match self.entry {
            Some(index) => self.packages.get(index),
            None => self.main_packages().last().copied(),
        }
    }

    pub fn main_packages(&self) -> Vec<&Package> {
        self.packages.iter().filter(|p| p.is_main()).collect()
    }

    /// Resolves `pos` of `func` to a file and line.
    pub fn position(&self, func: &Function, pos: Pos) -> Option<Position> {
        self.files.position(func.file, pos)
    }
}
