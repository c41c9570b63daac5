//! On-disk SSA unit format.
//!
//! A unit is the SSA form of one source file as produced by the upstream
//! compiler, serialized as JSON. Units ending in `_test.ssa` belong to the
//! test variant of their package.

use crate::ssa::instr::{BlockId, Instr};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File extension of SSA units.
pub const UNIT_EXTENSION: &str = "ssa";

/// Suffix marking a unit that belongs to a package's tests.
pub const TEST_UNIT_SUFFIX: &str = "_test.ssa";

/// Suffix of the source files a package's tests are compiled from.
pub const TEST_SOURCE_SUFFIX: &str = "_test.go";

/// Placeholder package path some frontends give to packages built from
/// files named on the command line.
pub const PLACEHOLDER_PACKAGE: &str = "command-line-arguments";

/// Source position within the unit's file. Line 0 is "no position".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    #[serde(default)]
    pub col: u32,
}

impl Pos {
    pub const NONE: Pos = Pos { line: 0, col: 0 };

    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    pub fn is_valid(self) -> bool {
        self.line > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Bool,
    #[default]
    Int,
    Uintptr,
    Float,
    String,
    Error,
    Interface,
    Func,
    Pointer,
    Slice,
    Struct,
    Chan,
}

/// Type of a parameter or result, as much of it as the runtime needs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeRef {
    #[serde(default)]
    pub name: String,
    pub kind: TypeKind,
}

impl TypeRef {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Error)
    }
}

/// An instruction together with its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Located {
    #[serde(flatten)]
    pub instr: Instr,
    #[serde(default)]
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitBlock {
    #[serde(default)]
    pub preds: Vec<BlockId>,
    pub instrs: Vec<Located>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitFunction {
    /// Qualified SSA name, e.g. `main.main$1` or `(*main.T).Get`.
    pub name: String,
    #[serde(default)]
    pub pos: Pos,
    #[serde(default)]
    pub params: Vec<TypeRef>,
    #[serde(default)]
    pub results: Vec<TypeRef>,
    #[serde(default)]
    pub free_vars: u32,
    #[serde(default)]
    pub locals: u32,
    /// Empty for functions implemented outside the program.
    #[serde(default)]
    pub blocks: Vec<UnitBlock>,
    #[serde(default)]
    pub recover: Option<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Unit {
    /// Import path of the package the unit belongs to.
    pub package: String,
    /// Package clause name.
    pub name: String,
    /// Source file the unit was compiled from.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub globals: Vec<String>,
    #[serde(default)]
    pub functions: Vec<UnitFunction>,
}

impl Unit {
    pub fn from_json(src: &[u8]) -> serde_json::Result<Unit> {
        serde_json::from_slice(src)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Whether the unit was compiled from a test file or belongs to an
    /// external test package.
    pub fn is_test(&self) -> bool {
        self.file.ends_with(TEST_SOURCE_SUFFIX) || self.package.ends_with("_test")
    }

    /// Rewrites the unit's package identity from `from` to `to`, including
    /// every qualified name that mentions it.
    pub fn rename_package(&mut self, to: &str) {
        let from = std::mem::replace(&mut self.package, to.to_string());
        if from == to {
            return;
        }
        for global in &mut self.globals {
            *global = requalify(global, &from, to);
        }
        for func in &mut self.functions {
            func.name = requalify(&func.name, &from, to);
            for block in &mut func.blocks {
                for located in &mut block.instrs {
                    requalify_instr(&mut located.instr, &from, to);
                }
            }
        }
    }
}

/// Whether `path` names a test unit.
pub fn is_test_unit(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(TEST_UNIT_SUFFIX))
        .unwrap_or(false)
}

/// Whether `path` names any SSA unit.
pub fn is_unit(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(UNIT_EXTENSION)
}

/// Replaces the package qualifier `from` with `to` in a qualified name.
///
/// Handles plain members (`pkg.f`), receivers (`(pkg.T).M`, `(*pkg.T).M`)
/// and an empty placeholder identity (`.f`).
pub fn requalify(name: &str, from: &str, to: &str) -> String {
    let plain = format!("{}.", from);
    if let Some(rest) = name.strip_prefix(&plain) {
        return format!("{}.{}", to, rest);
    }
    for open in ["(*", "("] {
        let qualified = format!("{}{}", open, plain);
        if let Some(rest) = name.strip_prefix(&qualified) {
            return format!("{}{}.{}", open, to, rest);
        }
    }
    name.to_string()
}

fn requalify_instr(instr: &mut Instr, from: &str, to: &str) {
    use crate::ssa::instr::{Callee, Operand};

    fn fix_operand(op: &mut Operand, from: &str, to: &str) {
        if let Operand::Func(name) = op {
            *name = requalify(name, from, to);
        }
    }

    fn fix_call(call: &mut crate::ssa::instr::CallCommon, from: &str, to: &str) {
        match &mut call.callee {
            Callee::Static(name) => *name = requalify(name, from, to),
            Callee::Dynamic(op) => fix_operand(op, from, to),
            Callee::Builtin(_) => {}
        }
        for arg in &mut call.args {
            fix_operand(arg, from, to);
        }
    }

    match instr {
        Instr::Call { call, .. } | Instr::Go { call } | Instr::Defer { call } => {
            fix_call(call, from, to)
        }
        Instr::MakeClosure { func, bindings, .. } => {
            *func = requalify(func, from, to);
            for b in bindings {
                fix_operand(b, from, to);
            }
        }
        Instr::LoadGlobal { global, .. } => *global = requalify(global, from, to),
        Instr::StoreGlobal { global, value } => {
            *global = requalify(global, from, to);
            fix_operand(value, from, to);
        }
        Instr::Phi { edges, .. } => {
            for e in edges {
                fix_operand(e, from, to);
            }
        }
        Instr::Return { results } => {
            for r in results {
                fix_operand(r, from, to);
            }
        }
        Instr::Store { value, .. } | Instr::Send { x: value, .. } => fix_operand(value, from, to),
        Instr::MakeStruct { fields, .. } => {
            for field in fields {
                fix_operand(field, from, to);
            }
        }
        Instr::SetIndex { value, .. } => fix_operand(value, from, to),
        Instr::Alloc {
            init: Some(init), ..
        } => fix_operand(init, from, to),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssa::instr::{CallCommon, Operand};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case::plain("command-line-arguments.main", "main.main")]
    #[case::closure("command-line-arguments.main$1", "main.main$1")]
    #[case::pointer_receiver("(*command-line-arguments.T).Get", "(*main.T).Get")]
    #[case::value_receiver("(command-line-arguments.T).Get$bound", "(main.T).Get$bound")]
    #[case::other_package("fmt.Println", "fmt.Println")]
    #[case::prefix_only("command-line-argumentsx.f", "command-line-argumentsx.f")]
    fn test_requalify(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(requalify(name, PLACEHOLDER_PACKAGE, "main"), expected);
    }

    #[test]
    fn test_requalify_empty_identity() {
        assert_eq!(requalify(".main", "", "main"), "main.main");
    }

    #[test]
    fn test_rename_package_rewrites_references() {
        let mut unit = Unit {
            package: PLACEHOLDER_PACKAGE.to_string(),
            name: "main".to_string(),
            file: "main.go".to_string(),
            globals: vec!["command-line-arguments.count".to_string()],
            functions: vec![UnitFunction {
                name: "command-line-arguments.main".to_string(),
                blocks: vec![UnitBlock {
                    preds: vec![],
                    instrs: vec![
                        Located {
                            instr: Instr::Call {
                                dst: None,
                                call: CallCommon::named(
                                    "command-line-arguments.helper",
                                    vec![Operand::func("command-line-arguments.main$1")],
                                ),
                            },
                            pos: Pos::new(3, 2),
                        },
                        Located {
                            instr: Instr::ret(vec![]),
                            pos: Pos::NONE,
                        },
                    ],
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        unit.rename_package("main");

        assert_eq!(unit.package, "main");
        assert_eq!(unit.globals, vec!["main.count".to_string()]);
        assert_eq!(unit.functions[0].name, "main.main");
        assert_eq!(
            unit.functions[0].blocks[0].instrs[0].instr,
            Instr::Call {
                dst: None,
                call: CallCommon::named("main.helper", vec![Operand::func("main.main$1")]),
            }
        );
    }

    #[test]
    fn test_unit_json_shape() {
        let src = br#"{
            "package": "main",
            "name": "main",
            "file": "/src/main.go",
            "imports": ["fmt"],
            "functions": [{
                "name": "main.main",
                "pos": {"line": 3},
                "locals": 1,
                "blocks": [{"instrs": [
                    {"op": "call", "dst": 0, "call": {"callee": {"static": "fmt.Println"}, "args": [{"const": {"string": "hi"}}]}, "pos": {"line": 4, "col": 13}},
                    {"op": "return", "pos": {"line": 5}}
                ]}]
            }]
        }"#;
        let unit = Unit::from_json(src).unwrap();
        assert_eq!(unit.imports, vec!["fmt".to_string()]);
        let func = &unit.functions[0];
        assert_eq!(func.pos, Pos::new(3, 0));
        assert_eq!(func.blocks[0].instrs.len(), 2);
        assert_eq!(
            func.blocks[0].instrs[0].instr,
            Instr::call(Some(0), "fmt.Println", vec![Operand::str("hi")])
        );
        assert_eq!(func.blocks[0].instrs[1].pos, Pos::new(5, 0));
    }

    #[test]
    fn test_unit_file_classification() {
        assert!(is_unit(Path::new("pkg/main.ssa")));
        assert!(is_test_unit(Path::new("pkg/main_test.ssa")));
        assert!(!is_test_unit(Path::new("pkg/main.ssa")));
        assert!(!is_unit(Path::new("pkg/main.go")));
    }

    #[rstest]
    #[case("ex/calc", "calc.go", false)]
    #[case("ex/calc", "calc_test.go", true)]
    #[case("ex/calc_test", "example.go", true)]
    #[case("ex/calc", "", false)]
    fn test_test_unit_identity(#[case] package: &str, #[case] file: &str, #[case] expected: bool) {
        let unit = Unit {
            package: package.to_string(),
            file: file.to_string(),
            ..Unit::default()
        };
        assert_eq!(unit.is_test(), expected);
    }
}
