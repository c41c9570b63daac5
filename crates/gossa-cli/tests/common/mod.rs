//! Helpers for the CLI tests: on-disk packages built from SSA units and a
//! `gossa` command isolated from the caller's environment.

#![allow(dead_code)]

use assert_cmd::Command;
use gossa_runtime::ssa::{
    BinOp, FunctionBuilder, Instr, Operand, Reg, TypeKind, TypeRef, Unit, UnitBuilder,
};
use std::fs;
use std::path::Path;

/// `gossa` running in `dir` with no gossa settings inherited.
pub fn gossa(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gossa").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("GOSSA_LOG")
        .env_remove("GOSSA_ENTRY")
        .env_remove("GOSSA_TRACE")
        .env_remove("GOSSA_DISABLE_RECOVER");
    cmd
}

pub fn write_unit(dir: &Path, file: &str, unit: &Unit) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(file), unit.to_json().unwrap()).unwrap();
}

/// `package main` whose main prints `text`.
pub fn hello(text: &str) -> Unit {
    UnitBuilder::new("main", "main", "main.go")
        .import("fmt")
        .function(
            FunctionBuilder::new("main.main")
                .instr(Instr::call(None, "fmt.Println", vec![Operand::str(text)]))
                .ret()
                .build(),
        )
        .build()
}

/// `package main` whose main calls `os.Exit(code)`.
pub fn exits_with(code: i64) -> Unit {
    UnitBuilder::new("main", "main", "exit.go")
        .import("os")
        .function(
            FunctionBuilder::new("main.main")
                .instr(Instr::call(None, "os.Exit", vec![Operand::int(code)]))
                .ret()
                .build(),
        )
        .build()
}

/// `package main` that panics with `msg`.
pub fn panics_with(msg: &str) -> Unit {
    UnitBuilder::new("main", "main", "main.go")
        .function(
            FunctionBuilder::new("main.main")
                .at(3)
                .line(4)
                .instr(Instr::Panic {
                    x: Operand::str(msg),
                })
                .build(),
        )
        .build()
}

fn int_type() -> TypeRef {
    TypeRef::new("int", TypeKind::Int)
}

/// Package `ex/calc` with `Add` and a test file; `failing` adds a test that
/// reports an error on line 8 of calc_test.go.
pub fn calc_package(dir: &Path, failing: bool) {
    write_unit(
        dir,
        "calc.ssa",
        &UnitBuilder::new("ex/calc", "calc", "calc.go")
            .function(
                FunctionBuilder::new("ex/calc.Add")
                    .param(int_type())
                    .param(int_type())
                    .result(int_type())
                    .locals(3)
                    .instr(Instr::BinOp {
                        dst: Reg(2),
                        binop: BinOp::Add,
                        x: Operand::reg(0),
                        y: Operand::reg(1),
                    })
                    .instr(Instr::Return {
                        results: vec![Operand::reg(2)],
                    })
                    .build(),
            )
            .build(),
    );

    let t = TypeRef::new("*testing.T", TypeKind::Pointer);
    let mut tests = UnitBuilder::new("ex/calc", "calc", "calc_test.go")
        .import("testing")
        .function(
            FunctionBuilder::new("ex/calc.TestAdd")
                .at(5)
                .param(t.clone())
                .locals(2)
                .instr(Instr::call(
                    Some(1),
                    "ex/calc.Add",
                    vec![Operand::int(2), Operand::int(2)],
                ))
                .ret()
                .build(),
        );
    if failing {
        tests = tests.function(
            FunctionBuilder::new("ex/calc.TestBad")
                .at(7)
                .param(t)
                .line(8)
                .instr(Instr::call(
                    None,
                    "(*testing.T).Error",
                    vec![Operand::reg(0), Operand::str("bad")],
                ))
                .ret()
                .build(),
        );
    }
    write_unit(dir, "calc_test.ssa", &tests.build());
}
