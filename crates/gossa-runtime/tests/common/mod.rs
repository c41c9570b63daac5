//! Shared helpers for the integration tests.
//!
//! Programs are assembled in memory with the unit builders and run against
//! the process-wide registry, with both output streams captured.

#![allow(dead_code)]

use gossa_runtime::bridge;
use gossa_runtime::ssa::{
    BinOp, FunctionBuilder, Instr, Operand, Program, Reg, TypeKind, TypeRef, Unit, UnitBuilder,
    UnitFunction,
};
use gossa_runtime::{CaptureBuffer, ExecOptions, Interp, RuntimeError};
use std::sync::Arc;

pub use pretty_assertions::assert_eq;

/// Result of one interpreted run.
#[derive(Debug)]
pub struct Outcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Builds `units` into a program whose entry is package `main`.
pub fn program(units: Vec<Unit>) -> Program {
    let mut program = Program::build(units).expect("program should build");
    assert!(program.set_entry("main"), "no main package");
    program
}

/// Runs `main.main` with default options.
pub fn run(units: Vec<Unit>) -> Outcome {
    run_with(units, ExecOptions::default()).expect("engine error")
}

pub fn run_with(units: Vec<Unit>, options: ExecOptions) -> Result<Outcome, RuntimeError> {
    let stdout = CaptureBuffer::new();
    let stderr = CaptureBuffer::new();
    let interp = Interp::builder(Arc::new(program(units)), bridge::global())
        .options(options)
        .stdout(stdout.writer())
        .stderr(stderr.writer())
        .build();
    let code = interp.run("main")?;
    Ok(Outcome {
        code,
        stdout: stdout.contents(),
        stderr: stderr.contents(),
    })
}

/// A `main` package in file `main.go` holding `functions`.
pub fn main_unit(functions: Vec<UnitFunction>) -> Unit {
    functions
        .into_iter()
        .fold(UnitBuilder::new("main", "main", "main.go"), |unit, func| {
            unit.function(func)
        })
        .build()
}

pub fn func(name: &str) -> FunctionBuilder {
    FunctionBuilder::new(name)
}

pub fn int_type() -> TypeRef {
    TypeRef::new("int", TypeKind::Int)
}

pub fn string_type() -> TypeRef {
    TypeRef::new("string", TypeKind::String)
}

pub fn any_type() -> TypeRef {
    TypeRef::new("interface{}", TypeKind::Interface)
}

pub fn reg(index: u32) -> Operand {
    Operand::reg(index)
}

/// `fmt.Println(args...)`.
pub fn println(args: Vec<Operand>) -> Instr {
    Instr::call(None, "fmt.Println", args)
}

pub fn binop(dst: u32, binop: BinOp, x: Operand, y: Operand) -> Instr {
    Instr::BinOp {
        dst: Reg(dst),
        binop,
        x,
        y,
    }
}

pub fn panic(x: Operand) -> Instr {
    Instr::Panic { x }
}

pub fn ret(results: Vec<Operand>) -> Instr {
    Instr::Return { results }
}
