//! Forced collection over the interpreted frame chain.

mod common;

use common::*;
use common::assert_eq;
use gossa_runtime::bridge::{Registry, RegistryBuilder};
use gossa_runtime::marshal::{Kind, NativeSignature};
use gossa_runtime::ssa::{BinOp, BlockId, Builtin, CallCommon, Instr, Operand, Reg, UnOp, Unit};
use gossa_runtime::{stdlib, CaptureBuffer, Interp, Value};
use std::sync::Arc;

/// The standard shims plus `gctest.Collect`, which forces a collection and
/// returns how many registers it released.
fn collecting_registry() -> Arc<Registry> {
    let mut b = RegistryBuilder::new();
    stdlib::register_all(&mut b);
    b.native(
        "gctest.Collect",
        NativeSignature::new(vec![], vec![Kind::Int]),
        |fr, _| Ok(vec![Value::Int(fr.interp().collect(fr) as i64)]),
    );
    Arc::new(b.build())
}

fn run_collecting(units: Vec<Unit>) -> String {
    let stdout = CaptureBuffer::new();
    let interp = Interp::builder(Arc::new(program(units)), collecting_registry())
        .stdout(stdout.writer())
        .build();
    assert_eq!(interp.run("main").unwrap(), 0);
    stdout.contents()
}

fn collect_into(dst: u32) -> Instr {
    Instr::call(Some(dst), "gctest.Collect", vec![])
}

#[test]
fn test_dead_registers_are_released() {
    let main = func("main.main")
        .locals(2)
        .instr(binop(0, BinOp::Add, Operand::int(1), Operand::int(1)))
        .instr(println(vec![reg(0)]))
        .instr(collect_into(1))
        .instr(println(vec![reg(1)]))
        .ret()
        .build();

    assert_eq!(run_collecting(vec![main_unit(vec![main])]), "2\n1\n");
}

#[test]
fn test_live_registers_survive() {
    let main = func("main.main")
        .locals(2)
        .instr(binop(0, BinOp::Add, Operand::int(20), Operand::int(22)))
        .instr(collect_into(1))
        .instr(println(vec![reg(0), reg(1)]))
        .ret()
        .build();

    assert_eq!(run_collecting(vec![main_unit(vec![main])]), "42 0\n");
}

#[test]
fn test_collection_walks_every_caller() {
    let main = func("main.main")
        .locals(2)
        .instr(binop(0, BinOp::Add, Operand::int(1), Operand::int(2)))
        .instr(println(vec![reg(0)]))
        .instr(Instr::call(Some(1), "main.inner", vec![]))
        .instr(println(vec![reg(1)]))
        .ret()
        .build();
    let inner = func("main.inner")
        .result(int_type())
        .locals(2)
        .instr(binop(0, BinOp::Mul, Operand::int(2), Operand::int(2)))
        .instr(println(vec![reg(0)]))
        .instr(collect_into(1))
        .instr(ret(vec![reg(1)]))
        .build();

    // One dead register in each frame.
    assert_eq!(run_collecting(vec![main_unit(vec![main, inner])]), "3\n4\n2\n");
}

#[test]
fn test_frames_with_loops_are_left_alone() {
    let main = func("main.main")
        .locals(4)
        .instr(Instr::Jump { target: BlockId(1) })
        .block(&[0, 2])
        .instr(Instr::Phi {
            dst: Reg(0),
            edges: vec![Operand::int(0), reg(2)],
        })
        .instr(binop(1, BinOp::Lt, reg(0), Operand::int(2)))
        .instr(Instr::If {
            cond: reg(1),
            then: BlockId(2),
            otherwise: BlockId(3),
        })
        .block(&[1])
        .instr(binop(2, BinOp::Add, reg(0), Operand::int(1)))
        .instr(collect_into(3))
        .instr(println(vec![reg(3)]))
        .instr(Instr::Jump { target: BlockId(1) })
        .block(&[1])
        .ret()
        .build();

    assert_eq!(run_collecting(vec![main_unit(vec![main])]), "0\n0\n");
}

#[test]
fn test_runtime_gc_keeps_program_state() {
    let main = func("main.main")
        .locals(1)
        .instr(binop(0, BinOp::Add, Operand::int(3), Operand::int(4)))
        .instr(Instr::call(None, "runtime.GC", vec![]))
        .instr(println(vec![reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.stdout, "7\n");
}

#[test]
fn test_gc_in_deferred_call_keeps_recover_block_inputs() {
    let main = func("main.main")
        .locals(1)
        .instr(Instr::call(Some(0), "main.f", vec![]))
        .instr(println(vec![reg(0)]))
        .ret()
        .build();
    // The recover block is laid out before the panic and reads r0.
    let f = func("main.f")
        .result(int_type())
        .locals(2)
        .recover_block(1)
        .instr(Instr::Alloc {
            dst: Reg(0),
            init: Some(Operand::int(42)),
        })
        .instr(Instr::Defer {
            call: CallCommon::named("main.f$1", vec![]),
        })
        .instr(Instr::Jump { target: BlockId(2) })
        .block(&[])
        .instr(Instr::UnOp {
            dst: Reg(1),
            unop: UnOp::Deref,
            x: reg(0),
        })
        .instr(ret(vec![reg(1)]))
        .block(&[0])
        .instr(panic(Operand::str("boom")))
        .build();
    let handler = func("main.f$1")
        .locals(1)
        .instr(Instr::Call {
            dst: Some(Reg(0)),
            call: CallCommon::builtin(Builtin::Recover, vec![]),
        })
        .instr(Instr::call(None, "runtime.GC", vec![]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, f, handler])]);
    assert_eq!(out.code, 0, "{}", out.stderr);
    assert_eq!(out.stdout, "42\n");
}
