//! `runtime.Caller`, `runtime.Callers`, `runtime.FuncForPC` and stack text.

mod common;

use common::*;
use common::assert_eq;
use gossa_runtime::bridge;
use gossa_runtime::introspect::{self, Pc};
use gossa_runtime::ssa::{BinOp, Builtin, CallCommon, Instr, Operand, Reg};
use gossa_runtime::Interp;
use proptest::prelude::*;
use std::sync::Arc;

fn extract(dst: u32, tuple: u32, index: usize) -> Instr {
    Instr::Extract {
        dst: Reg(dst),
        tuple: reg(tuple),
        index,
    }
}

// ============================================================================
// runtime.Caller
// ============================================================================

#[test]
fn test_caller_reports_calling_line() {
    let main = func("main.main")
        .at(3)
        .locals(3)
        .line(5)
        .instr(Instr::call(Some(0), "runtime.Caller", vec![Operand::int(0)]))
        .instr(extract(1, 0, 1))
        .instr(extract(2, 0, 2))
        .instr(println(vec![reg(1), reg(2)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.stdout, "main.go 5\n");
}

#[test]
fn test_caller_skip_reaches_the_call_site() {
    let main = func("main.main")
        .at(3)
        .line(10)
        .instr(Instr::call(None, "main.where", vec![]))
        .ret()
        .build();
    let where_ = func("main.where")
        .at(19)
        .locals(4)
        .line(20)
        .instr(Instr::call(Some(0), "runtime.Caller", vec![Operand::int(1)]))
        .instr(extract(1, 0, 2))
        .instr(extract(2, 0, 3))
        .instr(println(vec![reg(1), reg(2)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, where_])]);
    assert_eq!(out.stdout, "10 true\n");
}

#[test]
fn test_caller_beyond_the_stack_is_not_ok() {
    let main = func("main.main")
        .locals(3)
        .instr(Instr::call(Some(0), "runtime.Caller", vec![Operand::int(50)]))
        .instr(extract(1, 0, 3))
        .instr(extract(2, 0, 2))
        .instr(println(vec![reg(1), reg(2)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.stdout, "false 0\n");
}

// ============================================================================
// runtime.Callers and runtime.FuncForPC
// ============================================================================

#[test]
fn test_callers_counts_frames() {
    let main = func("main.main")
        .locals(2)
        .instr(Instr::MakeSlice {
            dst: Reg(0),
            len: Operand::int(16),
        })
        .instr(Instr::call(
            Some(1),
            "runtime.Callers",
            vec![Operand::int(0), reg(0)],
        ))
        .instr(println(vec![reg(1)]))
        .ret()
        .build();

    // runtime.Callers itself, then main.main.
    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.stdout, "2\n");
}

fn field(dst: u32, x: u32, index: usize) -> Instr {
    Instr::Field {
        dst: Reg(dst),
        x: reg(x),
        index,
    }
}

#[test]
fn test_callers_frames_resolves_each_counter() {
    let main = func("main.main")
        .at(3)
        .locals(15)
        .line(4)
        .instr(Instr::MakeSlice {
            dst: Reg(0),
            len: Operand::int(16),
        })
        .instr(Instr::call(
            Some(1),
            "runtime.Callers",
            vec![Operand::int(0), reg(0)],
        ))
        .line(5)
        .instr(Instr::call(Some(2), "runtime.CallersFrames", vec![reg(0)]))
        .instr(Instr::call(Some(3), "(*runtime.Frames).Next", vec![reg(2)]))
        .instr(extract(4, 3, 0))
        .instr(extract(5, 3, 1))
        .instr(field(6, 4, 2))
        .instr(field(7, 4, 3))
        .instr(field(8, 4, 4))
        .instr(println(vec![reg(6), reg(7), reg(8), reg(5)]))
        .instr(Instr::call(Some(9), "(*runtime.Frames).Next", vec![reg(2)]))
        .instr(extract(10, 9, 0))
        .instr(extract(11, 9, 1))
        .instr(field(12, 10, 2))
        .instr(field(13, 10, 3))
        .instr(field(14, 10, 4))
        .instr(println(vec![reg(12), reg(13), reg(14), reg(11)]))
        .ret()
        .build();

    // Unused slots of the counter slice resolve to nothing and are skipped.
    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(
        out.stdout,
        "runtime.Callers ? 0 true\nmain.main main.go 4 false\n"
    );
}

#[test]
fn test_func_for_pc_names_closures() {
    let main = func("main.main")
        .locals(1)
        .instr(Instr::MakeClosure {
            dst: Reg(0),
            func: "main.main$1".to_string(),
            bindings: vec![],
        })
        .instr(Instr::Call {
            dst: None,
            call: CallCommon::value(reg(0), vec![]),
        })
        .ret()
        .build();
    let closure = func("main.main$1")
        .locals(4)
        .instr(Instr::call(Some(0), "runtime.Caller", vec![Operand::int(0)]))
        .instr(extract(1, 0, 0))
        .instr(Instr::call(Some(2), "runtime.FuncForPC", vec![reg(1)]))
        .instr(Instr::call(Some(3), "(*runtime.Func).Name", vec![reg(2)]))
        .instr(println(vec![reg(3)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, closure])]);
    assert_eq!(out.stdout, "main.main.func1\n");
}

#[test]
fn test_func_for_pc_of_unknown_counter_is_nil() {
    let main = func("main.main")
        .locals(1)
        .instr(Instr::call(
            Some(0),
            "runtime.FuncForPC",
            vec![Operand::int(0xdead << 32)],
        ))
        .instr(println(vec![reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.stdout, "<nil>\n");
}

// ============================================================================
// Stack text
// ============================================================================

#[test]
fn test_debug_stack_starts_at_caller() {
    let main = func("main.main")
        .at(3)
        .line(4)
        .instr(Instr::call(None, "main.show", vec![]))
        .ret()
        .build();
    let show = func("main.show")
        .at(6)
        .locals(1)
        .line(7)
        .instr(Instr::call(Some(0), "runtime/debug.Stack", vec![]))
        .instr(Instr::call(None, "fmt.Print", vec![reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, show])]);
    assert_eq!(
        out.stdout,
        "goroutine 1 [running]:\n\
         main.show()\n\tmain.go:7 +0x1\n\
         main.main()\n\tmain.go:4 +0x1\n"
    );
}

#[test]
fn test_stack_inside_deferred_call_shows_panic() {
    let main = func("main.main")
        .at(3)
        .line(4)
        .instr(Instr::Defer {
            call: CallCommon::named("main.main$1", vec![]),
        })
        .line(5)
        .instr(panic(Operand::str("x")))
        .build();
    let handler = func("main.main$1")
        .at(4)
        .locals(2)
        .line(6)
        .instr(Instr::Call {
            dst: Some(Reg(0)),
            call: CallCommon::builtin(Builtin::Recover, vec![]),
        })
        .line(7)
        .instr(Instr::call(Some(1), "runtime/debug.Stack", vec![]))
        .instr(Instr::call(None, "fmt.Print", vec![reg(1)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, handler])]);
    assert_eq!(out.code, 0);
    assert_eq!(
        out.stdout,
        "goroutine 1 [running]:\n\
         main.main.func1()\n\tmain.go:7 +0x2\n\
         panic()\n\t?:0\n\
         main.main()\n\tmain.go:5 +0x2\n"
    );
}

#[test]
fn test_stack_after_recovery_omits_panic() {
    let main = func("main.main")
        .at(3)
        .line(4)
        .instr(Instr::Defer {
            call: CallCommon::named("main.report", vec![]),
        })
        .line(5)
        .instr(Instr::Defer {
            call: CallCommon::named("main.rescue", vec![]),
        })
        .line(6)
        .instr(panic(Operand::str("x")))
        .build();
    let rescue = func("main.rescue")
        .at(8)
        .locals(1)
        .line(9)
        .instr(Instr::Call {
            dst: Some(Reg(0)),
            call: CallCommon::builtin(Builtin::Recover, vec![]),
        })
        .ret()
        .build();
    let report = func("main.report")
        .at(11)
        .locals(1)
        .line(12)
        .instr(Instr::call(Some(0), "runtime/debug.Stack", vec![]))
        .instr(Instr::call(None, "fmt.Print", vec![reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, rescue, report])]);
    assert_eq!(out.code, 0);
    assert_eq!(
        out.stdout,
        "goroutine 1 [running]:\n\
         main.report()\n\tmain.go:12 +0x1\n\
         main.main()\n\tmain.go:6 +0x3\n"
    );
}

// ============================================================================
// Counter resolution
// ============================================================================

fn straight_line(len: usize) -> Arc<Interp> {
    let body = (0..len).fold(func("main.main").locals(1), |f, _| {
        f.instr(binop(
            0,
            BinOp::Add,
            Operand::int(1),
            Operand::int(1),
        ))
    });
    let units = vec![main_unit(vec![body.ret().build()])];
    Interp::builder(Arc::new(program(units)), bridge::global()).build()
}

proptest! {
    #[test]
    fn prop_counters_resolve_within_function(len in 1usize..32, offset in 0u32..64) {
        let interp = straight_line(len);
        let id = interp.program().lookup("main.main").map(|f| f.id).unwrap();
        let raw = Pc::Interp { func: id, offset }.to_raw();
        let found = introspect::find_func_by_pc(&interp, raw).map(|f| f.name.clone());
        // The body is `len` adds plus the return.
        if offset as usize <= len + 1 {
            prop_assert_eq!(found, Some("main.main".to_string()));
        } else {
            prop_assert_eq!(found, None);
        }
    }
}
