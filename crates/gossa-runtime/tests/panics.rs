//! Panics, recovery and the unrecovered-panic report.

mod common;

use common::*;
use common::assert_eq;
use gossa_runtime::ssa::{BinOp, Builtin, CallCommon, Instr, Operand, Reg};
use gossa_runtime::{ExecOptions, RuntimeError};

fn recover_into(dst: u32) -> Instr {
    Instr::Call {
        dst: Some(Reg(dst)),
        call: CallCommon::builtin(Builtin::Recover, vec![]),
    }
}

fn deferred(name: &str) -> Instr {
    Instr::Defer {
        call: CallCommon::named(name, vec![]),
    }
}

#[test]
fn test_unrecovered_panic_reports_stack() {
    let main = func("main.main")
        .at(3)
        .line(4)
        .instr(panic(Operand::str("x")))
        .build();

    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.code, 2);
    assert_eq!(
        out.stderr,
        "panic: x\n\ngoroutine 1 [running]:\npanic()\n\t?:0\nmain.main()\n\tmain.go:4 +0x1\n"
    );
}

#[test]
fn test_trace_lists_every_unwound_frame() {
    let main = func("main.main")
        .at(3)
        .line(4)
        .instr(Instr::call(None, "main.f", vec![]))
        .ret()
        .build();
    let f = func("main.f")
        .at(7)
        .line(8)
        .instr(println(vec![Operand::str("in f")]))
        .line(9)
        .instr(panic(Operand::str("deep")))
        .build();

    let out = run(vec![main_unit(vec![main, f])]);
    assert_eq!(out.code, 2);
    assert_eq!(out.stdout, "in f\n");
    assert_eq!(
        out.stderr,
        "panic: deep\n\n\
         goroutine 1 [running]:\n\
         panic()\n\t?:0\n\
         main.f()\n\tmain.go:9 +0x2\n\
         main.main()\n\tmain.go:4 +0x1\n"
    );
}

#[test]
fn test_recover_in_deferred_call_stops_panic() {
    let main = func("main.main")
        .instr(Instr::call(None, "main.safe", vec![]))
        .instr(println(vec![Operand::str("after")]))
        .ret()
        .build();
    let safe = func("main.safe")
        .instr(deferred("main.safe$1"))
        .instr(panic(Operand::str("boom")))
        .build();
    let handler = func("main.safe$1")
        .locals(1)
        .instr(recover_into(0))
        .instr(println(vec![Operand::str("recovered:"), reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, safe, handler])]);
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "recovered: boom\nafter\n");
    assert_eq!(out.stderr, "");
}

#[test]
fn test_recovered_frame_resumes_at_recover_block() {
    let main = func("main.main")
        .locals(1)
        .instr(Instr::call(Some(0), "main.lookup", vec![]))
        .instr(println(vec![reg(0)]))
        .ret()
        .build();
    let lookup = func("main.lookup")
        .result(string_type())
        .locals(2)
        .recover_block(1)
        .instr(deferred("main.lookup$1"))
        .instr(Instr::MakeSlice {
            dst: Reg(0),
            len: Operand::int(2),
        })
        .instr(Instr::Index {
            dst: Reg(1),
            x: reg(0),
            index: Operand::int(5),
        })
        .instr(ret(vec![Operand::str("unreachable")]))
        .block(&[])
        .instr(ret(vec![Operand::str("fallback")]))
        .build();
    let handler = func("main.lookup$1")
        .locals(1)
        .instr(recover_into(0))
        .instr(println(vec![reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, lookup, handler])]);
    assert_eq!(
        out.stdout,
        "runtime error: index out of range [5] with length 2\nfallback\n"
    );
}

#[test]
fn test_recover_outside_deferred_call_is_nil() {
    let main = func("main.main")
        .locals(1)
        .instr(recover_into(0))
        .instr(println(vec![reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.stdout, "<nil>\n");
}

#[test]
fn test_recover_deferred_by_deferred_call_does_not_stop_panic() {
    let main = func("main.main")
        .instr(deferred("main.main$1"))
        .instr(panic(Operand::str("outer")))
        .build();
    let handler = func("main.main$1")
        .instr(Instr::Defer {
            call: CallCommon::builtin(Builtin::Recover, vec![]),
        })
        .instr(Instr::RunDefers)
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, handler])]);
    assert_eq!(out.code, 2);
    assert!(out.stderr.starts_with("panic: outer\n\n"), "{}", out.stderr);
}

#[test]
fn test_deferred_recover_in_panicking_frame_is_nil() {
    let main = func("main.main")
        .instr(Instr::Defer {
            call: CallCommon::builtin(Builtin::Recover, vec![]),
        })
        .instr(panic(Operand::str("x")))
        .build();

    let out = run(vec![main_unit(vec![main])]);
    assert_eq!(out.code, 2);
    assert!(out.stderr.starts_with("panic: x\n\n"), "{}", out.stderr);
}

#[test]
fn test_divide_by_zero_is_a_recoverable_panic() {
    let main = func("main.main")
        .locals(1)
        .instr(deferred("main.main$1"))
        .instr(binop(0, BinOp::Div, Operand::int(1), Operand::int(0)))
        .ret()
        .build();
    let handler = func("main.main$1")
        .locals(1)
        .instr(recover_into(0))
        .instr(println(vec![reg(0)]))
        .ret()
        .build();

    let out = run(vec![main_unit(vec![main, handler])]);
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "runtime error: integer divide by zero\n");
}

#[test]
fn test_repanic_in_deferred_call_chains_panics() {
    let main = func("main.main")
        .at(3)
        .line(4)
        .instr(deferred("main.main$1"))
        .line(5)
        .instr(panic(Operand::str("first")))
        .build();
    let handler = func("main.main$1")
        .at(4)
        .line(6)
        .instr(panic(Operand::str("second")))
        .build();

    let out = run(vec![main_unit(vec![main, handler])]);
    assert_eq!(out.code, 2);
    assert_eq!(
        out.stderr,
        "panic: first\n\tpanic: second\n\n\
         goroutine 1 [running]:\n\
         panic()\n\t?:0\n\
         main.main.func1()\n\tmain.go:6 +0x1\n\
         panic()\n\t?:0\n\
         main.main()\n\tmain.go:5 +0x2\n"
    );
}

#[test]
fn test_recovered_panic_does_not_chain() {
    // The deferred call recovers "first" and then panics with "second".
    let main = func("main.main")
        .instr(deferred("main.main$1"))
        .instr(panic(Operand::str("first")))
        .build();
    let handler = func("main.main$1")
        .locals(1)
        .instr(recover_into(0))
        .instr(panic(Operand::str("second")))
        .build();

    let out = run(vec![main_unit(vec![main, handler])]);
    assert_eq!(out.code, 2);
    assert!(out.stderr.starts_with("panic: second\n\n"), "{}", out.stderr);
}

#[test]
fn test_disable_recover_surfaces_panic() {
    let main = func("main.main")
        .instr(panic(Operand::str("x")))
        .build();
    let options = ExecOptions {
        disable_recover: true,
        ..Default::default()
    };

    let err = run_with(vec![main_unit(vec![main])], options).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::Panic {
            value: "x".to_string()
        }
    );
}

#[test]
fn test_panic_in_goroutine_ends_run() {
    let main = func("main.main")
        .locals(2)
        .instr(Instr::MakeChan {
            dst: Reg(0),
            cap: Operand::int(0),
        })
        .instr(Instr::Go {
            call: CallCommon::named("main.crash", vec![]),
        })
        .instr(Instr::Recv {
            dst: Reg(1),
            chan: reg(0),
        })
        .instr(println(vec![Operand::str("unreachable")]))
        .ret()
        .build();
    let crash = func("main.crash")
        .at(10)
        .line(11)
        .instr(panic(Operand::str("crash")))
        .build();

    let out = run(vec![main_unit(vec![main, crash])]);
    assert_eq!(out.code, 2);
    assert_eq!(out.stdout, "");
    assert_eq!(
        out.stderr,
        "panic: crash\n\ngoroutine 2 [running]:\npanic()\n\t?:0\nmain.crash()\n\tmain.go:11 +0x1\n"
    );
}
