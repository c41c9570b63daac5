//! Synthesized test mains.

use crate::ssa::{FunctionBuilder, Instr, Operand, Unit, UnitBuilder};

/// Suffix of the synthesized package's import path.
pub const TEST_MAIN_SUFFIX: &str = ".test";

/// Whether `name` is a test function name: `Test` followed by nothing or
/// by a character that is not a lowercase letter.
pub fn is_test_name(name: &str) -> bool {
    match name.strip_prefix("Test") {
        Some(rest) => !rest.starts_with(|c: char| c.is_lowercase()),
        None => false,
    }
}

/// Test functions declared by `units`, in declaration order. Only members
/// of `path` and of its external test package qualify.
pub fn test_functions(path: &str, units: &[Unit]) -> Vec<(String, String)> {
    let external = format!("{}_test", path);
    let mut found = Vec::new();
    for unit in units {
        if unit.package != path && unit.package != external {
            continue;
        }
        let prefix = format!("{}.", unit.package);
        for func in &unit.functions {
            let Some(member) = func.name.strip_prefix(&prefix) else {
                continue;
            };
            if is_test_name(member) && func.params.len() == 1 && !func.blocks.is_empty() {
                found.push((member.to_string(), func.name.clone()));
            }
        }
    }
    found
}

/// Builds the `main` package that hands `(name, func)` pairs to
/// `testing.Main` and exits with its result.
pub fn synthesize(path: &str, tests: &[(String, String)]) -> Unit {
    let package = format!("{}{}", path, TEST_MAIN_SUFFIX);
    let mut args = Vec::with_capacity(tests.len() * 2);
    for (name, func) in tests {
        args.push(Operand::str(name.as_str()));
        args.push(Operand::func(func.as_str()));
    }
    let main = FunctionBuilder::new(&format!("{}.main", package))
        .locals(1)
        .instr(Instr::call(Some(0), "testing.Main", args))
        .instr(Instr::call(None, "os.Exit", vec![Operand::reg(0)]))
        .ret()
        .build();
    UnitBuilder::new(&package, "main", "_testmain.go")
        .import("testing")
        .import("os")
        .import(path)
        .function(main)
        .build()
}
