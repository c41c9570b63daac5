//! Custom native functions example
//!
//! Registers a Rust function under a package path and runs a unit that
//! imports that package.
//!
//! Run with: cargo run --example custom_natives -p gossa-runtime

use gossa_runtime::ssa::{FunctionBuilder, Instr, Operand, UnitBuilder};
use gossa_runtime::{stdlib, Driver, RegistryBuilder};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = RegistryBuilder::new();
    stdlib::register_all(&mut registry);
    registry.func2("mathx.Hypot", |a: f64, b: f64| a.hypot(b));
    registry.func1("mathx.Shout", |s: String| s.to_uppercase());

    let unit = UnitBuilder::new("main", "main", "hypot.go")
        .import("fmt")
        .import("mathx")
        .function(
            FunctionBuilder::new("main.main")
                .locals(2)
                .instr(Instr::call(
                    Some(0),
                    "mathx.Hypot",
                    vec![Operand::float(3.0), Operand::float(4.0)],
                ))
                .instr(Instr::call(Some(1), "mathx.Shout", vec![Operand::str("hypot")]))
                .instr(Instr::call(
                    None,
                    "fmt.Println",
                    vec![Operand::reg(1), Operand::reg(0)],
                ))
                .ret()
                .build(),
        )
        .build();
    let src = unit.to_json()?;

    let driver = Driver::builder().registry(Arc::new(registry.build())).build();
    driver.run_file(Path::new("hypot.ssa"), Some(src.as_bytes()), &[])?;
    // Output: HYPOT 5
    Ok(())
}
