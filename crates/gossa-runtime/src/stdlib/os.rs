//! `os` shims. `os.Exit` is an engine intrinsic: the native only hands the
//! code to the interpreter, which decides how the exit travels.

use crate::bridge::{Registry, RegistryBuilder};
use crate::marshal::{Kind, NativeSignature};
use crate::value::{SliceRef, Value};

pub const ARGS: &str = "os.Args";

pub fn register(b: &mut RegistryBuilder) {
    b.native(
        "os.Exit",
        NativeSignature::new(vec![Kind::Int], vec![]),
        |fr, args| {
            let code = args.first().and_then(Value::as_int).unwrap_or(0);
            Err(fr.interp().terminate(code as i32))
        },
    )
    .func1("os.Getenv", |key: String| std::env::var(key).unwrap_or_default())
    .variable(ARGS, Value::Slice(SliceRef::new(Vec::new())));
}

/// Replaces the argument vector interpreted code sees.
pub fn set_args(registry: &Registry, args: &[String]) {
    if let Some(cell) = registry.variable(ARGS) {
        let values = args.iter().map(Value::string).collect();
        *cell.write() = Value::Slice(SliceRef::new(values));
    }
}

/// Current argument vector.
pub fn args(registry: &Registry) -> Vec<String> {
    match registry.variable(ARGS).map(|cell| cell.read().clone()) {
        Some(Value::Slice(slice)) => slice
            .to_vec()
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
