//! `runtime/debug` shims. `Stack` returns its text as a string value.

use crate::bridge::RegistryBuilder;
use crate::introspect;
use crate::marshal::{Kind, NativeSignature};
use crate::value::Value;

pub fn register(b: &mut RegistryBuilder) {
    b.native(
        "runtime/debug.Stack",
        NativeSignature::new(vec![], vec![Kind::String]),
        |fr, _| Ok(vec![Value::string(introspect::debug_stack(fr)?)]),
    )
    .native(
        "runtime/debug.PrintStack",
        NativeSignature::new(vec![], vec![]),
        |fr, _| {
            introspect::print_stack(fr)?;
            Ok(Vec::new())
        },
    );
}
