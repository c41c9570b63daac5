//! `time` shims.

use crate::bridge::RegistryBuilder;
use crate::interp::Unwind;
use crate::marshal::{Kind, NativeSignature};
use crate::value::Value;
use crossbeam::select;
use std::time::Duration;

pub fn register(b: &mut RegistryBuilder) {
    b.native(
        "time.Sleep",
        NativeSignature::new(vec![Kind::Int], vec![]),
        |fr, args| {
            let nanos = args.first().and_then(Value::as_int).unwrap_or(0);
            if nanos <= 0 {
                return Ok(Vec::new());
            }
            // Wakes early when the run shuts down.
            let shutdown = fr.interp().shutdown_receiver();
            select! {
                recv(shutdown) -> _ => Err(Unwind::Halt),
                default(Duration::from_nanos(nanos as u64)) => Ok(Vec::new()),
            }
        },
    );
}
