//! Bridged standard library.
//!
//! Each submodule registers the natives and variables of one Go package.
//! Interpreted code reaches them through the [`Registry`](crate::bridge::Registry)
//! by fully qualified name.

pub mod debug;
pub mod errors;
pub mod flag;
pub mod fmt;
pub mod os;
pub mod runtime;
pub mod testing;
pub mod time;

use crate::bridge::RegistryBuilder;

/// Registers every bridged package.
pub fn register_all(b: &mut RegistryBuilder) {
    fmt::register(b);
    errors::register(b);
    os::register(b);
    flag::register(b);
    time::register(b);
    runtime::register(b);
    debug::register(b);
    testing::register(b);
    for path in [
        "fmt",
        "errors",
        "os",
        "flag",
        "time",
        "runtime",
        "runtime/debug",
        "testing",
    ] {
        b.package(path);
    }
}
