//! Bridge between interpreted code and natively implemented functions.
//!
//! Calls to functions without an interpreted body are resolved by qualified
//! name through a [`Registry`]. The process-wide registry holding the
//! standard shims is [`global()`].

pub mod registry;

pub use registry::{
    global, package_of, ExternalFunc, NativeFn, NativeId, Registry, RegistryBuilder, CALLERS,
    PANIC,
};
