//! gossa runtime - an interpreter for Go programs in SSA form
//!
//! This library provides:
//! - The SSA program model and its JSON unit format
//! - Package loading and import-path resolution
//! - The execution engine, one host thread per goroutine
//! - Emulation of Go's runtime introspection (`runtime.Caller`, stacks)
//! - The external-function bridge and the standard shims behind it

/// gossa runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bridge;
pub mod driver;
pub mod error;
pub mod interp;
pub mod introspect;
pub mod loader;
pub mod marshal;
pub mod resolver;
pub mod ssa;
pub mod stdlib;
pub mod value;

pub use bridge::{ExternalFunc, NativeFn, NativeId, Registry, RegistryBuilder};
pub use driver::{Driver, DriverBuilder, TestOutcome, TestStatus};
pub use error::{LoadError, LoadResult, RunError, RuntimeError};
pub use interp::{CaptureBuffer, ExecOptions, Frame, Interp, OutputWriter, Unwind};
pub use introspect::{Pc, WrapperRecognizer};
pub use loader::{DirectoryDriver, Loader, PackageDriver, TestPackage, TestSuite};
pub use marshal::{FromValue, IntoValue, Kind, NativeSignature};
pub use resolver::{GoListCommand, ListDriver, PackageLister};
pub use ssa::Program;
pub use value::{FuncValue, Value};
