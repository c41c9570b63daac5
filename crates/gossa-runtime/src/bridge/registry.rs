//! External-function registry.
//!
//! A [`Registry`] is written once through a [`RegistryBuilder`] and read
//! concurrently afterwards, so lookups on the call path take no locks.
//! Registration is idempotent: registering a name twice replaces the entry
//! and keeps its [`NativeId`].

use crate::error::RuntimeError;
use crate::interp::{Frame, Unwind};
use crate::marshal::{FromValue, IntoResults, NativeSignature};
use crate::value::{new_cell, Cell, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Identity of a native symbol, used to form native program counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(pub u32);

/// The panic primitive. It never runs as a function; it only appears in
/// reconstructed stacks.
pub const PANIC: NativeId = NativeId(0);

/// `runtime.Callers`, the first entry of every collected stack.
pub const CALLERS: NativeId = NativeId(1);

const RESERVED: [&str; 2] = ["runtime.gopanic", "runtime.Callers"];

/// Native implementation. Receives the calling frame so natives that
/// inspect the stack can walk it.
pub type NativeFn =
    Arc<dyn Fn(&Frame<'_>, Vec<Value>) -> Result<Vec<Value>, Unwind> + Send + Sync>;

/// A registered native function.
pub struct ExternalFunc {
    pub name: String,
    pub id: NativeId,
    pub signature: NativeSignature,
    call: NativeFn,
}

impl ExternalFunc {
    /// Checks `args` against the signature and calls the native.
    pub fn invoke(&self, fr: &Frame<'_>, args: Vec<Value>) -> Result<Vec<Value>, Unwind> {
        self.signature
            .check_args(&self.name, &args)
            .map_err(Unwind::Fatal)?;
        let results = (self.call)(fr, args)?;
        self.signature
            .check_results(&self.name, &results)
            .map_err(Unwind::Fatal)?;
        Ok(results)
    }
}

impl fmt::Debug for ExternalFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunc")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Package path of a qualified symbol name.
///
/// ```
/// use gossa_runtime::bridge::package_of;
///
/// assert_eq!(package_of("fmt.Println"), "fmt");
/// assert_eq!(package_of("(*testing.T).Errorf"), "testing");
/// assert_eq!(package_of("runtime/debug.Stack"), "runtime/debug");
/// ```
pub fn package_of(name: &str) -> &str {
    let name = name.trim_start_matches('(').trim_start_matches('*');
    let name = match name.find(')') {
        Some(close) => &name[..close],
        None => name,
    };
    let start = name.rfind('/').map(|slash| slash + 1).unwrap_or(0);
    match name[start..].find('.') {
        Some(dot) => &name[..start + dot],
        None => name,
    }
}

/// Frozen name-indexed table of natives and bridged variables.
pub struct Registry {
    functions: HashMap<String, Arc<ExternalFunc>>,
    natives: Vec<String>,
    variables: HashMap<String, Cell>,
    packages: HashSet<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<ExternalFunc>> {
        self.functions.get(name)
    }

    /// Like [`lookup`](Self::lookup), but a miss is fatal.
    pub fn resolve(&self, name: &str) -> Result<&Arc<ExternalFunc>, RuntimeError> {
        self.lookup(name)
            .ok_or_else(|| RuntimeError::UnresolvedExternalSymbol {
                name: name.to_string(),
            })
    }

    /// Name of a native symbol.
    pub fn native_name(&self, id: NativeId) -> Option<&str> {
        self.natives.get(id.0 as usize).map(String::as_str)
    }

    pub fn variable(&self, name: &str) -> Option<&Cell> {
        self.variables.get(name)
    }

    /// Whether the package at `path` is bridged.
    pub fn has_package(&self, path: &str) -> bool {
        self.packages.contains(path)
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions.len())
            .field("variables", &self.variables.len())
            .field("packages", &self.packages)
            .finish()
    }
}

pub struct RegistryBuilder {
    registry: Registry,
    ids: HashMap<String, NativeId>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            registry: Registry {
                functions: HashMap::new(),
                natives: Vec::new(),
                variables: HashMap::new(),
                packages: HashSet::new(),
            },
            ids: HashMap::new(),
        };
        for name in RESERVED {
            builder.intern(name);
        }
        builder
    }

    fn intern(&mut self, name: &str) -> NativeId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = NativeId(self.registry.natives.len() as u32);
        self.registry.natives.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Registers a native with an explicit signature.
    pub fn native<F>(&mut self, name: &str, signature: NativeSignature, call: F) -> &mut Self
    where
        F: Fn(&Frame<'_>, Vec<Value>) -> Result<Vec<Value>, Unwind> + Send + Sync + 'static,
    {
        let id = self.intern(name);
        self.registry
            .packages
            .insert(package_of(name).to_string());
        self.registry.functions.insert(
            name.to_string(),
            Arc::new(ExternalFunc {
                name: name.to_string(),
                id,
                signature,
                call: Arc::new(call),
            }),
        );
        self
    }

    pub fn func0<R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        R: IntoResults,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let signature = NativeSignature::new(vec![], R::kinds());
        self.native(name, signature, move |_, _| Ok(f().into_results()))
    }

    pub fn func1<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: FromValue,
        R: IntoResults,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let signature = NativeSignature::new(vec![A::KIND], R::kinds());
        let owner = name.to_string();
        self.native(name, signature, move |_, args| {
            let a = convert::<A>(&owner, &args, 0)?;
            Ok(f(a).into_results())
        })
    }

    pub fn func2<A, B, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: FromValue,
        B: FromValue,
        R: IntoResults,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        let signature = NativeSignature::new(vec![A::KIND, B::KIND], R::kinds());
        let owner = name.to_string();
        self.native(name, signature, move |_, args| {
            let a = convert::<A>(&owner, &args, 0)?;
            let b = convert::<B>(&owner, &args, 1)?;
            Ok(f(a, b).into_results())
        })
    }

    pub fn func3<A, B, C, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: FromValue,
        B: FromValue,
        C: FromValue,
        R: IntoResults,
        F: Fn(A, B, C) -> R + Send + Sync + 'static,
    {
        let signature = NativeSignature::new(vec![A::KIND, B::KIND, C::KIND], R::kinds());
        let owner = name.to_string();
        self.native(name, signature, move |_, args| {
            let a = convert::<A>(&owner, &args, 0)?;
            let b = convert::<B>(&owner, &args, 1)?;
            let c = convert::<C>(&owner, &args, 2)?;
            Ok(f(a, b, c).into_results())
        })
    }

    /// Registers a package variable. Interpreted code reads and writes it
    /// through its cell.
    pub fn variable(&mut self, name: &str, value: Value) -> &mut Self {
        self.registry
            .packages
            .insert(package_of(name).to_string());
        match self.registry.variables.get(name) {
            Some(cell) => *cell.write() = value,
            None => {
                self.registry
                    .variables
                    .insert(name.to_string(), new_cell(value));
            }
        }
        self
    }

    /// Marks a package as bridged even if it registers no symbols.
    pub fn package(&mut self, path: &str) -> &mut Self {
        self.registry.packages.insert(path.to_string());
        self
    }

    pub fn build(self) -> Registry {
        self.registry
    }
}

fn convert<T: FromValue>(name: &str, args: &[Value], index: usize) -> Result<T, Unwind> {
    let value = args.get(index).cloned().unwrap_or_default();
    T::from_value(&value).map_err(|err| {
        Unwind::Fatal(RuntimeError::Marshal {
            name: name.to_string(),
            message: format!("argument {}: {}", index, err),
        })
    })
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Process-wide registry with the standard shims installed.
pub fn global() -> Arc<Registry> {
    GLOBAL
        .get_or_init(|| {
            let mut builder = RegistryBuilder::new();
            crate::stdlib::register_all(&mut builder);
            Arc::new(builder.build())
        })
        .clone()
}
