//! General package loading: directory packages and their transitive
//! imports.

use crate::bridge::Registry;
use crate::error::{LoadError, LoadResult};
use crate::resolver::{ListDriver, PackageLister};
use crate::ssa::unit::{is_test_unit, is_unit, Unit};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Maps an import path to the directory holding its units.
pub trait ImportResolver: Send + Sync {
    fn resolve(&self, root: &Path, import_path: &str) -> LoadResult<Option<PathBuf>>;
}

impl<L: PackageLister> ImportResolver for ListDriver<L> {
    fn resolve(&self, root: &Path, import_path: &str) -> LoadResult<Option<PathBuf>> {
        self.lookup(root, import_path)
    }
}

/// Loads packages the fast path cannot handle alone.
pub trait PackageDriver: Send + Sync {
    /// Units of the package in `dir`, with its test units when `tests` is set.
    fn package(&self, dir: &Path, tests: bool) -> LoadResult<Vec<Unit>>;

    /// Every package reachable from the imports of `units`, dependencies
    /// first. Bridged packages and the packages of `units` themselves are
    /// not followed.
    fn dependencies(&self, root: &Path, units: &[Unit], registry: &Registry)
        -> LoadResult<Vec<Unit>>;
}

/// Reads the units of one directory, sorted by file name.
pub fn read_units(dir: &Path, tests: bool) -> LoadResult<Vec<Unit>> {
    let entries = fs::read_dir(dir).map_err(|err| LoadError::io(dir, err))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| LoadError::io(dir, err))?.path();
        if path.is_file() && is_unit(&path) && (tests || !is_test_unit(&path)) {
            paths.push(path);
        }
    }
    paths.sort();
    paths.iter().map(|path| read_unit(path)).collect()
}

/// Reads and parses one unit file.
pub fn read_unit(path: &Path) -> LoadResult<Unit> {
    let bytes = fs::read(path).map_err(|err| LoadError::io(path, err))?;
    parse_unit(path, &bytes)
}

pub fn parse_unit(path: &Path, bytes: &[u8]) -> LoadResult<Unit> {
    Unit::from_json(bytes).map_err(|err| LoadError::Parse {
        file: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Reads directory packages, resolving imports through an
/// [`ImportResolver`].
#[derive(Clone)]
pub struct DirectoryDriver {
    resolver: Arc<dyn ImportResolver>,
}

impl DirectoryDriver {
    pub fn new(resolver: Arc<dyn ImportResolver>) -> Self {
        Self { resolver }
    }
}

#[derive(Default)]
struct Walk {
    done: HashSet<String>,
    stack: Vec<String>,
    order: Vec<Unit>,
}

impl DirectoryDriver {
    fn visit(
        &self,
        root: &Path,
        from: &str,
        import: &str,
        registry: &Registry,
        walk: &mut Walk,
    ) -> LoadResult<()> {
        if registry.has_package(import) || walk.done.contains(import) {
            return Ok(());
        }
        if let Some(start) = walk.stack.iter().position(|p| p == import) {
            let mut cycle = walk.stack[start..].to_vec();
            cycle.push(import.to_string());
            return Err(LoadError::ImportCycle { cycle });
        }

        let not_found = || LoadError::ImportNotFound {
            path: import.to_string(),
            from: from.to_string(),
        };
        let dir = self.resolver.resolve(root, import)?.ok_or_else(not_found)?;
        let units = match read_units(&dir, false) {
            Ok(units) if !units.is_empty() => units,
            Ok(_) => return Err(not_found()),
            Err(LoadError::Io { .. }) => return Err(not_found()),
            Err(err) => return Err(err),
        };
        trace!(import, dir = %dir.display(), units = units.len(), "loading package");

        walk.stack.push(import.to_string());
        let imports: Vec<String> = units.iter().flat_map(|u| u.imports.clone()).collect();
        for next in &imports {
            self.visit(root, import, next, registry, walk)?;
        }
        walk.stack.pop();
        walk.done.insert(import.to_string());
        walk.order.extend(units);
        Ok(())
    }
}

impl PackageDriver for DirectoryDriver {
    fn package(&self, dir: &Path, tests: bool) -> LoadResult<Vec<Unit>> {
        read_units(dir, tests)
    }

    fn dependencies(
        &self,
        root: &Path,
        units: &[Unit],
        registry: &Registry,
    ) -> LoadResult<Vec<Unit>> {
        let mut walk = Walk::default();
        for unit in units {
            walk.done.insert(unit.package.clone());
        }
        for unit in units {
            walk.stack.push(unit.package.clone());
            for import in &unit.imports {
                self.visit(root, &unit.package, import, registry, &mut walk)?;
            }
            walk.stack.pop();
        }
        debug!(units = walk.order.len(), "loaded dependencies");
        Ok(walk.order)
    }
}

impl std::fmt::Debug for DirectoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryDriver").finish_non_exhaustive()
    }
}
