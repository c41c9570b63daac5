//! Package loading.
//!
//! A [`Loader`] turns a unit file or a directory package into one
//! [`Program`] with an identified entry package. Programs whose imports are
//! all bridged are built standalone; everything else goes through the
//! [`PackageDriver`].

pub mod driver;
pub mod testmain;

pub use driver::{DirectoryDriver, ImportResolver, PackageDriver};

use crate::bridge::Registry;
use crate::error::{LoadError, LoadResult};
use crate::ssa::unit::PLACEHOLDER_PACKAGE;
use crate::ssa::{Program, Unit};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Import path the entry package is given when its own identity is a
/// placeholder.
pub const MAIN_PACKAGE: &str = "main";

/// A synthesized test program for one package.
#[derive(Debug)]
pub struct TestPackage {
    /// Import path of the package under test.
    pub path: String,
    pub program: Program,
}

/// What loading a package with its tests produced.
#[derive(Debug)]
pub enum TestSuite {
    /// The package has no test units.
    NoTestFiles,
    /// Test units exist, but none declares a `Test*` function.
    NoTests,
    Mains(Vec<TestPackage>),
}

pub struct Loader {
    registry: Arc<Registry>,
    driver: Arc<dyn PackageDriver>,
}

impl Loader {
    pub fn new(registry: Arc<Registry>, driver: Arc<dyn PackageDriver>) -> Self {
        Self { registry, driver }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Loads a single unit file. `src` replaces the file contents when given.
    pub fn load_file(&self, path: &Path, src: Option<&[u8]>) -> LoadResult<Program> {
        let path = absolute(path)?;
        let mut unit = match src {
            Some(bytes) => driver::parse_unit(&path, bytes)?,
            None => driver::read_unit(&path)?,
        };
        if unit.name != MAIN_PACKAGE {
            return Err(LoadError::NotFoundMainPackage);
        }
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        if self.bridged(std::slice::from_ref(&unit)) {
            debug!(file = %path.display(), "standalone load");
            unit.rename_package(MAIN_PACKAGE);
            return entry_program(vec![unit], MAIN_PACKAGE);
        }
        patch_placeholder(&mut unit);
        debug!(file = %path.display(), "loading through package driver");
        let entry = unit.package.clone();
        let units = std::slice::from_ref(&unit);
        let mut all = self.driver.dependencies(&root, units, &self.registry)?;
        all.push(unit);
        entry_program(all, &entry)
    }

    /// Loads the package in `dir`.
    pub fn load_pkg(&self, dir: &Path) -> LoadResult<Program> {
        let dir = absolute(dir)?;
        let mut units = self.driver.package(&dir, false)?;
        if units.is_empty() {
            return Err(LoadError::NotFoundPackage {
                path: dir.display().to_string(),
            });
        }
        units.iter_mut().for_each(patch_placeholder);
        let entry = units[0].package.clone();
        if self.bridged(&units) {
            debug!(dir = %dir.display(), "standalone load");
            return entry_program(units, &entry);
        }
        debug!(dir = %dir.display(), "loading through package driver");
        let mut all = self.driver.dependencies(&dir, &units, &self.registry)?;
        all.extend(units);
        entry_program(all, &entry)
    }

    /// Loads the package in `dir` with its tests and synthesizes its test
    /// main. Returns the package's import path alongside the suite.
    pub fn load_test(&self, dir: &Path) -> LoadResult<(String, TestSuite)> {
        let dir = absolute(dir)?;
        let mut units = self.driver.package(&dir, true)?;
        if units.is_empty() {
            return Err(LoadError::NotFoundPackage {
                path: dir.display().to_string(),
            });
        }
        units.iter_mut().for_each(patch_placeholder);
        let path = units
            .iter()
            .map(|u| u.package.as_str())
            .find(|p| !p.ends_with("_test"))
            .or_else(|| units[0].package.strip_suffix("_test"))
            .unwrap_or(&units[0].package)
            .to_string();

        if !units.iter().any(Unit::is_test) {
            debug!(package = %path, "no test units");
            return Ok((path, TestSuite::NoTestFiles));
        }
        let tests = testmain::test_functions(&path, &units);
        if tests.is_empty() {
            debug!(package = %path, "no test functions");
            return Ok((path, TestSuite::NoTests));
        }

        let mut all = if self.bridged(&units) {
            Vec::new()
        } else {
            self.driver.dependencies(&dir, &units, &self.registry)?
        };
        all.extend(units);
        all.push(testmain::synthesize(&path, &tests));
        let entry = format!("{}{}", path, testmain::TEST_MAIN_SUFFIX);
        let program = entry_program(all, &entry)?;
        debug!(package = %path, tests = tests.len(), "synthesized test main");
        Ok((path.clone(), TestSuite::Mains(vec![TestPackage { path, program }])))
    }

    /// Whether every import of `units` is bridged or provided by `units`.
    fn bridged(&self, units: &[Unit]) -> bool {
        units.iter().flat_map(|u| u.imports.iter()).all(|import| {
            self.registry.has_package(import) || units.iter().any(|u| &u.package == import)
        })
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Restores the entry identity some front ends leave as a placeholder.
fn patch_placeholder(unit: &mut Unit) {
    if unit.package.is_empty() || unit.package == PLACEHOLDER_PACKAGE {
        unit.rename_package(MAIN_PACKAGE);
    }
}

fn entry_program(units: Vec<Unit>, entry: &str) -> LoadResult<Program> {
    let mut program = Program::build(units)?;
    if !program.set_entry(entry) {
        return Err(LoadError::NotFoundPackage {
            path: entry.to_string(),
        });
    }
    match program.entry_package() {
        Some(package) if package.is_main() => Ok(program),
        _ => Err(LoadError::NotFoundMainPackage),
    }
}

fn absolute(path: &Path) -> LoadResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|err| LoadError::io(path, err))?;
    Ok(cwd.join(path))
}
