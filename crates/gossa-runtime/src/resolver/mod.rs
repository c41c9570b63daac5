//! Import-path resolution.
//!
//! A [`ListDriver`] maps import paths to package directories. It asks a
//! [`PackageLister`] for the full `import path -> directory` table of a
//! root and memoizes it until a lookup names a different root.

use crate::error::{LoadError, LoadResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, trace};

/// Produces every package visible from a root.
pub trait PackageLister: Send + Sync {
    fn list(&self, root: &Path) -> LoadResult<Vec<(String, PathBuf)>>;
}

impl<F> PackageLister for F
where
    F: Fn(&Path) -> LoadResult<Vec<(String, PathBuf)>> + Send + Sync,
{
    fn list(&self, root: &Path) -> LoadResult<Vec<(String, PathBuf)>> {
        self(root)
    }
}

/// Runs an external listing command in the root directory. Each output
/// line has the form `import/path=/abs/dir`.
#[derive(Debug, Clone)]
pub struct GoListCommand {
    argv: Vec<String>,
}

impl GoListCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl Default for GoListCommand {
    fn default() -> Self {
        Self::new(
            ["go", "list", "-deps", "-e", "-f={{.ImportPath}}={{.Dir}}", "."]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl PackageLister for GoListCommand {
    fn list(&self, root: &Path) -> LoadResult<Vec<(String, PathBuf)>> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(LoadError::Resolver {
                message: "empty resolver command".to_string(),
            });
        };
        let output = Command::new(program)
            .args(args)
            .current_dir(root)
            .output()
            .map_err(|err| LoadError::Resolver {
                message: format!("{}: {}", program, err),
            })?;
        if !output.status.success() {
            return Err(LoadError::Resolver {
                message: format!(
                    "{} exited with {}: {}",
                    program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses `path=dir` lines, skipping anything malformed.
pub fn parse_listing(text: &str) -> Vec<(String, PathBuf)> {
    text.lines()
        .filter_map(|line| line.trim().split_once('='))
        .filter(|(path, dir)| !path.is_empty() && !dir.is_empty())
        .map(|(path, dir)| (path.to_string(), PathBuf::from(dir)))
        .collect()
}

#[derive(Debug, Default)]
struct Cache {
    root: Option<PathBuf>,
    dirs: BTreeMap<String, PathBuf>,
    rebuilds: usize,
}

/// Memoizing import-path resolver.
pub struct ListDriver<L> {
    lister: L,
    cache: Mutex<Cache>,
}

impl<L: PackageLister> ListDriver<L> {
    pub fn new(lister: L) -> Self {
        Self {
            lister,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Directory of `import_path` as seen from `root`.
    ///
    /// On a miss, the lexicographically greatest cached path that is a
    /// `/`-separated prefix of `import_path` is tried, with the remainder
    /// joined onto its directory. This is what resolves sub-packages of a
    /// versioned module (`example.com/mod/v2/sub` under
    /// `example.com/mod/v2`).
    pub fn lookup(&self, root: &Path, import_path: &str) -> LoadResult<Option<PathBuf>> {
        let mut cache = self.cache.lock();
        if cache.root.as_deref() != Some(root) {
            let listing = self.lister.list(root)?;
            cache.dirs = listing.into_iter().collect();
            cache.root = Some(root.to_path_buf());
            cache.rebuilds += 1;
            debug!(
                root = %root.display(),
                packages = cache.dirs.len(),
                rebuilds = cache.rebuilds,
                "rebuilt package directory cache"
            );
        }
        if let Some(dir) = cache.dirs.get(import_path) {
            return Ok(Some(dir.clone()));
        }
        let prefix = cache
            .dirs
            .iter()
            .rev()
            .find(|(path, _)| {
                import_path
                    .strip_prefix(path.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            });
        Ok(prefix.map(|(path, dir)| {
            let rest = &import_path[path.len() + 1..];
            trace!(import_path, prefix = %path, "resolved by prefix");
            dir.join(rest)
        }))
    }

    /// Number of times the cache has been rebuilt.
    pub fn rebuilds(&self) -> usize {
        self.cache.lock().rebuilds
    }
}

impl<L> std::fmt::Debug for ListDriver<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("ListDriver")
            .field("root", &cache.root)
            .field("packages", &cache.dirs.len())
            .field("rebuilds", &cache.rebuilds)
            .finish()
    }
}
