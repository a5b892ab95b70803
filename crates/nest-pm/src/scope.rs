//! Install scopes
//!
//! A scope is one module tree: the project-local `nest_modules/` or the
//! global tree under the nest home. Scopes never share records.

use crate::manifest::MANIFEST_FILE;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Local module directory name
pub const MODULES_DIR: &str = "nest_modules";

/// Install record file inside a modules directory
pub const RECORD_FILE: &str = ".nest-installed.toml";

/// Scope lock file inside a modules directory
pub const LOCK_FILE: &str = ".nest.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Local,
    Global,
}

/// Directory layout of one scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeLayout {
    kind: ScopeKind,
    root: PathBuf,
    modules_dir: PathBuf,
    bin_dir: PathBuf,
}

impl ScopeLayout {
    /// `<project>/nest_modules`, executables in `nest_modules/.bin`
    pub fn local(project_root: impl Into<PathBuf>) -> Self {
        let root = project_root.into();
        let modules_dir = root.join(MODULES_DIR);
        Self {
            kind: ScopeKind::Local,
            bin_dir: modules_dir.join(".bin"),
            modules_dir,
            root,
        }
    }

    /// `<home>/modules`, executables in `<home>/bin`
    pub fn global(home: impl Into<PathBuf>) -> Self {
        let root = home.into();
        Self {
            kind: ScopeKind::Global,
            modules_dir: root.join("modules"),
            bin_dir: root.join("bin"),
            root,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn is_global(&self) -> bool {
        self.kind == ScopeKind::Global
    }

    /// Project root for local scopes, nest home for the global scope
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Where a package is linked (`@org/pkg` nests under `@org/`)
    pub fn module_path(&self, name: &str) -> PathBuf {
        self.modules_dir.join(name)
    }

    pub fn bin_path(&self, command: &str) -> PathBuf {
        self.bin_dir.join(command)
    }

    pub fn record_file(&self) -> PathBuf {
        self.modules_dir.join(RECORD_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.modules_dir.join(LOCK_FILE)
    }

    /// Create the modules and bin directories
    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.modules_dir)?;
        fs::create_dir_all(&self.bin_dir)?;
        Ok(())
    }
}

impl fmt::Display for ScopeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScopeKind::Local => write!(f, "local ({})", self.root.display()),
            ScopeKind::Global => write!(f, "global ({})", self.root.display()),
        }
    }
}

/// Find the project root by looking for nest.toml upwards from `start_dir`
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        if current.join(MANIFEST_FILE).is_file() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}

/// Lexically normalize a path (drop `.`, fold `..`)
pub fn normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            Component::CurDir => {}
            _ => components.push(component),
        }
    }

    components.iter().collect()
}
