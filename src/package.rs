use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;

/// Import paths which name compiler intrinsics rather than real packages.
pub(crate) const PSEUDO_PACKAGES: [&str; 2] = ["C", "unsafe"];

pub(crate) fn is_pseudo(path: &str) -> bool {
    PSEUDO_PACKAGES.contains(&path)
}

/// Whether a package is built to be installed, or transiently for its tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum Scope {
    #[default]
    Build,
    /// Test builds are never cached, so they are always considered stale.
    Test,
}

/// The identity of a package within one resolution context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    pub path: String,
    pub scope: Scope,
}

impl PackageKey {
    pub fn new(path: impl Into<String>, scope: Scope) -> Self {
        Self {
            path: path.into(),
            scope,
        }
    }
}

/// Source file names of a package, relative to its directory, grouped by the
/// tool that consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFiles {
    pub go: Vec<String>,
    /// Compiled only when the package is built in test scope.
    pub test: Vec<String>,
    /// Sources using the foreign-call preprocessor.
    pub cgo: Vec<String>,
    pub c: Vec<String>,
    pub cxx: Vec<String>,
    pub m: Vec<String>,
    pub h: Vec<String>,
    /// Assembly sources, one assemble action each.
    pub s: Vec<String>,
    /// Prebuilt system objects, packed as they are.
    pub syso: Vec<String>,
    pub swig: Vec<String>,
}

impl SourceFiles {
    /// Every file of every category.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        [
            &self.go, &self.test, &self.cgo, &self.c, &self.cxx, &self.m, &self.h, &self.s,
            &self.syso, &self.swig,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.all().next().is_none()
    }
}

/// What a [`Loader`](crate::Loader) knows about one import path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub dir: Utf8PathBuf,
    pub files: SourceFiles,
    /// Direct imports in declaration order.
    pub imports: Vec<String>,
    pub command: bool,
    /// Shipped prebuilt with the toolchain.
    pub standard: bool,
    /// A synthesized test driver, linked by the test runner rather than here.
    pub test_main: bool,
}

impl Metadata {
    pub fn new(name: impl Into<String>, dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn go<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.go.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn asm<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.s.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn cgo<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.cgo.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports.extend(imports.into_iter().map(Into::into));
        self
    }

    pub fn command(mut self) -> Self {
        self.command = true;
        self
    }

    pub fn standard(mut self) -> Self {
        self.standard = true;
        self
    }
}

/// A fully resolved package: its metadata, its resolved dependencies, and
/// whether it has to be rebuilt.
///
/// Packages are shared through [`Arc`]; a package imported along several
/// paths is the same allocation everywhere it appears.
pub struct Package {
    pub path: String,
    pub name: String,
    pub dir: Utf8PathBuf,
    pub files: SourceFiles,
    pub imports: Vec<String>,
    pub deps: Vec<Arc<Package>>,
    pub command: bool,
    pub standard: bool,
    pub test_main: bool,
    pub skip_install: bool,
    pub scope: Scope,
    pub(crate) stale: bool,
}

impl Package {
    pub(crate) fn new(
        path: &str,
        scope: Scope,
        meta: Metadata,
        deps: Vec<Arc<Package>>,
        skip_install: bool,
    ) -> Self {
        Self {
            path: path.to_owned(),
            name: meta.name,
            dir: meta.dir,
            files: meta.files,
            imports: meta.imports,
            deps,
            command: meta.command,
            standard: meta.standard,
            test_main: meta.test_main,
            skip_install,
            scope,
            stale: false,
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.path, self.scope)
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The last element of the import path, used to name executables.
    pub fn base_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Files handed to the compiler, joined with the package directory.
    pub(crate) fn compile_files(&self) -> Vec<Utf8PathBuf> {
        let test = match self.scope {
            Scope::Build => &[][..],
            Scope::Test => &self.files.test[..],
        };

        self.files
            .go
            .iter()
            .chain(test)
            .map(|file| self.dir.join(file))
            .collect()
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("path", &self.path)
            .field("scope", &self.scope)
            .field("stale", &self.stale)
            .field(
                "deps",
                &self.deps.iter().map(|dep| &dep.path).collect::<Vec<_>>(),
            )
            .finish()
    }
}
