//! Deciding whether a package has to be rebuilt.
//!
//! The decision is made once per package, right after all of its dependencies
//! have been resolved, from on-disk modification times and the already known
//! staleness of those dependencies.

use std::fmt;
use std::fs;
use std::sync::Arc;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::core::Config;
use crate::package::{Package, Scope, is_pseudo};
use crate::toolchain::Toolchain;

/// Why a package has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Forced,
    TestScope,
    MissingArtifact,
    CompilerNewer,
    LinkerNewer,
    DependencyStale(String),
    /// The linked executable is missing or older than the archive.
    BinaryOutdated,
    SourceNewer(Utf8PathBuf),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Forced => write!(f, "rebuild forced"),
            Reason::TestScope => write!(f, "built for testing"),
            Reason::MissingArtifact => write!(f, "no compiled archive"),
            Reason::CompilerNewer => write!(f, "compiler is newer than the archive"),
            Reason::LinkerNewer => write!(f, "linker is newer than the archive"),
            Reason::DependencyStale(path) => write!(f, "dependency \"{path}\" is stale"),
            Reason::BinaryOutdated => write!(f, "executable is older than the archive"),
            Reason::SourceNewer(file) => write!(f, "{file} changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Stale(Reason),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

pub(crate) fn modified(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// A file that cannot be read counts as newer than anything.
fn newer_than(path: &Utf8Path, built: SystemTime) -> bool {
    modified(path).is_none_or(|mtime| mtime > built)
}

#[derive(Clone)]
pub struct Oracle {
    config: Arc<Config>,
    toolchain: Arc<dyn Toolchain>,
}

impl Oracle {
    pub fn new(config: Arc<Config>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self { config, toolchain }
    }

    /// Checks `pkg` against the rules in order; the first rule that matches
    /// decides. `pkg.deps` must already carry their final staleness.
    pub fn is_stale(&self, pkg: &Package) -> Staleness {
        if pkg.standard || is_pseudo(&pkg.path) {
            return Staleness::Fresh;
        }

        if self.config.force {
            return Staleness::Stale(Reason::Forced);
        }

        if pkg.scope == Scope::Test {
            return Staleness::Stale(Reason::TestScope);
        }

        let Some(built) = modified(&self.config.installpath(pkg)) else {
            return Staleness::Stale(Reason::MissingArtifact);
        };

        if newer_than(self.toolchain.compiler(), built) {
            return Staleness::Stale(Reason::CompilerNewer);
        }

        if pkg.command && newer_than(self.toolchain.linker(), built) {
            return Staleness::Stale(Reason::LinkerNewer);
        }

        if let Some(dep) = pkg.deps.iter().find(|dep| dep.is_stale()) {
            return Staleness::Stale(Reason::DependencyStale(dep.path.clone()));
        }

        if pkg.command && !pkg.test_main {
            let binary = modified(&self.config.binfile(pkg));
            if binary.is_none_or(|binary| binary < built) {
                return Staleness::Stale(Reason::BinaryOutdated);
            }
        }

        let sources: Vec<Utf8PathBuf> = pkg.files.all().map(|file| pkg.dir.join(file)).collect();

        if let Some(source) = sources
            .par_iter()
            .find_first(|source| newer_than(source, built))
        {
            return Staleness::Stale(Reason::SourceNewer(source.clone()));
        }

        Staleness::Fresh
    }
}
