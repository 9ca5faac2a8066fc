//! Package discovery.
//!
//! A [`Loader`] turns one import path into [`Metadata`]: the package name, its
//! directory, its source files already filtered for the current platform, and
//! its direct imports. Everything language specific lives behind this trait.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use crate::error::LoadError;
use crate::package::Metadata;

pub trait Loader: Send + Sync {
    /// Loads the immediate metadata of `path`, without following imports.
    ///
    /// Must fail with [`LoadError::NotFound`] when the path does not exist and
    /// with [`LoadError::NoBuildableSource`] when it exists but contains
    /// nothing compilable.
    fn import(&self, path: &str) -> Result<Metadata, LoadError>;

    /// Every import path this loader knows about, used to expand wildcards.
    fn list(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<L: Loader + ?Sized> Loader for &L {
    fn import(&self, path: &str) -> Result<Metadata, LoadError> {
        (**self).import(path)
    }

    fn list(&self) -> Vec<String> {
        (**self).list()
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Package(Metadata),
    Empty(Utf8PathBuf),
}

/// A loader backed by an in-memory table of packages.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    entries: BTreeMap<String, Entry>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, meta: Metadata) -> &mut Self {
        self.entries.insert(path.into(), Entry::Package(meta));
        self
    }

    /// Registers a directory without buildable sources.
    pub fn insert_empty(
        &mut self,
        path: impl Into<String>,
        dir: impl Into<Utf8PathBuf>,
    ) -> &mut Self {
        self.entries.insert(path.into(), Entry::Empty(dir.into()));
        self
    }

    pub fn with(mut self, path: impl Into<String>, meta: Metadata) -> Self {
        self.insert(path, meta);
        self
    }
}

impl Loader for MemoryLoader {
    fn import(&self, path: &str) -> Result<Metadata, LoadError> {
        match self.entries.get(path) {
            Some(Entry::Package(meta)) => Ok(meta.clone()),
            Some(Entry::Empty(dir)) => Err(LoadError::NoBuildableSource {
                path: path.to_owned(),
                dir: dir.clone(),
            }),
            None => Err(LoadError::NotFound(path.to_owned())),
        }
    }

    fn list(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_distinguishes_missing_and_empty() {
        let mut loader = MemoryLoader::new();
        loader
            .insert("a", Metadata::new("a", "src/a").go(["a.go"]))
            .insert_empty("docs", "src/docs");

        assert_eq!(loader.import("a").unwrap().files.go, vec!["a.go"]);
        assert!(matches!(
            loader.import("docs"),
            Err(LoadError::NoBuildableSource { .. })
        ));
        assert!(matches!(loader.import("b"), Err(LoadError::NotFound(p)) if p == "b"));
        assert_eq!(loader.list(), vec!["a", "docs"]);
    }
}
