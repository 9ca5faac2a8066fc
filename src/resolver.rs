//! Turning import paths into a linked graph of [`Package`]s.
//!
//! Resolution is depth-first and post-order: a package is only constructed
//! once all of its imports are, which lets the staleness of every package be
//! decided from the final staleness of its dependencies. Each
//! (import path, scope) pair is resolved at most once per [`Resolver`], so a
//! package reachable along several import chains is one shared node.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{LogConfig, LogLevel};
use crate::error::{LoadError, ResolveError};
use crate::loader::Loader;
use crate::package::{Package, PackageKey, Scope, is_pseudo};
use crate::stale::{Oracle, Staleness};

pub struct Resolver<L> {
    loader: L,
    oracle: Oracle,
    log: LogConfig,
    cache: HashMap<PackageKey, Arc<Package>>,
}

fn validate(path: &str) -> Result<(), ResolveError> {
    let relative = path == "."
        || path == ".."
        || path.starts_with("./")
        || path.starts_with("../");

    if path.is_empty() || path.starts_with('/') || relative {
        return Err(ResolveError::InvalidPath(path.to_owned()));
    }
    Ok(())
}

impl<L: Loader> Resolver<L> {
    pub fn new(loader: L, oracle: Oracle, log: LogConfig) -> Self {
        Self {
            loader,
            oracle,
            log,
            cache: HashMap::new(),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Resolves `path` and, transitively, everything it imports.
    pub fn resolve(&mut self, path: &str) -> Result<Arc<Package>, ResolveError> {
        self.resolve_scoped(path, Scope::Build)
    }

    /// Resolves `path` in the given scope. Only the root takes the scope;
    /// its imports always resolve in build scope.
    pub fn resolve_scoped(&mut self, path: &str, scope: Scope) -> Result<Arc<Package>, ResolveError> {
        validate(path)?;
        self.load(path, scope, Vec::new())
    }

    /// Resolves every known package matching `pattern`, in sorted order.
    ///
    /// `...` matches any string, so `net/...` covers `net` and every package
    /// below it. Matches without buildable sources are skipped. A pattern
    /// without `...` is a plain import path.
    pub fn resolve_pattern(&mut self, pattern: &str) -> Result<Vec<Arc<Package>>, ResolveError> {
        validate(pattern)?;

        if !pattern.contains("...") {
            return Ok(vec![self.resolve(pattern)?]);
        }

        let glob = glob::Pattern::new(&pattern.replace("...", "*"))?;
        let prefix = pattern.strip_suffix("/...");

        let mut matches: Vec<String> = self
            .loader
            .list()
            .into_iter()
            .filter(|path| glob.matches(path) || Some(path.as_str()) == prefix)
            .collect();
        matches.sort();
        matches.dedup();

        let mut packages = Vec::with_capacity(matches.len());
        for path in matches {
            match self.resolve(&path) {
                Ok(pkg) => packages.push(pkg),
                Err(ResolveError::Load(LoadError::NoBuildableSource { path: empty, .. }))
                    if empty == path =>
                {
                    if self.log.enabled(LogLevel::Debug) {
                        tracing::debug!(path = %path, "no buildable sources, skipping");
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Ok(packages)
    }

    /// Resolves several paths or patterns, dropping repeated packages while
    /// keeping the order in which they were first seen.
    pub fn resolve_all<I, S>(&mut self, paths: I) -> Result<Vec<Arc<Package>>, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut packages: Vec<Arc<Package>> = Vec::new();
        for path in paths {
            for pkg in self.resolve_pattern(path.as_ref())? {
                if !packages.iter().any(|seen| Arc::ptr_eq(seen, &pkg)) {
                    packages.push(pkg);
                }
            }
        }
        Ok(packages)
    }

    /// `stack` holds the import chain leading to `path`. Every import gets
    /// its own copy, so siblings never see each other's chains.
    fn load(
        &mut self,
        path: &str,
        scope: Scope,
        mut stack: Vec<String>,
    ) -> Result<Arc<Package>, ResolveError> {
        let key = PackageKey::new(path, scope);
        if let Some(pkg) = self.cache.get(&key) {
            return Ok(pkg.clone());
        }

        let meta = self.loader.import(path)?;
        stack.push(path.to_owned());

        let mut deps = Vec::with_capacity(meta.imports.len());

        // Standard packages come prebuilt, so their imports are not our concern.
        if !meta.standard {
            for import in &meta.imports {
                if is_pseudo(import) {
                    continue;
                }

                if let Some(pos) = stack.iter().position(|seen| seen == import) {
                    let mut cycle = stack[pos..].to_vec();
                    cycle.push(import.clone());
                    return Err(ResolveError::ImportCycle(cycle));
                }

                deps.push(self.load(import, Scope::Build, stack.clone())?);
            }
        }

        let skip_install = meta.test_main;
        let mut pkg = Package::new(path, scope, meta, deps, skip_install);

        match self.oracle.is_stale(&pkg) {
            Staleness::Fresh => {}
            Staleness::Stale(reason) => {
                if self.log.enabled(LogLevel::Debug) {
                    tracing::debug!(path, scope = ?scope, "stale: {reason}");
                }
                pkg.stale = true;
            }
        }

        let pkg = Arc::new(pkg);
        self.cache.insert(key, pkg.clone());
        Ok(pkg)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::loader::MemoryLoader;
    use crate::package::Metadata;
    use crate::testing::Workspace;

    struct Counting<L> {
        inner: L,
        calls: AtomicUsize,
    }

    impl<L: Loader> Loader for Counting<L> {
        fn import(&self, path: &str) -> Result<Metadata, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.import(path)
        }

        fn list(&self) -> Vec<String> {
            self.inner.list()
        }
    }

    fn resolver<L: Loader>(ws: &Workspace, loader: L) -> Resolver<L> {
        ws.context(ws.config()).resolver(loader)
    }

    fn diamond(ws: &Workspace) -> MemoryLoader {
        MemoryLoader::new()
            .with("d", ws.meta("d").go(["d.go"]))
            .with("b", ws.meta("b").go(["b.go"]).imports(["d"]))
            .with("c", ws.meta("c").go(["c.go"]).imports(["d"]))
            .with("a", ws.meta("a").go(["a.go"]).imports(["b", "c"]))
    }

    #[test]
    fn diamonds_share_one_node() {
        let ws = Workspace::new();
        let mut resolver = resolver(&ws, diamond(&ws));

        let a = resolver.resolve("a").unwrap();
        let (b, c) = (&a.deps[0], &a.deps[1]);

        assert_eq!(b.path, "b");
        assert_eq!(c.path, "c");
        assert!(Arc::ptr_eq(&b.deps[0], &c.deps[0]));
        assert!(Arc::ptr_eq(&resolver.resolve("d").unwrap(), &b.deps[0]));
    }

    #[test]
    fn each_path_is_loaded_once() {
        let ws = Workspace::new();
        let loader = Counting {
            inner: diamond(&ws),
            calls: AtomicUsize::new(0),
        };
        let mut resolver = resolver(&ws, loader);

        resolver.resolve("a").unwrap();
        resolver.resolve("a").unwrap();
        resolver.resolve("c").unwrap();

        assert_eq!(resolver.loader().calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn self_import_is_a_cycle() {
        let ws = Workspace::new();
        let loader = MemoryLoader::new().with("x", ws.meta("x").go(["x.go"]).imports(["x"]));

        let err = resolver(&ws, loader).resolve("x").unwrap_err();
        assert_eq!(err.to_string(), "import cycle detected: x -> x");
    }

    #[test]
    fn longer_cycles_list_every_step() {
        let ws = Workspace::new();
        let loader = MemoryLoader::new()
            .with("x", ws.meta("x").go(["x.go"]).imports(["y"]))
            .with("y", ws.meta("y").go(["y.go"]).imports(["x"]))
            .with("top", ws.meta("top").go(["top.go"]).imports(["p"]))
            .with("p", ws.meta("p").go(["p.go"]).imports(["q"]))
            .with("q", ws.meta("q").go(["q.go"]).imports(["r"]))
            .with("r", ws.meta("r").go(["r.go"]).imports(["p"]));
        let mut resolver = resolver(&ws, loader);

        let err = resolver.resolve("x").unwrap_err();
        assert!(matches!(&err, ResolveError::ImportCycle(cycle) if cycle == &["x", "y", "x"]));
        assert_eq!(err.to_string(), "import cycle detected: x -> y -> x");

        let err = resolver.resolve("top").unwrap_err();
        assert_eq!(err.to_string(), "import cycle detected: p -> q -> r -> p");
    }

    #[test]
    fn sibling_chains_are_independent() {
        let ws = Workspace::new();
        // b and c both import d; d must not look like a cycle from c.
        let mut resolver = resolver(&ws, diamond(&ws));
        assert!(resolver.resolve("a").is_ok());
    }

    #[test]
    fn relative_and_empty_paths_are_rejected() {
        let ws = Workspace::new();
        let mut resolver = resolver(&ws, diamond(&ws));

        for path in ["", ".", "..", "./a", "../a", "/abs/a"] {
            assert!(
                matches!(resolver.resolve(path), Err(ResolveError::InvalidPath(p)) if p == path),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn loader_errors_keep_their_identity() {
        let ws = Workspace::new();
        let mut loader = diamond(&ws);
        loader
            .insert("broken", ws.meta("broken").go(["x.go"]).imports(["missing"]))
            .insert_empty("docs", ws.root.join("src/docs"));
        let mut resolver = resolver(&ws, loader);

        let err = resolver.resolve("broken").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "cannot find package \"missing\"");

        assert!(resolver.resolve("docs").unwrap_err().is_no_buildable_source());
    }

    #[test]
    fn pseudo_imports_and_standard_packages_are_leaves() {
        let ws = Workspace::new();
        let loader = MemoryLoader::new()
            .with("fmt", Metadata::new("fmt", "/goroot/src/fmt").standard().imports(["io"]))
            .with("app", ws.meta("app").go(["app.go"]).imports(["C", "unsafe", "fmt"]));
        let mut resolver = resolver(&ws, loader);

        let app = resolver.resolve("app").unwrap();
        assert_eq!(app.deps.len(), 1);
        assert_eq!(app.deps[0].path, "fmt");
        assert!(app.deps[0].deps.is_empty());
        assert!(!app.deps[0].is_stale());
    }

    #[test]
    fn staleness_is_computed_on_resolution() {
        let ws = Workspace::new();
        let meta = ws.meta("a").go(["a.go"]);
        ws.write_sources(&meta, 100);
        let loader = MemoryLoader::new().with("a", meta);
        let mut resolver = resolver(&ws, loader);

        assert!(resolver.resolve("a").unwrap().is_stale());
    }

    #[test]
    fn test_scope_is_a_separate_node() {
        let ws = Workspace::new();
        let mut resolver = resolver(&ws, diamond(&ws));

        let build = resolver.resolve("b").unwrap();
        let test = resolver.resolve_scoped("b", Scope::Test).unwrap();

        assert!(!Arc::ptr_eq(&build, &test));
        assert_eq!(test.scope, Scope::Test);
        assert!(Arc::ptr_eq(&build.deps[0], &test.deps[0]));
        assert_eq!(test.deps[0].scope, Scope::Build);
    }

    #[test]
    fn patterns_expand_against_known_packages() {
        let ws = Workspace::new();
        let mut loader = MemoryLoader::new();
        loader
            .insert("net", ws.meta("net").go(["net.go"]))
            .insert("net/http", ws.meta("http").go(["http.go"]).imports(["net"]))
            .insert("net/url", ws.meta("url").go(["url.go"]))
            .insert_empty("net/testdata", ws.root.join("src/net/testdata"))
            .insert("network", ws.meta("network").go(["n.go"]))
            .insert("os", ws.meta("os").go(["os.go"]));
        let mut resolver = resolver(&ws, loader);

        let paths: Vec<_> = resolver
            .resolve_pattern("net/...")
            .unwrap()
            .iter()
            .map(|pkg| pkg.path.clone())
            .collect();
        assert_eq!(paths, vec!["net", "net/http", "net/url"]);

        let all = resolver.resolve_pattern("...").unwrap();
        assert_eq!(all.len(), 5);

        assert!(resolver.resolve_pattern("net/testdata").unwrap_err().is_no_buildable_source());
    }

    #[test]
    fn resolve_all_drops_repeats() {
        let ws = Workspace::new();
        let mut resolver = resolver(&ws, diamond(&ws));

        let packages = resolver.resolve_all(["b", "d", "b", "c"]).unwrap();
        let paths: Vec<_> = packages.iter().map(|pkg| pkg.path.as_str()).collect();
        assert_eq!(paths, vec!["b", "d", "c"]);
    }
}
