//! Lowering a resolved package graph into a graph of [`Action`]s.
//!
//! Every stale package becomes a short chain of stages:
//!
//! ```text
//! cgo ──┐
//! asm ──┼─> compile ─> pack ─> install ─> link
//! deps ─┘
//! ```
//!
//! where only `compile` is always present. Fresh packages produce no actions
//! at all, and a package reachable along several paths is lowered once.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, OnceLock};

use camino::{Utf8Path, Utf8PathBuf};

use crate::core::{Config, LogLevel};
use crate::engine::{Action, Artifact, Statistics};
use crate::error::BuildError;
use crate::package::{Package, PackageKey, Scope};
use crate::toolchain::{CgoOutput, Compile, Link, Toolchain};

fn ensure_parent(action: &str, path: &Utf8Path) -> Result<(), BuildError> {
    match path.parent() {
        Some(dir) => fs::create_dir_all(dir)
            .map_err(|err| BuildError::io(action, format!("creating {dir}"), err)),
        None => Ok(()),
    }
}

/// Display label of a package inside action names.
fn label(pkg: &Package) -> String {
    match pkg.scope {
        Scope::Build => pkg.path.clone(),
        Scope::Test => format!("{} [test]", pkg.path),
    }
}

/// Everything a stage of one package needs when it eventually runs.
#[derive(Clone)]
struct Stage {
    pkg: Arc<Package>,
    config: Arc<Config>,
    toolchain: Arc<dyn Toolchain>,
    statistics: Arc<Statistics>,
    generated: Arc<OnceLock<CgoOutput>>,
}

impl Stage {
    fn objdir(&self) -> Utf8PathBuf {
        self.config.objdir(&self.pkg)
    }

    fn asm_object(&self, source: &str) -> Utf8PathBuf {
        self.objdir().join(Utf8Path::new(source).with_extension("o"))
    }

    fn cgo(&self, action: &str) -> Result<Artifact, BuildError> {
        let objdir = self.objdir();
        fs::create_dir_all(&objdir)
            .map_err(|err| BuildError::io(action, format!("creating {objdir}"), err))?;

        let output = self
            .statistics
            .time("cgo", || self.toolchain.cgo(&self.pkg, &objdir))
            .map_err(|err| BuildError::tool(action, err))?;

        // Actions run at most once, so the cell is always empty here.
        let _ = self.generated.set(output);
        Ok(Artifact::None)
    }

    fn assemble(&self, action: &str, source: &str) -> Result<Artifact, BuildError> {
        let object = self.asm_object(source);
        ensure_parent(action, &object)?;

        self.statistics
            .time("asm", || {
                self.toolchain
                    .assemble(&self.pkg, &self.pkg.dir.join(source), &object)
            })
            .map_err(|err| BuildError::tool(action, err))?;

        Ok(Artifact::File(object))
    }

    fn compile(&self, action: &str, complete: bool) -> Result<Artifact, BuildError> {
        let output = self.config.objfile(&self.pkg);
        ensure_parent(action, &output)?;

        let mut files = self.pkg.compile_files();
        if let Some(cgo) = self.generated.get() {
            files.extend(cgo.go_files.iter().cloned());
        }

        let includes = self.config.includes();
        let job = Compile {
            package: &self.pkg,
            files: &files,
            includes: &includes,
            output: &output,
            flags: &self.config.gcflags,
            complete,
        };

        self.statistics
            .time("compile", || self.toolchain.compile(&job))
            .map_err(|err| BuildError::tool(action, err))?;

        Ok(Artifact::File(output))
    }

    fn pack(&self, action: &str) -> Result<Artifact, BuildError> {
        let archive = self.config.objfile(&self.pkg);

        let mut objects: Vec<Utf8PathBuf> = self
            .pkg
            .files
            .s
            .iter()
            .map(|source| self.asm_object(source))
            .collect();
        if let Some(cgo) = self.generated.get() {
            objects.extend(cgo.objects.iter().cloned());
        }
        objects.extend(self.pkg.files.syso.iter().map(|file| self.pkg.dir.join(file)));

        self.statistics
            .time("pack", || self.toolchain.pack(&self.pkg, &objects, &archive))
            .map_err(|err| BuildError::tool(action, err))?;

        Ok(Artifact::File(archive))
    }

    fn install(&self, action: &str) -> Result<Artifact, BuildError> {
        let from = self.config.objfile(&self.pkg);
        let to = self.config.installpath(&self.pkg);
        ensure_parent(action, &to)?;

        self.statistics
            .time("install", || fs::copy(&from, &to))
            .map_err(|err| BuildError::io(action, format!("copying {from} to {to}"), err))?;

        Ok(Artifact::File(to))
    }

    fn link(&self, action: &str) -> Result<Artifact, BuildError> {
        let archive = self.config.objfile(&self.pkg);
        let output = self.config.binfile(&self.pkg);
        ensure_parent(action, &output)?;

        let includes = self.config.includes();
        let job = Link {
            package: &self.pkg,
            archive: &archive,
            includes: &includes,
            output: &output,
            flags: &self.config.ldflags,
        };

        self.statistics
            .time("link", || self.toolchain.link(&job))
            .map_err(|err| BuildError::tool(action, err))?;

        Ok(Artifact::File(output))
    }
}

/// Creates the action for one stage, binding its name into the task.
fn stage<F>(name: String, deps: Vec<Arc<Action>>, stage: &Stage, run: F) -> Arc<Action>
where
    F: Fn(&Stage, &str) -> Result<Artifact, BuildError> + Send + Sync + 'static,
{
    let stage = stage.clone();
    let action = name.clone();
    Action::new(name, deps, move || run(&stage, &action))
}

pub struct Builder {
    config: Arc<Config>,
    toolchain: Arc<dyn Toolchain>,
    statistics: Arc<Statistics>,
    cache: HashMap<PackageKey, Option<Arc<Action>>>,
}

impl Builder {
    pub fn new(
        config: Arc<Config>,
        toolchain: Arc<dyn Toolchain>,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            config,
            toolchain,
            statistics,
            cache: HashMap::new(),
        }
    }

    /// Lowers `roots` and everything they depend on, returning a single root
    /// action joining the outermost action of every stale root.
    ///
    /// Packages lowered by earlier calls on the same builder are reused, so
    /// separately built roots still share their common dependencies.
    pub fn build_actions(&mut self, roots: &[Arc<Package>]) -> Result<Arc<Action>, BuildError> {
        if roots.is_empty() {
            return Err(BuildError::Graph("no packages to build".into()));
        }

        if let Some(pkg) = roots.iter().find(|pkg| pkg.standard) {
            return Err(BuildError::Graph(format!(
                "cannot build standard package \"{}\"",
                pkg.path
            )));
        }

        let mut deps: Vec<Arc<Action>> = Vec::new();
        for pkg in roots {
            if let Some(action) = self.lower(pkg)? {
                if !deps.iter().any(|seen| Arc::ptr_eq(seen, &action)) {
                    deps.push(action);
                }
            }
        }

        let names: Vec<String> = roots.iter().map(|pkg| label(pkg)).collect();
        Ok(Action::join(format!("build: {}", names.join(", ")), deps))
    }

    fn lower(&mut self, pkg: &Arc<Package>) -> Result<Option<Arc<Action>>, BuildError> {
        let key = pkg.key();
        if let Some(action) = self.cache.get(&key) {
            return Ok(action.clone());
        }

        if !pkg.is_stale() {
            if self.config.log.enabled(LogLevel::Debug) {
                tracing::debug!(path = %pkg.path, "up to date");
            }
            self.cache.insert(key, None);
            return Ok(None);
        }

        let mut deps = Vec::with_capacity(pkg.deps.len());
        for dep in &pkg.deps {
            if let Some(action) = self.lower(dep)? {
                deps.push(action);
            }
        }

        let action = self.lower_stages(pkg, deps);
        self.cache.insert(key, Some(action.clone()));
        Ok(Some(action))
    }

    fn lower_stages(&self, pkg: &Arc<Package>, deps: Vec<Arc<Action>>) -> Arc<Action> {
        let label = label(pkg);
        let stage_env = Stage {
            pkg: pkg.clone(),
            config: self.config.clone(),
            toolchain: self.toolchain.clone(),
            statistics: self.statistics.clone(),
            generated: Arc::new(OnceLock::new()),
        };

        let mut compile_deps = deps.clone();
        let mut extras: Vec<Arc<Action>> = Vec::new();

        if !pkg.files.cgo.is_empty() {
            let cgo = stage(format!("cgo: {label}"), deps.clone(), &stage_env, Stage::cgo);
            compile_deps.push(cgo.clone());
            extras.push(cgo);
        }

        for source in &pkg.files.s {
            let file = source.clone();
            let asm = stage(
                format!("asm: {label}/{source}"),
                deps.clone(),
                &stage_env,
                move |stage, action| stage.assemble(action, &file),
            );
            extras.push(asm);
        }

        let packed = !extras.is_empty() || !pkg.files.syso.is_empty();

        let compile = stage(
            format!("compile: {label}"),
            compile_deps,
            &stage_env,
            move |stage, action| stage.compile(action, !packed),
        );

        let mut terminal = compile;

        if packed {
            let mut pack_deps = vec![terminal];
            pack_deps.extend(extras);
            terminal = stage(format!("pack: {label}"), pack_deps, &stage_env, Stage::pack);
        }

        if self.config.install && !pkg.skip_install && pkg.scope == Scope::Build {
            terminal = stage(
                format!("install: {label}"),
                vec![terminal],
                &stage_env,
                Stage::install,
            );
        }

        if pkg.command && !pkg.test_main {
            terminal = stage(format!("link: {label}"), vec![terminal], &stage_env, Stage::link);
        }

        terminal
    }
}
