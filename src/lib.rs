#![forbid(unsafe_code)]
//! Build orchestration for trees of compiled packages.
//!
//! A build goes through three steps:
//!
//! 1. A [`Resolver`] asks a [`Loader`] about every import path reachable from
//!    the requested roots and links the answers into a graph of [`Package`]s,
//!    deciding on the way which of them are stale.
//! 2. A [`Builder`] lowers the stale part of that graph into [`Action`]s:
//!    compile, assemble, pack, install and link steps, each calling into a
//!    [`Toolchain`].
//! 3. An [`Executor`] runs the actions, either one after another or
//!    concurrently with a bounded number of tasks in flight.
//!
//! [`Context`] bundles the configuration, the toolchain and the build
//! statistics, and hands out the three pieces already wired together.

mod builder;
mod core;
mod error;
mod graph;
mod loader;
mod package;
mod resolver;
mod stale;
#[cfg(test)]
mod testing;

pub mod engine;
pub mod toolchain;

use std::sync::Arc;
use std::time::Instant;

pub use crate::builder::Builder;
pub use crate::core::{Config, LogConfig, LogLevel, Target};
pub use crate::engine::{
    Action, ActionId, Artifact, Executor, Interrupt, Outcome, Promise, Statistics, StageTotal,
    Task, execute, execute_concurrent,
};
pub use crate::error::*;
pub use crate::graph::ActionGraph;
pub use crate::loader::{Loader, MemoryLoader};
pub use crate::package::{Metadata, Package, PackageKey, Scope, SourceFiles};
pub use crate::resolver::Resolver;
pub use crate::stale::{Oracle, Reason, Staleness};
pub use crate::toolchain::{ToolError, Toolchain};

/// Shared state of one build invocation.
#[derive(Clone)]
pub struct Context {
    config: Arc<Config>,
    toolchain: Arc<dyn Toolchain>,
    statistics: Arc<Statistics>,
}

impl Context {
    pub fn new(config: Config, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            config: Arc::new(config),
            toolchain,
            statistics: Arc::new(Statistics::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn oracle(&self) -> Oracle {
        Oracle::new(self.config.clone(), self.toolchain.clone())
    }

    pub fn resolver<L: Loader>(&self, loader: L) -> Resolver<L> {
        Resolver::new(loader, self.oracle(), self.config.log)
    }

    pub fn builder(&self) -> Builder {
        Builder::new(
            self.config.clone(),
            self.toolchain.clone(),
            self.statistics.clone(),
        )
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.config.log)
    }

    /// Resolves `paths` and lowers them into an action graph without running
    /// anything.
    pub fn graph<L, I, S>(&self, loader: L, paths: I) -> Result<ActionGraph, KilnError>
    where
        L: Loader,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roots = self.resolver(loader).resolve_all(paths)?;
        let root = self.builder().build_actions(&roots)?;
        Ok(ActionGraph::from_root(&root))
    }

    /// Dry run: the actions a build of `paths` would perform, listed
    /// with every dependency ahead of its dependents.
    pub fn plan<L, I, S>(&self, loader: L, paths: I) -> Result<Vec<String>, KilnError>
    where
        L: Loader,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let graph = self.graph(loader, paths)?;
        let plan = graph.plan()?;
        Ok(plan.into_iter().map(str::to_owned).collect())
    }

    /// Resolves `paths`, which may contain `...` wildcards, and builds
    /// whatever is stale. With `jobs` above one the actions run concurrently.
    pub fn build<L, I, S>(&self, loader: L, paths: I, jobs: usize) -> Result<(), KilnError>
    where
        L: Loader,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = Instant::now();

        let roots = self.resolver(loader).resolve_all(paths)?;
        let root = self.builder().build_actions(&roots)?;

        if self.config.log.enabled(LogLevel::Debug) {
            let graph = ActionGraph::from_root(&root);
            tracing::debug!("{} actions planned for {}", graph.len(), root.name());
        }

        let executor = self.executor();
        if jobs > 1 {
            executor.execute_concurrent(&root, jobs)?;
        } else {
            executor.execute(&root)?;
        }

        if self.config.log.enabled(LogLevel::Info) {
            tracing::info!(elapsed = ?start.elapsed(), "{}", root.name());
        }
        if self.config.log.enabled(LogLevel::Debug) {
            tracing::debug!("stage totals:\n{}", self.statistics.summary());
        }

        Ok(())
    }
}
