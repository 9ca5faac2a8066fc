//! The action graph and the machinery that executes it.
//!
//! An [`Action`] pairs a list of prerequisite actions with at most one unit of
//! work. Actions form a directed acyclic graph: an action reachable along
//! several paths is a single shared node, and both executors guarantee that
//! its work runs at most once per execution.
//!
//! * [`Executor::execute`] walks the graph depth-first on the calling thread
//!   and stops at the first failure.
//! * [`Executor::execute_concurrent`] starts one lightweight worker per action
//!   and bounds how many units of work run at the same time. A failure only
//!   skips the actions that depend on it.

mod concurrent;
mod interrupt;
mod promise;
mod sequential;
mod statistics;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use camino::Utf8PathBuf;

use crate::core::{LogConfig, LogLevel};
use crate::error::BuildError;

pub use crate::engine::interrupt::Interrupt;
pub use crate::engine::promise::{Outcome, Promise};
pub use crate::engine::statistics::{Statistics, StageTotal};

/// What a finished action left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Artifact {
    #[default]
    None,
    File(Utf8PathBuf),
}

/// The unit of work of an action.
pub type Task = Box<dyn Fn() -> Result<Artifact, BuildError> + Send + Sync>;

/// A node in the build graph.
pub struct Action {
    name: String,
    deps: Vec<Arc<Action>>,
    task: Option<Task>,
}

impl Action {
    pub fn new<F>(name: impl Into<String>, deps: Vec<Arc<Action>>, task: F) -> Arc<Self>
    where
        F: Fn() -> Result<Artifact, BuildError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            deps,
            task: Some(Box::new(task)),
        })
    }

    /// An action without work of its own, completing once all `deps` did.
    pub fn join(name: impl Into<String>, deps: Vec<Arc<Action>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            deps,
            task: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deps(&self) -> &[Arc<Action>] {
        &self.deps
    }

    pub fn has_task(&self) -> bool {
        self.task.is_some()
    }

    fn run(&self) -> Result<Artifact, BuildError> {
        match &self.task {
            Some(task) => task(),
            None => Ok(Artifact::None),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field(
                "deps",
                &self.deps.iter().map(|dep| dep.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Identity of an action allocation, used to memoize per-node results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(usize);

impl ActionId {
    pub fn of(action: &Arc<Action>) -> Self {
        Self(Arc::as_ptr(action) as usize)
    }
}

/// Runs action graphs.
#[derive(Debug, Clone)]
pub struct Executor {
    log: LogConfig,
    interrupt: Interrupt,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl Executor {
    /// An executor observing the process-wide [`Interrupt`].
    pub fn new(log: LogConfig) -> Self {
        Self {
            log,
            interrupt: Interrupt::global(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Runs the work of a single action, turning a panic into an error.
    fn run_action(&self, action: &Action) -> Result<Artifact, BuildError> {
        if !action.has_task() {
            return Ok(Artifact::None);
        }

        if self.interrupt.is_triggered() {
            return Err(BuildError::Interrupted);
        }

        let span = tracing::info_span!("action", name = action.name());
        let _enter = span.enter();

        let start = Instant::now();

        // The task only sees shared immutable state, so a panic cannot leave
        // anything half-updated behind for other actions.
        let result = match catch_unwind(AssertUnwindSafe(|| action.run())) {
            Ok(result) => result,
            Err(panic) => {
                let message = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    String::from("unknown payload")
                };

                Err(BuildError::Panicked {
                    action: action.name().to_owned(),
                    message,
                })
            }
        };

        match &result {
            Ok(_) if self.log.enabled(LogLevel::Info) => {
                tracing::info!(elapsed = ?start.elapsed(), "{}", action.name());
            }
            Err(err) if self.log.enabled(LogLevel::Error) => {
                tracing::error!("{err}");
            }
            _ => {}
        }

        result
    }
}

/// Runs `root` and its dependencies on the calling thread.
pub fn execute(root: &Arc<Action>) -> Result<(), BuildError> {
    Executor::default().execute(root)
}

/// Runs `root` and its dependencies with at most `max_parallel` tasks at once.
pub fn execute_concurrent(root: &Arc<Action>, max_parallel: usize) -> Result<(), BuildError> {
    Executor::default().execute_concurrent(root, max_parallel)
}
