use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::core::LogLevel;
use crate::engine::{Action, ActionId, Artifact, Executor, Promise};
use crate::error::BuildError;

type Worker = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Shared state of one concurrent execution.
struct Scheduler {
    executor: Executor,
    permits: Arc<Semaphore>,
    promises: Mutex<HashMap<ActionId, Promise>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    fn new(executor: Executor, max_parallel: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_parallel.clamp(1, Semaphore::MAX_PERMITS))),
            promises: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the promise of `action`, spawning its worker the first time
    /// the action is seen.
    fn promise_for(self: &Arc<Self>, action: &Arc<Action>) -> Promise {
        let id = ActionId::of(action);

        let promise = {
            let mut promises = self.promises.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(promise) = promises.get(&id) {
                return promise.clone();
            }
            let promise = Promise::new();
            promises.insert(id, promise.clone());
            promise
        };

        let handle = tokio::spawn(self.clone().worker(action.clone(), promise.clone()));
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);

        promise
    }

    fn worker(self: Arc<Self>, action: Arc<Action>, promise: Promise) -> Worker {
        Box::pin(async move {
            let result = self.run(&action).await;
            promise.set(result);
        })
    }

    async fn run(self: &Arc<Self>, action: &Arc<Action>) -> Result<Artifact, BuildError> {
        // Request every dependency up front so the whole subgraph is in flight
        // before this worker suspends.
        let deps: Vec<Promise> = action
            .deps()
            .iter()
            .map(|dep| self.promise_for(dep))
            .collect();

        let mut failure = None;
        for dep in &deps {
            if let Err(err) = dep.wait().await {
                failure.get_or_insert(err);
            }
        }

        if let Some(err) = failure {
            if self.executor.log.enabled(LogLevel::Debug) {
                tracing::debug!(action = action.name(), "skipped after a failed dependency");
            }
            return Err(err);
        }

        if !action.has_task() {
            return Ok(Artifact::None);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BuildError::Graph("worker pool shut down".into()))?;

        let executor = self.executor.clone();
        let task = action.clone();
        match tokio::task::spawn_blocking(move || executor.run_action(&task)).await {
            Ok(result) => result,
            Err(err) => Err(BuildError::Panicked {
                action: action.name().to_owned(),
                message: err.to_string(),
            }),
        }
    }

    /// Waits for every spawned worker, including those spawned while waiting.
    async fn join_all(&self) {
        loop {
            let batch = mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if let Err(err) = handle.await {
                    tracing::error!("worker failed: {err}");
                }
            }
        }
    }
}

impl Executor {
    /// Runs `root` and everything it depends on, with at most `max_parallel`
    /// tasks running at the same time.
    ///
    /// Every action gets one worker. A worker waits for all of its
    /// dependencies and skips its own task if any of them failed; unrelated
    /// branches keep running. Returns the outcome of `root` once every worker
    /// has finished.
    pub fn execute_concurrent(
        &self,
        root: &Arc<Action>,
        max_parallel: usize,
    ) -> Result<(), BuildError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|err| BuildError::io(root.name(), "starting the runtime", err))?;

        let scheduler = Arc::new(Scheduler::new(self.clone(), max_parallel));

        let outcome = runtime.block_on(async {
            let promise = scheduler.promise_for(root);
            scheduler.join_all().await;
            promise.outcome()
        });

        match outcome.result() {
            Some(result) => result.map(|_| ()),
            None => Err(BuildError::Graph(format!(
                "{}: finished without a result",
                root.name()
            ))),
        }
    }
}
