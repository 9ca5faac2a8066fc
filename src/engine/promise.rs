use std::sync::Arc;

use tokio::sync::watch;

use crate::engine::Artifact;
use crate::error::BuildError;

/// The state of one action during an execution.
#[derive(Debug, Clone, Default)]
pub enum Outcome {
    #[default]
    Pending,
    Succeeded(Artifact),
    Failed(BuildError),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// `None` while the action has not finished.
    pub fn result(&self) -> Option<Result<Artifact, BuildError>> {
        match self {
            Outcome::Pending => None,
            Outcome::Succeeded(artifact) => Some(Ok(artifact.clone())),
            Outcome::Failed(err) => Some(Err(err.clone())),
        }
    }
}

impl From<Result<Artifact, BuildError>> for Outcome {
    fn from(result: Result<Artifact, BuildError>) -> Self {
        match result {
            Ok(artifact) => Outcome::Succeeded(artifact),
            Err(err) => Outcome::Failed(err),
        }
    }
}

/// A write-once, read-many result cell.
///
/// The producer settles it exactly once; any number of readers, on any
/// number of tasks, may await it and all observe the same outcome.
#[derive(Debug, Clone)]
pub struct Promise {
    sender: Arc<watch::Sender<Outcome>>,
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl Promise {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::Sender::new(Outcome::Pending)),
        }
    }

    /// Settles the promise. Returns `false`, leaving the stored outcome
    /// untouched, if it was already settled.
    pub fn set(&self, result: Result<Artifact, BuildError>) -> bool {
        let outcome = Outcome::from(result);
        self.sender.send_if_modified(|current| {
            if current.is_pending() {
                *current = outcome;
                true
            } else {
                false
            }
        })
    }

    /// The current state, without waiting.
    pub fn outcome(&self) -> Outcome {
        (*self.sender.borrow()).clone()
    }

    /// Waits until the promise is settled and returns its result.
    pub async fn wait(&self) -> Result<Artifact, BuildError> {
        let mut receiver = self.sender.subscribe();
        let settled = match receiver.wait_for(|outcome| !outcome.is_pending()).await {
            Ok(outcome) => outcome.result(),
            Err(_) => None,
        };

        // The sender lives as long as `self`, so the wait cannot be cut short.
        settled.unwrap_or_else(|| Err(BuildError::Graph("promise abandoned".into())))
    }
}
