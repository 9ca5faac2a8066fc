use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::toolchain::ToolError;

/// Failure reported by a [`Loader`](crate::Loader) for a single import path.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot find package \"{0}\"")]
    NotFound(String),

    #[error("no buildable source files in {dir} (package \"{path}\")")]
    NoBuildableSource { path: String, dir: Utf8PathBuf },

    #[error("loading package \"{path}\":\n{error:#}")]
    Other { path: String, error: anyhow::Error },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid import path \"{0}\": relative paths are not supported")]
    InvalidPath(String),

    #[error("import cycle detected: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

impl ResolveError {
    /// True when the loader found the directory but nothing in it compiles.
    pub fn is_no_buildable_source(&self) -> bool {
        matches!(self, Self::Load(LoadError::NoBuildableSource { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Load(LoadError::NotFound(_)))
    }
}

/// Failure of a single action, or of the graph construction itself.
///
/// Results are shared between every dependent of an action, so this type is
/// cheap to clone; heavyweight payloads sit behind an [`Arc`].
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("{action}: {source}")]
    Tool {
        action: String,
        source: Arc<ToolError>,
    },

    #[error("{action}: {context}:\n{source}")]
    Io {
        action: String,
        context: String,
        source: Arc<std::io::Error>,
    },

    #[error("{0}")]
    Graph(String),

    #[error("interrupted")]
    Interrupted,

    #[error("{action}: task panicked: {message}")]
    Panicked { action: String, message: String },

    #[error("{action}:\n{error:#}")]
    Task {
        action: String,
        error: Arc<anyhow::Error>,
    },
}

impl BuildError {
    pub(crate) fn tool(action: impl Into<String>, error: ToolError) -> Self {
        Self::Tool {
            action: action.into(),
            source: Arc::new(error),
        }
    }

    pub(crate) fn io(
        action: impl Into<String>,
        context: impl Into<String>,
        error: std::io::Error,
    ) -> Self {
        Self::Io {
            action: action.into(),
            context: context.into(),
            source: Arc::new(error),
        }
    }

    /// Wraps an arbitrary failure raised by a custom task.
    pub fn task(action: impl Into<String>, error: impl Into<anyhow::Error>) -> Self {
        Self::Task {
            action: action.into(),
            error: Arc::new(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum KilnError {
    #[error("Error while resolving packages:\n{0}")]
    Resolve(#[from] ResolveError),

    #[error("Error while building packages:\n{0}")]
    Build(#[from] BuildError),
}
