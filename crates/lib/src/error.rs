//! Error types for build composition and execution.

use std::path::PathBuf;

use thiserror::Error;

use crate::build::BuildId;
use crate::env::EnvError;
use crate::graph::GraphError;

/// Errors that can occur while composing or executing builds.
///
/// Every error is fatal to the owning build; a failed build propagates as a
/// failure of every transitively-depending build. The store is never rolled
/// back: a successful build's `_install/<id>` persists across a sibling's
/// failure.
#[derive(Debug, Error)]
pub enum BuildError {
  /// One or more reachable builds carry manifest diagnostics; reported
  /// before any command runs.
  #[error("invalid builds in sandbox:\n{}", diagnostics.join("\n"))]
  Manifest { diagnostics: Vec<String> },

  /// Cycle or unresolved reference in the build graph.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// Environment composition failed (export conflict or builtin override).
  #[error(transparent)]
  Env(#[from] EnvError),

  /// A build command exited non-zero.
  #[error("build {id}: command {index} failed with exit code {code:?}\n{stderr}")]
  CommandFailed {
    id: BuildId,
    index: usize,
    code: Option<i32>,
    /// Captured tail of the command's stderr.
    stderr: String,
  },

  /// Filesystem operation failed.
  #[error("{}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The staging-path rewrite failed; the build is aborted before the
  /// finalizing rename.
  #[error("failed to rewrite staged paths under {}: {source}", path.display())]
  Rewrite {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl BuildError {
  /// Attach a path to an I/O error.
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    BuildError::Io {
      path: path.into(),
      source,
    }
  }
}
