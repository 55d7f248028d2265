//! Error types for the out-of-core mesher.

use std::path::PathBuf;

/// Errors that can abort a meshing run.
///
/// There is no local recovery: once any of these surfaces, the run is
/// abandoned and the temporary files are removed (unless retention was
/// requested).
#[derive(Debug, thiserror::Error)]
pub enum MesherError {
  /// I/O failure on a temporary or output file.
  #[error("i/o error on {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A fixed-width counter would overflow (clump ids, chunk vertex offsets,
  /// chunk triangle counts).
  #[error("capacity exceeded: {0}")]
  CapacityExceeded(String),

  /// A block violated the producer contract.
  #[error("inconsistent input: {0}")]
  InconsistentInput(String),

  /// Recorded geometry contradicts itself (e.g. a triangle references an
  /// external vertex whose owning component was pruned).
  #[error("inconsistent mesh: {0}")]
  InconsistentMesh(String),

  /// A checkpoint does not match the temporary files on disk.
  #[error("checkpoint mismatch: {0}")]
  CheckpointMismatch(String),
}

impl MesherError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    MesherError::Io {
      path: path.into(),
      source,
    }
  }
}

pub type Result<T> = std::result::Result<T, MesherError>;
