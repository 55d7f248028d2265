//! Checkpointing a finalized run so a second process can perform only the
//! final write pass.
//!
//! The checkpoint stores the chunk registry (minus its transient reorder
//! and welding state), the clump forest and the temp-file paths, behind a
//! magic number and schema version. Resume validates the tag and checks
//! the temp files on disk against the recorded record counts.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkRegistry;
use crate::clump::ClumpForest;
use crate::error::{MesherError, Result};
use crate::mesher::OocMesher;
use crate::types::MesherConfig;

const MAGIC: u32 = 0x4F4F_434D;
const VERSION: u32 = 1;

#[derive(Serialize)]
struct CheckpointRef<'a> {
  magic: u32,
  version: u32,
  vertices_path: &'a Path,
  triangles_path: &'a Path,
  written_vertices: u64,
  written_triangles: u64,
  registry: &'a ChunkRegistry,
  clumps: &'a ClumpForest,
}

#[derive(Deserialize)]
struct CheckpointOwned {
  magic: u32,
  version: u32,
  vertices_path: PathBuf,
  triangles_path: PathBuf,
  written_vertices: u64,
  written_triangles: u64,
  registry: ChunkRegistry,
  clumps: ClumpForest,
}

impl OocMesher {
  /// Serialize everything the final pass needs into `path`.
  ///
  /// Finalizes the run first and switches on temp-file retention: the
  /// resuming process owns the temp files from here on.
  pub fn checkpoint(&mut self, path: &Path) -> Result<()> {
    self.finalize()?;
    self.retain_temp_files = true;
    let record = CheckpointRef {
      magic: MAGIC,
      version: VERSION,
      vertices_path: &self.vertices_path,
      triangles_path: &self.triangles_path,
      written_vertices: self.written_vertices_tmp,
      written_triangles: self.written_triangles_tmp,
      registry: &self.registry,
      clumps: &self.clumps,
    };
    let file = File::create(path).map_err(|e| MesherError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, &record)
      .map_err(|e| MesherError::io(path, std::io::Error::other(e)))?;
    writer
      .flush()
      .map_err(|e| MesherError::io(path, e))?;
    log::info!("checkpoint written to {}", path.display());
    Ok(())
  }

  /// Reconstruct a finalized mesher from a checkpoint; only [`write`] may
  /// run on it.
  ///
  /// [`write`]: OocMesher::write
  pub fn resume(path: &Path, config: MesherConfig) -> Result<OocMesher> {
    let file = File::open(path).map_err(|e| MesherError::io(path, e))?;
    let record: CheckpointOwned = bincode::deserialize_from(BufReader::new(file))
      .map_err(|e| MesherError::CheckpointMismatch(format!("unreadable checkpoint: {e}")))?;
    if record.magic != MAGIC {
      return Err(MesherError::CheckpointMismatch(format!(
        "bad magic 0x{:08X}",
        record.magic
      )));
    }
    if record.version != VERSION {
      return Err(MesherError::CheckpointMismatch(format!(
        "unsupported version {} (expected {VERSION})",
        record.version
      )));
    }
    check_temp_size(&record.vertices_path, record.written_vertices)?;
    check_temp_size(&record.triangles_path, record.written_triangles)?;
    Ok(OocMesher::resumed(
      config,
      record.registry,
      record.clumps,
      record.written_vertices,
      record.written_triangles,
      record.vertices_path,
      record.triangles_path,
    ))
  }
}

fn check_temp_size(path: &Path, records: u64) -> Result<()> {
  let metadata = std::fs::metadata(path).map_err(|e| MesherError::io(path, e))?;
  let expected = records * 12;
  if metadata.len() != expected {
    return Err(MesherError::CheckpointMismatch(format!(
      "{} is {} bytes, checkpoint expects {expected}",
      path.display(),
      metadata.len()
    )));
  }
  Ok(())
}

#[cfg(test)]
#[path = "checkpoint_test.rs"]
mod checkpoint_test;
