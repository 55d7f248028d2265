//! Output chunks and the by-generation chunk registry.

use serde::{Deserialize, Serialize};

use crate::error::{MesherError, Result};
use crate::key_map::ExternalIndexMap;
use crate::types::{ChunkId, ClumpId};

/// One clump's placement inside a chunk's region of the temporary files.
///
/// `first_vertex` / `first_triangle` are absolute record indices into the
/// temp files. Because generations are non-decreasing, each chunk's records
/// form one contiguous region and clumps appear in emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkClump {
  /// Absolute index of the clump's first vertex record.
  pub first_vertex: u64,

  /// Internal vertices written, starting at `first_vertex`.
  pub num_internal: u32,

  /// External vertices written after the internal ones. Externals already
  /// present in an earlier clump of the same chunk were elided and are not
  /// counted here.
  pub num_external: u32,

  /// Absolute index of the clump's first triangle record.
  pub first_triangle: u64,

  /// Triangles written, starting at `first_triangle`.
  pub num_triangles: u32,

  /// Clump id as minted at intake time; resolve through the forest's
  /// `find` for component membership.
  pub global_id: ClumpId,
}

impl ChunkClump {
  pub fn vertex_count(&self) -> u32 {
    self.num_internal + self.num_external
  }
}

/// Data for one output chunk.
#[derive(Debug, Serialize, Deserialize)]
pub struct Chunk {
  /// Chunk id; immutable after the first block of this generation.
  pub chunk_id: ChunkId,

  /// True once a block has been received for this generation. Placeholder
  /// chunks plugging generation holes stay uninitialised and produce no
  /// output file.
  pub initialized: bool,

  /// Clumps whose records have been handed to the spiller, in emission
  /// order.
  pub clumps: Vec<ChunkClump>,

  /// Clumps whose records still sit in the active reorder buffer; appended
  /// to `clumps` when the buffer is flushed.
  #[serde(skip)]
  pub buffered_clumps: Vec<ChunkClump>,

  /// Maps external vertex keys to chunk-local external indices. Dropped
  /// for checkpointing; only the count survives.
  #[serde(skip)]
  pub external_ids: ExternalIndexMap,

  /// Distinct external vertices in this chunk. Equals `external_ids.len()`
  /// while the map is alive.
  pub num_external_vertices: u32,
}

impl Chunk {
  fn placeholder(gen: u32) -> Self {
    Self {
      chunk_id: ChunkId::new(gen, [0, 0, 0]),
      initialized: false,
      clumps: Vec::new(),
      buffered_clumps: Vec::new(),
      external_ids: ExternalIndexMap::new(),
      num_external_vertices: 0,
    }
  }

  /// All clump records in emission order, flushed first.
  pub fn all_clumps(&self) -> impl Iterator<Item = &ChunkClump> {
    self.clumps.iter().chain(self.buffered_clumps.iter())
  }

  /// Vertex records this chunk has appended to the vertex temp file.
  pub fn vertex_records(&self) -> u64 {
    self.all_clumps().map(|c| c.vertex_count() as u64).sum()
  }

  /// Triangle records this chunk has appended to the triangle temp file.
  pub fn triangle_records(&self) -> u64 {
    self.all_clumps().map(|c| c.num_triangles as u64).sum()
  }
}

/// All chunks seen so far, indexed by generation number. Skipped
/// generations are plugged with empty placeholders.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChunkRegistry {
  chunks: Vec<Chunk>,
}

impl ChunkRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.chunks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.chunks.is_empty()
  }

  pub fn get(&self, gen: u32) -> Option<&Chunk> {
    self.chunks.get(gen as usize)
  }

  /// Chunk for `chunk_id`, created (with placeholders for any skipped
  /// generations) on first sight. Rejects generation regressions.
  pub fn acquire(&mut self, chunk_id: ChunkId) -> Result<&mut Chunk> {
    let gen = chunk_id.gen as usize;
    if gen + 1 < self.chunks.len() {
      return Err(MesherError::InconsistentInput(format!(
        "generation {} arrived after generation {}",
        chunk_id.gen,
        self.chunks.len() - 1
      )));
    }
    while self.chunks.len() <= gen {
      let g = self.chunks.len() as u32;
      self.chunks.push(Chunk::placeholder(g));
    }
    let chunk = &mut self.chunks[gen];
    if !chunk.initialized {
      chunk.chunk_id = chunk_id;
      chunk.initialized = true;
    }
    Ok(chunk)
  }

  /// Move every chunk's buffered clump records into its flushed list.
  /// Called when the active reorder buffer is handed to the spiller.
  pub fn seal_buffered(&mut self) {
    for chunk in &mut self.chunks {
      chunk.clumps.append(&mut chunk.buffered_clumps);
    }
  }

  /// Verify that no chunk still has records in the reorder buffer.
  pub fn assert_drained(&self) {
    for chunk in &self.chunks {
      debug_assert!(
        chunk.buffered_clumps.is_empty(),
        "chunk gen {} still has buffered clumps after finalize",
        chunk.chunk_id.gen
      );
    }
  }

  /// Chunks in generation order.
  pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
    self.chunks.iter()
  }
}

#[cfg(test)]
#[path = "chunk_test.rs"]
mod chunk_test;
