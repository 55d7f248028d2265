//! Core data types shared across the mesher.

use serde::{Deserialize, Serialize};

/// A vertex position, 3 little-endian f32 on disk (12 bytes).
pub type Vertex = [f32; 3];

/// A triangle as 3 vertex indices, 3 little-endian u32 on disk (12 bytes).
pub type Triangle = [u32; 3];

/// 64-bit fingerprint of a boundary vertex location. Equal keys mean the
/// same vertex seen from two neighbouring blocks.
pub type VertexKey = u64;

/// Dense global clump id. Minting more than `i32::MAX` clumps is fatal.
pub type ClumpId = i32;

/// Identifier of one output chunk: a monotonically non-decreasing generation
/// number plus the chunk's grid coordinates (used only for naming).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId {
  /// Generation number; indexes the chunk registry.
  pub gen: u32,

  /// Grid coordinates of the chunk.
  pub coords: [u32; 3],
}

impl ChunkId {
  pub fn new(gen: u32, coords: [u32; 3]) -> Self {
    Self { gen, coords }
  }
}

/// One mesh block emitted by the marching stage; the unit of input.
///
/// Vertices are partitioned into `internal_count` internal vertices followed
/// by external ones. `keys` runs parallel to the external vertices only.
/// Triangle indices are block-local, in `[0, vertices.len())`.
#[derive(Clone, Debug)]
pub struct MeshBlock {
  /// Chunk this block belongs to.
  pub chunk_id: ChunkId,

  /// Internal vertices first, then external vertices.
  pub vertices: Vec<Vertex>,

  /// Number of leading internal vertices.
  pub internal_count: usize,

  /// Keys of the external vertices, `vertices.len() - internal_count` long.
  pub keys: Vec<VertexKey>,

  /// Triangles with block-local indices.
  pub triangles: Vec<Triangle>,
}

impl MeshBlock {
  /// An empty block must be a no-op for the mesher.
  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty() && self.triangles.is_empty()
  }

  pub fn external_count(&self) -> usize {
    self.vertices.len() - self.internal_count
  }
}

// =============================================================================
// Split index encoding
// =============================================================================
//
// Triangle indices in the temporary file distinguish two address spaces:
// a value with the top bit clear is an internal vertex index local to its
// clump; a value with the top bit set is the bitwise-NOT of a chunk-wide
// external vertex index. The encoding is unambiguous as long as neither
// space reaches 2^31 entries.

/// Upper bound for both the per-clump internal and per-chunk external index
/// spaces.
pub const SPLIT_INDEX_LIMIT: u32 = 1 << 31;

/// Encode a chunk-external vertex index for the temp file.
#[inline]
pub fn encode_external(index: u32) -> u32 {
  debug_assert!(index < SPLIT_INDEX_LIMIT);
  !index
}

/// True if a temp-file index refers to a chunk-external vertex.
#[inline]
pub fn is_external(raw: u32) -> bool {
  raw >= SPLIT_INDEX_LIMIT
}

/// Recover the chunk-external vertex index from its encoded form.
#[inline]
pub fn decode_external(raw: u32) -> u32 {
  debug_assert!(is_external(raw));
  !raw
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for an out-of-core meshing run.
#[derive(Clone, Debug)]
pub struct MesherConfig {
  /// Components holding fewer than this fraction of all vertices are
  /// dropped at final write time. In `[0, 1]`; 0 keeps everything.
  pub prune_threshold: f64,

  /// Byte size of the active reorder buffer that triggers a flush to the
  /// temporary files.
  pub reorder_capacity: usize,

  /// Number of reorder buffer slots in the pool. At least 2; one is active
  /// while the others are being spilled.
  pub buffer_slots: usize,

  /// Bound on bytes in flight between the final pass and the output writer.
  pub sink_capacity: usize,

  /// Keep the temporary files on disk after the run (debugging, or a
  /// checkpointed run that a second process resumes).
  pub retain_temp_files: bool,
}

impl Default for MesherConfig {
  fn default() -> Self {
    Self {
      prune_threshold: 0.0,
      reorder_capacity: 4 * 1024 * 1024,
      buffer_slots: 2,
      sink_capacity: 8 * 1024 * 1024,
      retain_temp_files: false,
    }
  }
}

impl MesherConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_prune_threshold(mut self, fraction: f64) -> Self {
    self.prune_threshold = fraction;
    self
  }

  pub fn with_reorder_capacity(mut self, bytes: usize) -> Self {
    self.reorder_capacity = bytes;
    self
  }

  pub fn with_buffer_slots(mut self, slots: usize) -> Self {
    self.buffer_slots = slots.max(2);
    self
  }

  pub fn with_sink_capacity(mut self, bytes: usize) -> Self {
    self.sink_capacity = bytes;
    self
  }

  pub fn with_retain_temp_files(mut self, retain: bool) -> Self {
    self.retain_temp_files = retain;
    self
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
