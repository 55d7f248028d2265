//! The out-of-core mesher: block intake and run lifecycle.
//!
//! ```text
//! ┌──────────┐    ┌─────────────────────────────┐    ┌─────────────┐
//! │ producer ├───►│ intake (this module)        ├───►│ spiller     ├──► temp files
//! │ (blocks) │    │ local components → clumps   │    │ (spill.rs)  │
//! └──────────┘    │ key welding → chunk layout  │    └─────────────┘
//!                 └─────────────────────────────┘
//!                        finalize, then:
//!                 ┌─────────────────────────────┐    ┌─────────────┐
//!                 │ final pass (writeback.rs)   ├───►│ sink        ├──► .ply files
//!                 └─────────────────────────────┘    └─────────────┘
//! ```
//!
//! Intake is single-threaded: it owns the chunk registry, the clump forest
//! and the key maps outright, and talks to the spiller only through bounded
//! queues. Within a block, clumps are emitted in ascending minted-id order;
//! the spiller preserves that order on disk and the final pass consumes it
//! the same way, which is what keeps the recorded temp-file offsets valid.

use std::path::{Path, PathBuf};

use crate::chunk::{ChunkClump, ChunkRegistry};
use crate::clump::ClumpForest;
use crate::error::{MesherError, Result};
use crate::key_map::ClumpKeyMap;
use crate::metrics::MesherMetrics;
use crate::spill::{SpillItem, TempSpiller};
use crate::types::{encode_external, ClumpId, MeshBlock, MesherConfig, SPLIT_INDEX_LIMIT};
use crate::union_find::UnionFind;

/// Per-block scratch space, recycled across blocks to keep the allocator
/// out of the hot path.
#[derive(Default, Debug)]
struct IntakeScratch {
  local: Option<UnionFind>,
  clump_of_vertex: Vec<ClumpId>,
  encoded: Vec<u32>,
  vertex_offsets: Vec<usize>,
  triangle_offsets: Vec<usize>,
  vertex_order: Vec<u32>,
  triangle_order: Vec<u32>,
  cursor: Vec<usize>,
}

/// Mesher that assembles arbitrarily large welded meshes by spilling all
/// intermediate geometry to a pair of temp files.
#[derive(Debug)]
pub struct OocMesher {
  pub(crate) config: MesherConfig,
  pub(crate) registry: ChunkRegistry,
  pub(crate) clumps: ClumpForest,
  pub(crate) clump_keys: ClumpKeyMap,

  /// Live while the run is still accepting blocks; taken at finalize.
  spiller: Option<TempSpiller>,

  /// The reorder buffer slot currently being filled.
  active: Option<SpillItem>,

  /// Vertex records appended to the temp file so far, advanced at emission
  /// time so recorded clump offsets stay valid across flushes.
  pub(crate) written_vertices_tmp: u64,

  /// Triangle records appended to the temp file so far.
  pub(crate) written_triangles_tmp: u64,

  pub(crate) vertices_path: PathBuf,
  pub(crate) triangles_path: PathBuf,
  pub(crate) retain_temp_files: bool,
  pub(crate) metrics: MesherMetrics,

  scratch: IntakeScratch,
}

impl OocMesher {
  /// Start a run, creating the temp files in `temp_dir` and spawning the
  /// spill worker.
  pub fn new(temp_dir: impl AsRef<Path>, config: MesherConfig) -> Result<Self> {
    let spiller = TempSpiller::start(temp_dir.as_ref(), config.buffer_slots)?;
    let active = spiller.acquire()?;
    let vertices_path = spiller.vertices_path().to_path_buf();
    let triangles_path = spiller.triangles_path().to_path_buf();
    let retain_temp_files = config.retain_temp_files;
    Ok(Self {
      config,
      registry: ChunkRegistry::new(),
      clumps: ClumpForest::new(),
      clump_keys: ClumpKeyMap::new(),
      spiller: Some(spiller),
      active: Some(active),
      written_vertices_tmp: 0,
      written_triangles_tmp: 0,
      vertices_path,
      triangles_path,
      retain_temp_files,
      metrics: MesherMetrics::new(),
      scratch: IntakeScratch::default(),
    })
  }

  /// Rebuild a finalized mesher from checkpointed state; only the final
  /// pass can run on it.
  pub(crate) fn resumed(
    config: MesherConfig,
    registry: ChunkRegistry,
    clumps: ClumpForest,
    written_vertices_tmp: u64,
    written_triangles_tmp: u64,
    vertices_path: PathBuf,
    triangles_path: PathBuf,
  ) -> Self {
    let retain_temp_files = config.retain_temp_files;
    Self {
      config,
      registry,
      clumps,
      clump_keys: ClumpKeyMap::new(),
      spiller: None,
      active: None,
      written_vertices_tmp,
      written_triangles_tmp,
      vertices_path,
      triangles_path,
      retain_temp_files,
      metrics: MesherMetrics::new(),
      scratch: IntakeScratch::default(),
    }
  }

  pub fn config(&self) -> &MesherConfig {
    &self.config
  }

  pub fn metrics(&self) -> &MesherMetrics {
    &self.metrics
  }

  pub fn vertices_tmp_path(&self) -> &Path {
    &self.vertices_path
  }

  pub fn triangles_tmp_path(&self) -> &Path {
    &self.triangles_path
  }

  /// True once `finalize` has completed (or the mesher was resumed).
  pub fn is_finalized(&self) -> bool {
    self.spiller.is_none()
  }

  // ===========================================================================
  // Block intake
  // ===========================================================================

  /// Consume one block from the producer.
  ///
  /// Identifies the block's components, welds them into the global clump
  /// forest through shared external keys, lays the geometry out
  /// clump-contiguously in the active reorder buffer and records each
  /// clump's placement in its chunk.
  pub fn add(&mut self, block: &MeshBlock) -> Result<()> {
    if self.is_finalized() {
      return Err(MesherError::InconsistentInput(
        "block received after finalize".into(),
      ));
    }
    self.metrics.blocks_in += 1;
    if block.is_empty() {
      self.metrics.empty_blocks += 1;
      return Ok(());
    }
    validate_block(block)?;

    let first_id = self.compute_clumps(block)?;
    self.weld_keys(block);
    self.emit_to_chunk(block, first_id)?;

    if self.active.as_ref().map_or(0, SpillItem::byte_size) > self.config.reorder_capacity {
      self.flush()?;
    }
    Ok(())
  }

  /// Local union-find over the block, minting one global clump per local
  /// component. Returns the first minted id; minted ids form a dense range.
  fn compute_clumps(&mut self, block: &MeshBlock) -> Result<ClumpId> {
    let nv = block.vertices.len();
    let scratch = &mut self.scratch;
    let local = scratch.local.get_or_insert_with(|| UnionFind::new(0));
    local.reset(nv);
    for tri in &block.triangles {
      // The third edge is redundant for connectivity.
      local.union(tri[0], tri[1]);
      local.union(tri[1], tri[2]);
    }

    let first_id = self.clumps.next_id();
    scratch.clump_of_vertex.clear();
    scratch.clump_of_vertex.resize(nv, 0);
    for i in 0..nv as u32 {
      if local.is_root(i) {
        let size = local.set_size(i) as u64;
        scratch.clump_of_vertex[i as usize] = self.clumps.mint(size)?;
      }
    }
    for i in 0..nv as u32 {
      let root = local.find(i);
      scratch.clump_of_vertex[i as usize] = scratch.clump_of_vertex[root as usize];
    }
    // Triangles are tallied at the minted id, which is still a root here;
    // key welding below merges payloads upward from there.
    for tri in &block.triangles {
      self.clumps.add_triangle(scratch.clump_of_vertex[tri[0] as usize]);
    }
    self.metrics.clumps_minted += (self.clumps.next_id() - first_id) as u64;
    Ok(first_id)
  }

  /// Merge clumps that share external keys with earlier blocks.
  fn weld_keys(&mut self, block: &MeshBlock) {
    for (k, &key) in block.keys.iter().enumerate() {
      let minted = self.scratch.clump_of_vertex[block.internal_count + k];
      match self.clump_keys.insert_or_get(key, minted) {
        None => {}
        Some(stored) => {
          let cur = self.clumps.find(minted);
          let other = self.clumps.find(stored);
          let root = if cur != other {
            self.metrics.clump_merges += 1;
            self.clumps.merge(cur, other)
          } else {
            cur
          };
          // Both sides counted this shared vertex; deduct one copy. This
          // must happen on every collision, not only when two components
          // merge: a second shared key between already-merged clumps still
          // double-counts its vertex.
          self.clumps.deduct_shared_vertex(root);
          self.metrics.welded_vertices += 1;
        }
      }
    }
  }

  /// Emit the block's geometry into the active buffer, clump by clump in
  /// ascending minted-id order, and record the chunk layout.
  fn emit_to_chunk(&mut self, block: &MeshBlock, first_id: ClumpId) -> Result<()> {
    let nv = block.vertices.len();
    if nv >= SPLIT_INDEX_LIMIT as usize {
      return Err(MesherError::CapacityExceeded(format!(
        "block with {nv} vertices exceeds the split index space"
      )));
    }
    let num_new = (self.clumps.next_id() - first_id) as usize;
    let scratch = &mut self.scratch;

    // Bucket vertices and triangles by clump with a counting sort; scatter
    // in index order so each bucket stays sorted.
    bucket_offsets(
      &mut scratch.vertex_offsets,
      num_new,
      scratch.clump_of_vertex.iter().map(|&c| (c - first_id) as usize),
    );
    scatter(
      &mut scratch.vertex_order,
      &scratch.vertex_offsets,
      &mut scratch.cursor,
      scratch.clump_of_vertex.iter().map(|&c| (c - first_id) as usize),
    );
    bucket_offsets(
      &mut scratch.triangle_offsets,
      num_new,
      block
        .triangles
        .iter()
        .map(|t| (scratch.clump_of_vertex[t[0] as usize] - first_id) as usize),
    );
    scatter(
      &mut scratch.triangle_order,
      &scratch.triangle_offsets,
      &mut scratch.cursor,
      block
        .triangles
        .iter()
        .map(|t| (scratch.clump_of_vertex[t[0] as usize] - first_id) as usize),
    );

    scratch.encoded.clear();
    scratch.encoded.resize(nv, 0);

    let chunk = self.registry.acquire(block.chunk_id)?;
    let item = self.active.as_mut().expect("active buffer present");

    for k in 0..num_new {
      let vlist =
        &scratch.vertex_order[scratch.vertex_offsets[k]..scratch.vertex_offsets[k + 1]];
      let tlist =
        &scratch.triangle_order[scratch.triangle_offsets[k]..scratch.triangle_offsets[k + 1]];

      // Internal vertices first; their clump-local rank is the temp-file
      // index the triangles use.
      let vertex_start = item.vertices.len();
      let mut num_internal: u32 = 0;
      for &v in vlist {
        if (v as usize) < block.internal_count {
          scratch.encoded[v as usize] = num_internal;
          num_internal += 1;
          item.vertices.push(block.vertices[v as usize]);
        }
      }
      // Then externals: chunk-level welding elides keys a previous clump
      // of this chunk already wrote.
      let mut num_external: u32 = 0;
      for &v in vlist {
        if (v as usize) >= block.internal_count {
          let key = block.keys[v as usize - block.internal_count];
          let (ext_index, inserted) = chunk.external_ids.get_or_insert(key)?;
          scratch.encoded[v as usize] = encode_external(ext_index);
          if inserted {
            num_external += 1;
            item.vertices.push(block.vertices[v as usize]);
          }
        }
      }
      item.vertex_ranges.push((vertex_start, item.vertices.len()));

      let triangle_start = item.triangles.len();
      for &t in tlist {
        let tri = block.triangles[t as usize];
        item.triangles.push([
          scratch.encoded[tri[0] as usize],
          scratch.encoded[tri[1] as usize],
          scratch.encoded[tri[2] as usize],
        ]);
      }
      item.triangle_ranges.push((triangle_start, item.triangles.len()));

      chunk.buffered_clumps.push(ChunkClump {
        first_vertex: self.written_vertices_tmp,
        num_internal,
        num_external,
        first_triangle: self.written_triangles_tmp,
        num_triangles: tlist.len() as u32,
        global_id: first_id + k as ClumpId,
      });
      self.written_vertices_tmp += (num_internal + num_external) as u64;
      self.written_triangles_tmp += tlist.len() as u64;
    }
    chunk.num_external_vertices = chunk.external_ids.len() as u32;
    Ok(())
  }

  /// Hand the active buffer to the spiller and take a fresh slot, blocking
  /// while the pool is exhausted.
  fn flush(&mut self) -> Result<()> {
    let Some(spiller) = self.spiller.as_ref() else {
      return Ok(());
    };
    let item = self.active.take().expect("active buffer present");
    if item.is_empty() {
      self.active = Some(item);
      return Ok(());
    }
    self.registry.seal_buffered();
    let handoff = spiller.submit(item).and_then(|_| spiller.acquire());
    match handoff {
      Ok(slot) => self.active = Some(slot),
      Err(err) => {
        // Keep the active-slot invariant even on the abort path.
        self.active = Some(SpillItem::default());
        return Err(err);
      }
    }
    self.metrics.flushes += 1;
    Ok(())
  }

  /// Flush the remaining buffered geometry, stop the spiller and close the
  /// temp files. Idempotent; called implicitly by `write` and `checkpoint`.
  pub fn finalize(&mut self) -> Result<()> {
    let Some(spiller) = self.spiller.take() else {
      return Ok(());
    };
    if let Some(item) = self.active.take() {
      if !item.is_empty() {
        self.registry.seal_buffered();
        spiller.submit(item)?;
        self.metrics.flushes += 1;
      }
    }
    spiller.finish()?;
    self.registry.assert_drained();
    self.metrics.temp_vertex_records = self.written_vertices_tmp;
    self.metrics.temp_triangle_records = self.written_triangles_tmp;
    log::info!(
      "intake finished: {} blocks, {} chunks, {} clumps, {} temp bytes",
      self.metrics.blocks_in,
      self.registry.len(),
      self.clumps.len(),
      self.metrics.temp_bytes()
    );
    Ok(())
  }

  pub(crate) fn remove_temp_files(&self) {
    let _ = std::fs::remove_file(&self.vertices_path);
    let _ = std::fs::remove_file(&self.triangles_path);
  }
}

impl Drop for OocMesher {
  fn drop(&mut self) {
    // Stop the spill worker before unlinking its files.
    self.spiller.take();
    if !self.retain_temp_files {
      self.remove_temp_files();
    }
  }
}

fn validate_block(block: &MeshBlock) -> Result<()> {
  let nv = block.vertices.len();
  if nv > u32::MAX as usize || block.triangles.len() > u32::MAX as usize {
    return Err(MesherError::CapacityExceeded(format!(
      "block too large: {nv} vertices, {} triangles",
      block.triangles.len()
    )));
  }
  if block.internal_count > nv {
    return Err(MesherError::InconsistentInput(format!(
      "internal count {} exceeds vertex count {nv}",
      block.internal_count
    )));
  }
  if block.keys.len() != nv - block.internal_count {
    return Err(MesherError::InconsistentInput(format!(
      "{} keys for {} external vertices",
      block.keys.len(),
      nv - block.internal_count
    )));
  }
  for tri in &block.triangles {
    if tri.iter().any(|&i| i as usize >= nv) {
      return Err(MesherError::InconsistentInput(format!(
        "triangle {tri:?} references a vertex outside [0, {nv})"
      )));
    }
  }
  Ok(())
}

/// Fill `offsets` with the prefix-summed bucket boundaries of `keys`
/// (`offsets.len() == buckets + 1`).
fn bucket_offsets(
  offsets: &mut Vec<usize>,
  buckets: usize,
  keys: impl Iterator<Item = usize>,
) {
  offsets.clear();
  offsets.resize(buckets + 1, 0);
  for k in keys {
    offsets[k + 1] += 1;
  }
  for k in 0..buckets {
    offsets[k + 1] += offsets[k];
  }
}

/// Stable scatter of item indices into their buckets.
fn scatter(
  order: &mut Vec<u32>,
  offsets: &[usize],
  cursor: &mut Vec<usize>,
  keys: impl Iterator<Item = usize>,
) {
  let buckets = offsets.len() - 1;
  cursor.clear();
  cursor.extend_from_slice(&offsets[..buckets]);
  order.clear();
  order.resize(offsets[buckets], 0);
  for (i, k) in keys.enumerate() {
    order[cursor[k]] = i as u32;
    cursor[k] += 1;
  }
}

#[cfg(test)]
#[path = "mesher_test.rs"]
mod mesher_test;
