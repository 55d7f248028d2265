//! Final pass: stream the temp files into the output writer.
//!
//! Runs once all geometry has been received (or after a checkpoint resume).
//! Components below the prune threshold are dropped, every surviving
//! clump's vertices get their final positions in the output file, and the
//! split-encoded triangle indices are rewritten to output coordinates.
//! Chunks are emitted in generation order; within a chunk both temp files
//! are consumed strictly forward, so reads stay sequential.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

use crate::chunk::Chunk;
use crate::error::{MesherError, Result};
use crate::mesher::OocMesher;
use crate::ply::{OutputNamer, PolygonWriter};
use crate::sink::{AsyncSink, WriteJob};
use crate::types::{decode_external, is_external, ClumpId, Triangle, Vertex};

/// What the final pass produced, for logging and assertions.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteSummary {
  pub files_written: usize,
  pub threshold_vertices: u64,
  pub kept_components: u64,
  pub dropped_components: u64,
  pub kept_vertices: u64,
  pub kept_triangles: u64,
}

/// Forward-only reader over one temp file, positioned by record index.
struct RecordReader {
  reader: BufReader<File>,
  position: u64,
  path: std::path::PathBuf,
}

impl RecordReader {
  fn open(path: &Path) -> Result<Self> {
    let file = File::open(path).map_err(|e| MesherError::io(path, e))?;
    Ok(Self {
      reader: BufReader::new(file),
      position: 0,
      path: path.to_path_buf(),
    })
  }

  /// Read `count` 12-byte records starting at record `first`, which must
  /// not lie behind the current position.
  fn read_records<T: bytemuck::Pod>(&mut self, first: u64, count: usize, out: &mut Vec<T>) -> Result<()> {
    debug_assert_eq!(std::mem::size_of::<T>(), 12);
    debug_assert!(first >= self.position, "temp file read moved backwards");
    let skip = (first - self.position) * 12;
    if skip > 0 {
      self
        .reader
        .seek_relative(skip as i64)
        .map_err(|e| MesherError::io(&self.path, e))?;
    }
    out.clear();
    out.resize(count, <T as bytemuck::Zeroable>::zeroed());
    self
      .reader
      .read_exact(bytemuck::cast_slice_mut(out))
      .map_err(|e| MesherError::io(&self.path, e))?;
    self.position = first + count as u64;
    Ok(())
  }
}

impl OocMesher {
  /// Write all output files through `writer`, naming them with `namer`.
  ///
  /// Finalizes the run if that has not happened yet. Returns a summary of
  /// what was kept; the mesher's metrics are updated with the same counts.
  pub fn write(
    &mut self,
    writer: Box<dyn PolygonWriter>,
    namer: &OutputNamer,
  ) -> Result<WriteSummary> {
    self.finalize()?;
    let start = Instant::now();

    let total_vertices = self.clumps.total_vertices();
    let threshold = threshold_vertices(self.config.prune_threshold, total_vertices);

    let mut summary = WriteSummary {
      threshold_vertices: threshold,
      ..WriteSummary::default()
    };
    for (_, clump) in self.clumps.roots() {
      if clump.vertices >= threshold {
        summary.kept_components += 1;
        summary.kept_vertices += clump.vertices;
        summary.kept_triangles += clump.triangles;
      } else {
        summary.dropped_components += 1;
      }
    }

    let registry = &self.registry;
    let clumps = &mut self.clumps;
    let mut kept = move |id| clumps.component_vertices(id) >= threshold;

    // One oversized clump must still fit through the sink alone.
    let mut max_clump_bytes = 0usize;
    for chunk in registry.iter() {
      for c in &chunk.clumps {
        if kept(c.global_id) {
          let bytes = (c.vertex_count().max(c.num_triangles) as usize) * 12;
          max_clump_bytes = max_clump_bytes.max(bytes);
        }
      }
    }
    let sink = AsyncSink::start(writer, self.config.sink_capacity.max(max_clump_bytes));

    let mut vertices_tmp = RecordReader::open(&self.vertices_path)?;
    let mut triangles_tmp = RecordReader::open(&self.triangles_path)?;

    let outcome = (|| {
      for chunk in registry.iter() {
        if !chunk.initialized {
          continue;
        }
        write_chunk(chunk, &mut kept, namer, &sink, &mut vertices_tmp, &mut triangles_tmp)?;
        summary.files_written += 1;
      }
      Ok(())
    })();
    // Join the writer before surfacing a streaming error, but report the
    // earlier failure over a follow-on sink error.
    let sink_outcome = sink.finish();
    outcome?;
    sink_outcome?;

    self.metrics.kept_components = summary.kept_components;
    self.metrics.dropped_components = summary.dropped_components;
    self.metrics.kept_vertices = summary.kept_vertices;
    self.metrics.kept_triangles = summary.kept_triangles;
    self.metrics.files_written = summary.files_written as u64;
    self.metrics.write_pass_us = start.elapsed().as_micros() as u64;
    log::info!(
      "write pass: {} files, kept {}/{} components, {} vertices, {} triangles",
      summary.files_written,
      summary.kept_components,
      summary.kept_components + summary.dropped_components,
      summary.kept_vertices,
      summary.kept_triangles
    );
    Ok(summary)
  }
}

/// `ceil(fraction * total)`; components smaller than this are dropped.
fn threshold_vertices(fraction: f64, total_vertices: u64) -> u64 {
  (fraction * total_vertices as f64).ceil() as u64
}

fn write_chunk(
  chunk: &Chunk,
  kept: &mut impl FnMut(ClumpId) -> bool,
  namer: &OutputNamer,
  sink: &AsyncSink,
  vertices_tmp: &mut RecordReader,
  triangles_tmp: &mut RecordReader,
) -> Result<()> {
  // Chunk statistics over kept clumps only. The external index space stays
  // all-inclusive: dropped clumps claimed indices too.
  let mut kept_vertices: u64 = 0;
  let mut kept_triangles: u64 = 0;
  let mut kept_flags = vec![false; chunk.clumps.len()];
  for (i, c) in chunk.clumps.iter().enumerate() {
    if kept(c.global_id) {
      kept_flags[i] = true;
      kept_vertices += c.vertex_count() as u64;
      kept_triangles += c.num_triangles as u64;
    }
  }
  if kept_vertices > u32::MAX as u64 {
    return Err(MesherError::CapacityExceeded(format!(
      "chunk gen {} has {kept_vertices} output vertices",
      chunk.chunk_id.gen
    )));
  }
  if kept_triangles > u32::MAX as u64 {
    return Err(MesherError::CapacityExceeded(format!(
      "chunk gen {} has {kept_triangles} output triangles",
      chunk.chunk_id.gen
    )));
  }

  // Output placements per clump, and the external index remap. A clump's
  // freshly written externals received consecutive chunk indices at intake
  // time, so the remap rebuilds from the per-clump counts alone. Externals
  // owned only by dropped clumps keep the sentinel.
  let mut start_vertex = vec![0u32; chunk.clumps.len()];
  let mut start_triangle = vec![0u64; chunk.clumps.len()];
  let mut external_remap = vec![u32::MAX; chunk.num_external_vertices as usize];
  let mut next_vertex: u32 = 0;
  let mut next_triangle: u64 = 0;
  let mut external_run: u32 = 0;
  for (i, c) in chunk.clumps.iter().enumerate() {
    if kept_flags[i] {
      start_vertex[i] = next_vertex;
      start_triangle[i] = next_triangle;
      for j in 0..c.num_external {
        external_remap[(external_run + j) as usize] = next_vertex + c.num_internal + j;
      }
      next_vertex += c.vertex_count();
      next_triangle += c.num_triangles as u64;
    }
    external_run += c.num_external;
  }

  let path = namer.name(&chunk.chunk_id);
  log::debug!(
    "chunk gen {}: {} -> {kept_vertices} vertices, {kept_triangles} triangles",
    chunk.chunk_id.gen,
    path.display()
  );
  sink.send(WriteJob::Open {
    path,
    num_vertices: kept_vertices,
    num_triangles: kept_triangles,
  })?;

  // Vertices stream through untouched; skipped clumps only advance the
  // read position.
  for (i, c) in chunk.clumps.iter().enumerate() {
    if !kept_flags[i] || c.vertex_count() == 0 {
      continue;
    }
    let mut data: Vec<Vertex> = Vec::new();
    vertices_tmp.read_records(c.first_vertex, c.vertex_count() as usize, &mut data)?;
    sink.send(WriteJob::Vertices {
      first: start_vertex[i] as u64,
      data,
    })?;
  }

  // Triangles are rewritten to output coordinates: clump-local internal
  // indices are rebased, external ones resolved through the remap.
  for (i, c) in chunk.clumps.iter().enumerate() {
    if !kept_flags[i] || c.num_triangles == 0 {
      continue;
    }
    let mut data: Vec<Triangle> = Vec::new();
    triangles_tmp.read_records(c.first_triangle, c.num_triangles as usize, &mut data)?;
    for tri in &mut data {
      for index in tri.iter_mut() {
        if is_external(*index) {
          let remapped = external_remap[decode_external(*index) as usize];
          if remapped == u32::MAX {
            return Err(MesherError::InconsistentMesh(format!(
              "chunk gen {} references external vertex {} of a pruned component",
              chunk.chunk_id.gen,
              decode_external(*index)
            )));
          }
          *index = remapped;
        } else {
          *index += start_vertex[i];
        }
      }
    }
    sink.send(WriteJob::Triangles {
      first: start_triangle[i],
      data,
    })?;
  }
  Ok(())
}

#[cfg(test)]
#[path = "writeback_test.rs"]
mod writeback_test;
