//! Run statistics, passed around explicitly rather than read from globals.

/// Counters for one meshing run. Intake updates the receive-side numbers,
/// the final pass fills in the kept/dropped totals.
#[derive(Clone, Debug, Default)]
pub struct MesherMetrics {
  /// Blocks received, including empty ones.
  pub blocks_in: u64,

  /// Blocks that carried no geometry.
  pub empty_blocks: u64,

  /// Clumps minted across all blocks.
  pub clumps_minted: u64,

  /// Component merges caused by shared external keys.
  pub clump_merges: u64,

  /// External vertices deduplicated during welding (the `vertices - 1`
  /// fix-ups applied).
  pub welded_vertices: u64,

  /// Reorder buffer flushes to the spiller.
  pub flushes: u64,

  /// Vertex records appended to the vertex temp file.
  pub temp_vertex_records: u64,

  /// Triangle records appended to the triangle temp file.
  pub temp_triangle_records: u64,

  /// Components that passed the prune threshold.
  pub kept_components: u64,

  /// Components dropped by the prune threshold.
  pub dropped_components: u64,

  /// Vertices written to output files.
  pub kept_vertices: u64,

  /// Triangles written to output files.
  pub kept_triangles: u64,

  /// Output files written.
  pub files_written: u64,

  /// Wall time of the final write pass, in microseconds.
  pub write_pass_us: u64,
}

impl MesherMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bytes appended to the temp files (12 bytes per record).
  pub fn temp_bytes(&self) -> u64 {
    (self.temp_vertex_records + self.temp_triangle_records) * 12
  }
}
