//! Shared builders and fakes for tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::mesher::OocMesher;
use crate::ply::{OutputNamer, PolygonWriter};
use crate::types::{ChunkId, MeshBlock, MesherConfig, Triangle, Vertex, VertexKey};
use crate::writeback::WriteSummary;

static DIR_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh scratch directory under the system temp dir.
pub fn test_dir(tag: &str) -> PathBuf {
  let seq = DIR_SEQ.fetch_add(1, Ordering::Relaxed);
  let dir = std::env::temp_dir().join(format!(
    "ooc_mesher_{tag}_{}_{seq}",
    std::process::id()
  ));
  std::fs::create_dir_all(&dir).expect("create test dir");
  dir
}

/// Build a block from internal vertices, keyed external vertices and
/// triangles indexing the concatenation (internals first).
pub fn block(
  gen: u32,
  coords: [u32; 3],
  internal: &[Vertex],
  external: &[(Vertex, VertexKey)],
  triangles: &[Triangle],
) -> MeshBlock {
  let mut vertices = internal.to_vec();
  vertices.extend(external.iter().map(|(v, _)| *v));
  MeshBlock {
    chunk_id: ChunkId::new(gen, coords),
    vertices,
    internal_count: internal.len(),
    keys: external.iter().map(|(_, k)| *k).collect(),
    triangles: triangles.to_vec(),
  }
}

pub fn empty_block(gen: u32) -> MeshBlock {
  MeshBlock {
    chunk_id: ChunkId::new(gen, [0, 0, 0]),
    vertices: Vec::new(),
    internal_count: 0,
    keys: Vec::new(),
    triangles: Vec::new(),
  }
}

// =============================================================================
// In-memory polygon writer
// =============================================================================

/// One captured output file.
#[derive(Clone, Debug, Default)]
pub struct MemFile {
  pub path: PathBuf,
  pub num_vertices: u64,
  pub num_triangles: u64,
  pub vertices: Vec<Vertex>,
  pub triangles: Vec<Triangle>,
}

impl MemFile {
  /// Vertex positions as ordered bit-exact triples, for multiset compares.
  pub fn vertex_bits(&self) -> Vec<[u32; 3]> {
    let mut out: Vec<[u32; 3]> = self
      .vertices
      .iter()
      .map(|v| [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()])
      .collect();
    out.sort_unstable();
    out
  }

  /// Triangles as sorted sets of vertex positions, independent of index
  /// assignment and clump grouping.
  pub fn triangle_geometry(&self) -> Vec<[[u32; 3]; 3]> {
    let mut out: Vec<[[u32; 3]; 3]> = self
      .triangles
      .iter()
      .map(|t| {
        let mut corners = t.map(|i| {
          let v = self.vertices[i as usize];
          [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()]
        });
        corners.sort_unstable();
        corners
      })
      .collect();
    out.sort_unstable();
    out
  }
}

#[derive(Debug, Default)]
pub struct MemWriterState {
  pub files: Vec<MemFile>,
  pending_vertices: u64,
  pending_triangles: u64,
}

impl MemWriterState {
  pub fn file(&self, path: &Path) -> &MemFile {
    self
      .files
      .iter()
      .find(|f| f.path == path)
      .unwrap_or_else(|| panic!("no output file {}", path.display()))
  }
}

/// `PolygonWriter` that captures everything in memory. Clones share state,
/// so tests keep one handle while the sink owns the other.
#[derive(Clone, Debug, Default)]
pub struct MemWriter {
  state: Arc<Mutex<MemWriterState>>,
}

impl MemWriter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> Arc<Mutex<MemWriterState>> {
    Arc::clone(&self.state)
  }
}

impl PolygonWriter for MemWriter {
  fn set_counts(&mut self, num_vertices: u64, num_triangles: u64) {
    let mut state = self.state.lock().unwrap();
    state.pending_vertices = num_vertices;
    state.pending_triangles = num_triangles;
  }

  fn open(&mut self, path: &Path) -> Result<()> {
    let mut state = self.state.lock().unwrap();
    let file = MemFile {
      path: path.to_path_buf(),
      num_vertices: state.pending_vertices,
      num_triangles: state.pending_triangles,
      vertices: vec![[0.0; 3]; state.pending_vertices as usize],
      // Sentinel fill so unwritten triangles are detectable.
      triangles: vec![[u32::MAX; 3]; state.pending_triangles as usize],
    };
    state.files.push(file);
    Ok(())
  }

  fn write_vertices(&mut self, first: u64, vertices: &[Vertex]) -> Result<()> {
    let mut state = self.state.lock().unwrap();
    let file = state.files.last_mut().expect("open before write");
    let first = first as usize;
    file.vertices[first..first + vertices.len()].copy_from_slice(vertices);
    Ok(())
  }

  fn write_triangles(&mut self, first: u64, triangles: &[Triangle]) -> Result<()> {
    let mut state = self.state.lock().unwrap();
    let file = state.files.last_mut().expect("open before write");
    let first = first as usize;
    file.triangles[first..first + triangles.len()].copy_from_slice(triangles);
    Ok(())
  }

  fn close(&mut self) -> Result<()> {
    Ok(())
  }
}

/// Every triangle index must land inside the file's vertex range and no
/// sentinel (unwritten) triangle may remain.
pub fn assert_file_consistent(file: &MemFile) {
  assert_eq!(file.vertices.len() as u64, file.num_vertices);
  assert_eq!(file.triangles.len() as u64, file.num_triangles);
  for tri in &file.triangles {
    for &index in tri {
      assert!(
        (index as u64) < file.num_vertices,
        "index {index} out of range in {:?}",
        file.path
      );
    }
  }
}

/// Run `blocks` through a fresh mesher and capture the output.
pub fn run_blocks(
  blocks: &[MeshBlock],
  config: MesherConfig,
  namer: &OutputNamer,
) -> (WriteSummary, Arc<Mutex<MemWriterState>>) {
  let dir = test_dir("run");
  let mut mesher = OocMesher::new(&dir, config).expect("mesher start");
  for b in blocks {
    mesher.add(b).expect("add block");
  }
  let writer = MemWriter::new();
  let state = writer.state();
  let summary = mesher.write(Box::new(writer), namer).expect("write pass");
  drop(mesher);
  let _ = std::fs::remove_dir_all(&dir);
  (summary, state)
}
