//! Polygon output: the writer contract, a binary PLY implementation and
//! the output file namers.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{MesherError, Result};
use crate::types::{ChunkId, Triangle, Vertex};

/// Sink for one or more polygon files.
///
/// Counts are fixed before `open`; vertex and triangle writes carry
/// explicit offsets and may arrive out of order within a file, which the
/// final pass relies on to stream clump by clump.
pub trait PolygonWriter: Send {
  /// Fix the element counts of the next file.
  fn set_counts(&mut self, num_vertices: u64, num_triangles: u64);

  /// Open `path` for writing, closing any previously open file.
  fn open(&mut self, path: &Path) -> Result<()>;

  /// Write `vertices` starting at vertex index `first`.
  fn write_vertices(&mut self, first: u64, vertices: &[Vertex]) -> Result<()>;

  /// Write `triangles` starting at triangle index `first`.
  fn write_triangles(&mut self, first: u64, triangles: &[Triangle]) -> Result<()>;

  /// Flush and close the current file, if any.
  fn close(&mut self) -> Result<()>;
}

// =============================================================================
// Binary little-endian PLY
// =============================================================================

const VERTEX_SIZE: u64 = 12;
/// Face records carry a leading uchar vertex count before the 3 indices.
const FACE_SIZE: u64 = 13;

/// Writer producing `binary_little_endian` PLY files.
///
/// The header is emitted once at `open` and the file is pre-sized, so
/// offset-addressed writes land at stable positions.
pub struct PlyWriter {
  file: Option<File>,
  path: PathBuf,
  num_vertices: u64,
  num_triangles: u64,
  header_len: u64,
  face_scratch: Vec<u8>,
}

impl PlyWriter {
  pub fn new() -> Self {
    Self {
      file: None,
      path: PathBuf::new(),
      num_vertices: 0,
      num_triangles: 0,
      header_len: 0,
      face_scratch: Vec::new(),
    }
  }

  fn header(&self) -> String {
    format!(
      "ply\n\
       format binary_little_endian 1.0\n\
       comment generated by ooc_mesher\n\
       element vertex {}\n\
       property float x\n\
       property float y\n\
       property float z\n\
       element face {}\n\
       property list uchar uint vertex_indices\n\
       end_header\n",
      self.num_vertices, self.num_triangles
    )
  }

  fn file(&mut self) -> Result<&mut File> {
    self
      .file
      .as_mut()
      .ok_or_else(|| MesherError::io(&self.path, no_open_file()))
  }
}

impl Default for PlyWriter {
  fn default() -> Self {
    Self::new()
  }
}

fn no_open_file() -> std::io::Error {
  std::io::Error::new(std::io::ErrorKind::NotConnected, "no open output file")
}

impl PolygonWriter for PlyWriter {
  fn set_counts(&mut self, num_vertices: u64, num_triangles: u64) {
    self.num_vertices = num_vertices;
    self.num_triangles = num_triangles;
  }

  fn open(&mut self, path: &Path) -> Result<()> {
    self.close()?;
    self.path = path.to_path_buf();
    let mut file = OpenOptions::new()
      .write(true)
      .create(true)
      .truncate(true)
      .open(path)
      .map_err(|e| MesherError::io(path, e))?;
    let header = self.header();
    self.header_len = header.len() as u64;
    file
      .write_all(header.as_bytes())
      .map_err(|e| MesherError::io(path, e))?;
    let total =
      self.header_len + self.num_vertices * VERTEX_SIZE + self.num_triangles * FACE_SIZE;
    file
      .set_len(total)
      .map_err(|e| MesherError::io(path, e))?;
    self.file = Some(file);
    Ok(())
  }

  fn write_vertices(&mut self, first: u64, vertices: &[Vertex]) -> Result<()> {
    let pos = self.header_len + first * VERTEX_SIZE;
    let path = self.path.clone();
    let file = self.file()?;
    file
      .seek(SeekFrom::Start(pos))
      .map_err(|e| MesherError::io(&path, e))?;
    file
      .write_all(bytemuck::cast_slice(vertices))
      .map_err(|e| MesherError::io(&path, e))
  }

  fn write_triangles(&mut self, first: u64, triangles: &[Triangle]) -> Result<()> {
    self.face_scratch.clear();
    self.face_scratch.reserve(triangles.len() * FACE_SIZE as usize);
    for tri in triangles {
      self.face_scratch.push(3u8);
      self
        .face_scratch
        .extend_from_slice(bytemuck::cast_slice(tri));
    }
    let pos = self.header_len + self.num_vertices * VERTEX_SIZE + first * FACE_SIZE;
    let path = self.path.clone();
    let bytes = std::mem::take(&mut self.face_scratch);
    let file = self.file()?;
    let mut written = file.seek(SeekFrom::Start(pos)).map(|_| ());
    if written.is_ok() {
      written = file.write_all(&bytes);
    }
    self.face_scratch = bytes;
    written.map_err(|e| MesherError::io(path, e))
  }

  fn close(&mut self) -> Result<()> {
    if let Some(file) = self.file.take() {
      file.sync_all().map_err(|e| MesherError::io(&self.path, e))?;
    }
    Ok(())
  }
}

// =============================================================================
// Output namers
// =============================================================================

/// Maps a chunk id to its output file path.
#[derive(Clone, Debug)]
pub enum OutputNamer {
  /// Every chunk maps to one fixed path (single-file output).
  Single(PathBuf),

  /// `{base}_{X:04}_{Y:04}_{Z:04}.ply`, tagging each file with its chunk
  /// coordinates.
  Tagged { base: PathBuf },
}

impl OutputNamer {
  pub fn name(&self, chunk_id: &ChunkId) -> PathBuf {
    match self {
      OutputNamer::Single(path) => path.clone(),
      OutputNamer::Tagged { base } => {
        let [x, y, z] = chunk_id.coords;
        let mut name = base.as_os_str().to_os_string();
        name.push(format!("_{x:04}_{y:04}_{z:04}.ply"));
        PathBuf::from(name)
      }
    }
  }
}

#[cfg(test)]
#[path = "ply_test.rs"]
mod ply_test;
