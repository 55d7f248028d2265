//! Reorder buffer slots and the asynchronous temp-file spiller.
//!
//! Intake appends clump-ordered geometry into the active [`SpillItem`] and
//! hands full items to a single writer thread over a bounded channel. The
//! thread appends each range to the vertex and triangle temp files in range
//! order, then recycles the slot through the free pool. Acquiring a slot
//! when none is free is the pipeline's primary back-pressure point.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{MesherError, Result};
use crate::types::{Triangle, Vertex};

/// One reorder buffer slot, writev-style: geometry is appended to the flat
/// vectors and the range lists dictate the order the spiller writes it in.
#[derive(Debug, Default)]
pub struct SpillItem {
  pub vertices: Vec<Vertex>,
  pub triangles: Vec<Triangle>,

  /// `[first, last)` ranges of `vertices` in disk order.
  pub vertex_ranges: Vec<(usize, usize)>,

  /// `[first, last)` ranges of `triangles` in disk order.
  pub triangle_ranges: Vec<(usize, usize)>,
}

impl SpillItem {
  /// Payload size in temp-file bytes (12 bytes per record).
  pub fn byte_size(&self) -> usize {
    (self.vertices.len() + self.triangles.len()) * 12
  }

  pub fn is_empty(&self) -> bool {
    self.vertex_ranges.is_empty() && self.triangle_ranges.is_empty()
  }

  /// Empty the slot for reuse, keeping its allocations.
  pub fn clear(&mut self) {
    self.vertices.clear();
    self.triangles.clear();
    self.vertex_ranges.clear();
    self.triangle_ranges.clear();
  }
}

/// Distinguishes concurrent runs sharing one temp directory.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_path(dir: &Path, kind: &str) -> PathBuf {
  let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
  dir.join(format!(
    "mesher-{kind}-{}-{seq}.tmp",
    std::process::id()
  ))
}

fn open_temp(path: &Path) -> Result<BufWriter<File>> {
  let file = OpenOptions::new()
    .write(true)
    .create_new(true)
    .open(path)
    .map_err(|e| MesherError::io(path, e))?;
  Ok(BufWriter::new(file))
}

/// Handle to the spiller worker. There is exactly one writer per temp file,
/// so append order is the order items (and ranges within them) were
/// submitted.
#[derive(Debug)]
pub struct TempSpiller {
  work_tx: Option<Sender<SpillItem>>,
  free_rx: Receiver<SpillItem>,
  handle: Option<JoinHandle<()>>,
  error: Arc<Mutex<Option<MesherError>>>,
  vertices_path: PathBuf,
  triangles_path: PathBuf,
}

impl TempSpiller {
  /// Create the temp files in `dir`, fill the free pool with `slots`
  /// buffers and start the writer thread.
  pub fn start(dir: &Path, slots: usize) -> Result<Self> {
    let slots = slots.max(2);
    let vertices_path = temp_path(dir, "vertices");
    let triangles_path = temp_path(dir, "triangles");
    let vertices_file = open_temp(&vertices_path)?;
    let triangles_file = open_temp(&triangles_path)?;

    let (work_tx, work_rx) = bounded::<SpillItem>(slots);
    let (free_tx, free_rx) = bounded::<SpillItem>(slots);
    for _ in 0..slots {
      free_tx
        .send(SpillItem::default())
        .expect("free pool cannot be full");
    }

    let error = Arc::new(Mutex::new(None));
    let worker_error = Arc::clone(&error);
    let worker_paths = (vertices_path.clone(), triangles_path.clone());
    let handle = std::thread::Builder::new()
      .name("mesher-spill".into())
      .spawn(move || {
        spill_worker(
          work_rx,
          free_tx,
          vertices_file,
          triangles_file,
          worker_paths,
          worker_error,
        )
      })
      .map_err(|e| MesherError::io(&vertices_path, e))?;

    Ok(Self {
      work_tx: Some(work_tx),
      free_rx,
      handle: Some(handle),
      error,
      vertices_path,
      triangles_path,
    })
  }

  pub fn vertices_path(&self) -> &Path {
    &self.vertices_path
  }

  pub fn triangles_path(&self) -> &Path {
    &self.triangles_path
  }

  fn check_error(&self) -> Result<()> {
    if let Some(err) = self.error.lock().unwrap().take() {
      return Err(err);
    }
    Ok(())
  }

  /// Take a free slot, blocking while all slots are queued or in flight.
  pub fn acquire(&self) -> Result<SpillItem> {
    self.check_error()?;
    self.free_rx.recv().map_err(|_| {
      self
        .error
        .lock()
        .unwrap()
        .take()
        .unwrap_or_else(|| MesherError::io(&self.vertices_path, worker_gone()))
    })
  }

  /// Queue a full slot for writing, blocking while the queue is full.
  pub fn submit(&self, item: SpillItem) -> Result<()> {
    self.check_error()?;
    let tx = self.work_tx.as_ref().expect("spiller already finished");
    tx.send(item)
      .map_err(|_| MesherError::io(&self.vertices_path, worker_gone()))
  }

  /// Close the work queue, join the worker and surface any write error.
  /// The temp files are fully flushed once this returns.
  pub fn finish(mut self) -> Result<(PathBuf, PathBuf)> {
    self.work_tx.take();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
    if let Some(err) = self.error.lock().unwrap().take() {
      return Err(err);
    }
    Ok((self.vertices_path.clone(), self.triangles_path.clone()))
  }
}

impl Drop for TempSpiller {
  fn drop(&mut self) {
    self.work_tx.take();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

fn worker_gone() -> std::io::Error {
  std::io::Error::new(std::io::ErrorKind::BrokenPipe, "spill worker terminated")
}

fn spill_worker(
  work_rx: Receiver<SpillItem>,
  free_tx: Sender<SpillItem>,
  mut vertices_file: BufWriter<File>,
  mut triangles_file: BufWriter<File>,
  paths: (PathBuf, PathBuf),
  error: Arc<Mutex<Option<MesherError>>>,
) {
  let mut failed = false;
  while let Ok(mut item) = work_rx.recv() {
    if !failed {
      if let Err(err) = write_item(&item, &mut vertices_file, &mut triangles_file, &paths) {
        log::error!("spill failed: {err}");
        *error.lock().unwrap() = Some(err);
        failed = true;
      }
    }
    // Keep recycling slots even after a failure so intake can observe the
    // error instead of blocking on an empty pool.
    item.clear();
    if free_tx.send(item).is_err() {
      break;
    }
  }
  if !failed {
    let flushed = vertices_file
      .flush()
      .map_err(|e| MesherError::io(&paths.0, e))
      .and_then(|_| triangles_file.flush().map_err(|e| MesherError::io(&paths.1, e)));
    if let Err(err) = flushed {
      *error.lock().unwrap() = Some(err);
    }
  }
}

fn write_item(
  item: &SpillItem,
  vertices_file: &mut BufWriter<File>,
  triangles_file: &mut BufWriter<File>,
  paths: &(PathBuf, PathBuf),
) -> Result<()> {
  for &(first, last) in &item.vertex_ranges {
    let bytes: &[u8] = bytemuck::cast_slice(&item.vertices[first..last]);
    vertices_file
      .write_all(bytes)
      .map_err(|e| MesherError::io(&paths.0, e))?;
  }
  for &(first, last) in &item.triangle_ranges {
    let bytes: &[u8] = bytemuck::cast_slice(&item.triangles[first..last]);
    triangles_file
      .write_all(bytes)
      .map_err(|e| MesherError::io(&paths.1, e))?;
  }
  Ok(())
}

#[cfg(test)]
#[path = "spill_test.rs"]
mod spill_test;
